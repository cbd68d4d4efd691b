// Per-slot command buffer recording
//
// Each frame slot owns one primary command buffer. It is reset and fully
// rewritten every frame because the target image (and so the framebuffer)
// changes from frame to frame. The caller guarantees the slot's fence has
// been observed signaled before asking for a recording.

use std::sync::Arc;

use crate::error::{FrameError, FrameResult};
use crate::gpu::{DrawDevice, Extent2D, QueueKind};
use crate::transfer::ResidentBuffer;

/// Read-only draw inputs produced by setup code.
pub struct DrawResources<D: DrawDevice> {
    pub pipeline: D::Pipeline,
    pub layout: D::PipelineLayout,
    pub vertex_buffer: ResidentBuffer<D>,
    pub vertex_count: u32,
    /// Index buffer and index count; draws non-indexed when absent.
    pub index_buffer: Option<(ResidentBuffer<D>, u32)>,
    /// Empty, or exactly one set per frame slot.
    pub descriptor_sets: Vec<D::DescriptorSet>,
    pub clear_color: [f32; 4],
}

/// Everything a single recording targets.
pub struct RecordTarget<D: DrawDevice> {
    pub slot: usize,
    pub image_index: u32,
    pub render_pass: D::RenderPass,
    pub framebuffer: D::Framebuffer,
    pub extent: Extent2D,
}

pub struct CommandBufferRecorder<D: DrawDevice> {
    device: Arc<D>,
    pool: D::CommandPool,
    command_buffers: Vec<D::CommandBuffer>,
    resources: DrawResources<D>,
    push_constants: Vec<u8>,
}

impl<D: DrawDevice> CommandBufferRecorder<D> {
    pub fn new(
        device: Arc<D>,
        frames_in_flight: usize,
        resources: DrawResources<D>,
    ) -> FrameResult<Self> {
        if frames_in_flight == 0 {
            return Err(FrameError::InvalidFrameCount(frames_in_flight));
        }
        if !resources.descriptor_sets.is_empty() && resources.descriptor_sets.len() != frames_in_flight {
            return Err(FrameError::creation(
                "frame recorder",
                format!(
                    "{} descriptor sets for {} frame slots",
                    resources.descriptor_sets.len(),
                    frames_in_flight
                ),
            ));
        }

        // RESET_COMMAND_BUFFER pool: buffers are reset one by one each frame.
        let pool = device.create_command_pool(QueueKind::Graphics, false)?;
        let command_buffers = match device.allocate_command_buffers(pool, frames_in_flight as u32) {
            Ok(buffers) => buffers,
            Err(e) => {
                device.destroy_command_pool(pool);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            pool,
            command_buffers,
            resources,
            push_constants: Vec::new(),
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn command_buffer(&self, slot: usize) -> FrameResult<D::CommandBuffer> {
        self.command_buffers
            .get(slot)
            .copied()
            .ok_or(FrameError::InvalidSlot {
                slot,
                count: self.command_buffers.len(),
            })
    }

    /// Bytes pushed to the vertex stage on every following recording.
    pub fn set_push_constants(&mut self, bytes: &[u8]) {
        self.push_constants.clear();
        self.push_constants.extend_from_slice(bytes);
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.resources.clear_color = color;
    }

    pub fn resources(&self) -> &DrawResources<D> {
        &self.resources
    }

    /// Resets the slot's command buffer and records one complete pass into it.
    pub fn record(&self, target: &RecordTarget<D>) -> FrameResult<D::CommandBuffer> {
        let cmd = self.command_buffer(target.slot)?;
        let device = &self.device;
        let res = &self.resources;

        device.reset_command_buffer(cmd)?;
        device.begin_command_buffer(cmd, true)?;

        device.cmd_begin_render_pass(
            cmd,
            target.render_pass,
            target.framebuffer,
            target.extent,
            res.clear_color,
        );
        device.cmd_bind_pipeline(cmd, res.pipeline);
        device.cmd_set_viewport_scissor(cmd, target.extent);

        device.cmd_bind_vertex_buffer(cmd, res.vertex_buffer.handle());
        if let Some((index_buffer, _)) = &res.index_buffer {
            device.cmd_bind_index_buffer(cmd, index_buffer.handle());
        }
        if let Some(set) = res.descriptor_sets.get(target.slot) {
            device.cmd_bind_descriptor_set(cmd, res.layout, *set);
        }
        if !self.push_constants.is_empty() {
            device.cmd_push_constants(cmd, res.layout, &self.push_constants);
        }

        match &res.index_buffer {
            Some((_, index_count)) => device.cmd_draw_indexed(cmd, *index_count),
            None => device.cmd_draw(cmd, res.vertex_count),
        }

        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd)?;

        Ok(cmd)
    }
}

impl<D: DrawDevice> Drop for CommandBufferRecorder<D> {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
    }
}

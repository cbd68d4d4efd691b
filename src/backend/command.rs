// Command pools, queue submission and render-pass recording

use ash::vk;

use super::device::vk_error;
use super::VulkanDevice;
use crate::error::{FrameError, FrameResult};
use crate::gpu::{CommandDevice, DrawDevice, Extent2D, QueueKind};

impl CommandDevice for VulkanDevice {
    type CommandPool = vk::CommandPool;
    type CommandBuffer = vk::CommandBuffer;

    fn create_command_pool(&self, queue: QueueKind, transient: bool) -> FrameResult<vk::CommandPool> {
        // Both users reset individual buffers, never the whole pool.
        let mut flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        if transient {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family(queue))
            .flags(flags);

        unsafe { self.device.create_command_pool(&pool_info, None) }
            .map_err(|e| vk_error("command pool", e))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> FrameResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| vk_error("command buffer", e))
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> FrameResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| FrameError::Recording(format!("reset: {e}")))
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, one_time: bool) -> FrameResult<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);

        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|e| FrameError::Recording(format!("begin: {e}")))
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> FrameResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
            .map_err(|e| FrameError::Recording(format!("end: {e}")))
    }

    fn submit(
        &self,
        queue: QueueKind,
        command_buffer: vk::CommandBuffer,
        wait: &[vk::Semaphore],
        signal: &[vk::Semaphore],
        fence: Option<vk::Fence>,
    ) -> FrameResult<()> {
        // Wait for image availability before writing color
        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait.len()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(signal);

        let _guard = self.queue_lock.lock();
        unsafe {
            self.device.queue_submit(
                self.queue(queue),
                &[submit_info],
                fence.unwrap_or(vk::Fence::null()),
            )
        }
        .map_err(|e| match e {
            vk::Result::ERROR_DEVICE_LOST => FrameError::DeviceLost(format!("{queue:?} submit")),
            _ => FrameError::Submission(format!("{queue:?} queue: {e}")),
        })
    }
}

impl DrawDevice for VulkanDevice {
    type Pipeline = vk::Pipeline;
    type PipelineLayout = vk::PipelineLayout;
    type DescriptorSet = vk::DescriptorSet;

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: to_vk_extent(extent),
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_set_viewport_scissor(&self, command_buffer: vk::CommandBuffer, extent: Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: to_vk_extent(extent),
        };
        unsafe {
            self.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn cmd_bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(command_buffer, buffer, 0, vk::IndexType::UINT16);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    fn cmd_push_constants(&self, command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout, bytes: &[u8]) {
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytes,
            );
        }
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32) {
        unsafe { self.device.cmd_draw(command_buffer, vertex_count, 1, 0, 0) };
    }

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0);
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }
}

pub(super) fn to_vk_extent(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

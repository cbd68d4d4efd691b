// Frame scheduler - the per-frame state machine
//
// FRAME TIMELINE (slot i = tick mod N):
// ┌──────────────────────────────────────────────────────────────────────────┐
// │ WAIT fence(i) ─> ACQUIRE ─> RESET fence(i) ─> RECORD ─> SUBMIT ─> PRESENT │
// │                    │                                               │      │
// │               out of date:                          out of date / suboptimal
// │            rebuild, no advance                      / resize: rebuild      │
// │                                                                    │      │
// │                                                   ADVANCE tick <───┘      │
// └──────────────────────────────────────────────────────────────────────────┘
//
// The fence is reset only after ACQUIRE succeeded. An out-of-date ACQUIRE
// leaves it signaled, so the retried tick's WAIT returns at once instead of
// waiting on a fence nothing will ever signal.

use std::sync::Arc;

use crate::diagnostics::{FrameEvents, RecreateReason};
use crate::error::{FrameError, FrameResult};
use crate::gpu::{AcquireOutcome, Extent2D, PresentOutcome, QueueKind, RenderDevice};
use crate::recorder::{CommandBufferRecorder, RecordTarget};
use crate::surface::{ExtentSource, RecreateOutcome, SurfaceLifecycle};
use crate::sync_pool::{FrameSync, SyncObjectPool};

/// Effectively infinite wait, in nanoseconds.
pub const INFINITE_TIMEOUT: u64 = u64::MAX;

/// What one call to `draw_frame` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame went through SUBMIT and PRESENT and the tick advanced.
    Presented {
        slot: usize,
        image_index: u32,
        recreated: bool,
    },
    /// ACQUIRE reported the surface out of date. Nothing was submitted, the
    /// surface was rebuilt and the same tick runs again next call.
    Skipped,
    /// The window has no area. Nothing was touched.
    Minimized,
}

pub struct FrameScheduler<D: RenderDevice, W: ExtentSource> {
    device: Arc<D>,
    sync: SyncObjectPool<D>,
    surface: SurfaceLifecycle<D, W>,
    recorder: CommandBufferRecorder<D>,
    events: Box<dyn FrameEvents>,
    fence_timeout_ns: u64,
    tick: u64,
    resize_requested: bool,
    // A rebuild is owed once the window has area again.
    recreate_on_restore: bool,
}

impl<D: RenderDevice, W: ExtentSource> FrameScheduler<D, W> {
    pub fn new(
        device: Arc<D>,
        sync: SyncObjectPool<D>,
        surface: SurfaceLifecycle<D, W>,
        recorder: CommandBufferRecorder<D>,
        events: Box<dyn FrameEvents>,
        fence_timeout_ns: u64,
    ) -> FrameResult<Self> {
        if recorder.frames_in_flight() != sync.frames_in_flight() {
            return Err(FrameError::creation(
                "frame scheduler",
                format!(
                    "{} command buffers for {} sync slots",
                    recorder.frames_in_flight(),
                    sync.frames_in_flight()
                ),
            ));
        }

        let recreate_on_restore = !surface.is_live();
        Ok(Self {
            device,
            sync,
            surface,
            recorder,
            events,
            fence_timeout_ns,
            tick: 0,
            resize_requested: false,
            recreate_on_restore,
        })
    }

    /// Runs one tick of the state machine.
    ///
    /// Only fatal conditions come back as errors; out-of-date, suboptimal
    /// and minimized surfaces are handled here and reported in the status.
    pub fn draw_frame(&mut self) -> FrameResult<FrameStatus> {
        if self.surface.window().framebuffer_extent().is_zero() {
            if !self.recreate_on_restore {
                self.recreate_on_restore = true;
                self.events.deferred(RecreateReason::Restored);
            }
            self.resize_requested = false;
            return Ok(FrameStatus::Minimized);
        }
        if self.recreate_on_restore {
            // This rebuild already honours any pending resize request.
            self.resize_requested = false;
            if !self.rebuild(RecreateReason::Restored)? {
                return Ok(FrameStatus::Minimized);
            }
        }

        let tick = self.tick;
        let slot = (tick % self.sync.frames_in_flight() as u64) as usize;
        let frame = self.sync.slot(slot)?;

        // WAIT
        self.device
            .wait_for_fence(frame.in_flight_fence, self.fence_timeout_ns)?;
        self.events.fence_waited(tick, slot);

        // ACQUIRE
        let (image_index, acquire_suboptimal) = match self
            .surface
            .acquire(frame.image_available, self.fence_timeout_ns)?
        {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                log::debug!("tick {}: swapchain out of date at acquire", tick);
                // The rebuild picks up the current extent, so a pending
                // resize is satisfied too.
                self.resize_requested = false;
                self.rebuild(RecreateReason::AcquireOutOfDate)?;
                return Ok(FrameStatus::Skipped);
            }
        };
        self.events.image_acquired(tick, slot, image_index);

        let target = RecordTarget {
            slot,
            image_index,
            render_pass: self.surface.render_pass(),
            framebuffer: self.surface.framebuffer(image_index)?,
            extent: self.surface.extent(),
        };

        // RESET-FENCE: from here on a submission is promised to signal it.
        self.device.reset_fence(frame.in_flight_fence)?;

        // RECORD
        let cmd = self.recorder.record(&target)?;

        // SUBMIT
        self.device.submit(
            QueueKind::Graphics,
            cmd,
            &[frame.image_available],
            &[frame.render_finished],
            Some(frame.in_flight_fence),
        )?;
        self.events.submitted(tick, slot);

        // PRESENT
        let presented = self.surface.present(image_index, frame.render_finished)?;
        if presented != PresentOutcome::OutOfDate {
            self.events.presented(tick, slot, image_index);
        }

        let resize = std::mem::take(&mut self.resize_requested);
        let reason = match presented {
            PresentOutcome::OutOfDate => Some(RecreateReason::PresentOutOfDate),
            PresentOutcome::Suboptimal => Some(RecreateReason::PresentSuboptimal),
            PresentOutcome::Presented if acquire_suboptimal => Some(RecreateReason::AcquireSuboptimal),
            PresentOutcome::Presented if resize => Some(RecreateReason::ResizeRequested),
            PresentOutcome::Presented => None,
        };
        let recreated = match reason {
            Some(reason) => self.rebuild(reason)?,
            None => false,
        };

        // ADVANCE
        self.tick += 1;

        Ok(FrameStatus::Presented {
            slot,
            image_index,
            recreated,
        })
    }

    /// Flags the surface for a rebuild at the next post-PRESENT checkpoint.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Runs the recreation protocol right away.
    pub fn recreate_swap_chain(&mut self) -> FrameResult<RecreateOutcome> {
        self.resize_requested = false;
        self.rebuild(RecreateReason::Explicit)?;
        Ok(if self.recreate_on_restore {
            RecreateOutcome::Deferred
        } else {
            RecreateOutcome::Recreated {
                generation: self.surface.generation(),
                extent: self.surface.extent(),
            }
        })
    }

    fn rebuild(&mut self, reason: RecreateReason) -> FrameResult<bool> {
        match self.surface.recreate()? {
            RecreateOutcome::Recreated { generation, extent } => {
                self.recreate_on_restore = false;
                self.events.recreated(reason, generation, extent);
                Ok(true)
            }
            RecreateOutcome::Deferred => {
                self.recreate_on_restore = true;
                self.events.deferred(reason);
                Ok(false)
            }
        }
    }

    /// Ticks completed so far (also the next tick's number).
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn frames_in_flight(&self) -> usize {
        self.sync.frames_in_flight()
    }

    pub fn current_extent(&self) -> Extent2D {
        self.surface.extent()
    }

    pub fn image_count(&self) -> usize {
        self.surface.image_count()
    }

    pub fn generation(&self) -> u64 {
        self.surface.generation()
    }

    pub fn frame_sync(&self, slot: usize) -> FrameResult<FrameSync<D::Semaphore, D::Fence>> {
        self.sync.slot(slot)
    }

    pub fn command_buffer(&self, slot: usize) -> FrameResult<D::CommandBuffer> {
        self.recorder.command_buffer(slot)
    }

    /// Per-frame dynamic state (push constants, clear colour).
    pub fn recorder_mut(&mut self) -> &mut CommandBufferRecorder<D> {
        &mut self.recorder
    }
}

impl<D: RenderDevice, W: ExtentSource> Drop for FrameScheduler<D, W> {
    fn drop(&mut self) {
        // Members release objects the device may still be using.
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait idle before frame teardown failed: {}", e);
        }
    }
}

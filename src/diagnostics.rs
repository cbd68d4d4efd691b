// Frame diagnostics
//
// The scheduler reports what it does through an observer handed to it at
// construction. LogEvents forwards to the `log` facade; tests plug in a
// recorder and use it as an external probe of the frame state machine.

use crate::gpu::Extent2D;

/// Why a surface rebuild was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateReason {
    AcquireOutOfDate,
    AcquireSuboptimal,
    PresentOutOfDate,
    PresentSuboptimal,
    ResizeRequested,
    Restored,
    Explicit,
}

/// Observer of the frame state machine. Every method has a no-op default.
pub trait FrameEvents {
    /// WAIT returned for `slot`.
    fn fence_waited(&mut self, _tick: u64, _slot: usize) {}
    fn image_acquired(&mut self, _tick: u64, _slot: usize, _image_index: u32) {}
    fn submitted(&mut self, _tick: u64, _slot: usize) {}
    fn presented(&mut self, _tick: u64, _slot: usize, _image_index: u32) {}
    fn recreated(&mut self, _reason: RecreateReason, _generation: u64, _extent: Extent2D) {}
    /// Recreation was postponed because the window has no area.
    fn deferred(&mut self, _reason: RecreateReason) {}
}

/// Default observer: writes through `log`.
#[derive(Debug, Default)]
pub struct LogEvents;

impl FrameEvents for LogEvents {
    fn fence_waited(&mut self, tick: u64, slot: usize) {
        log::trace!("tick {}: slot {} fence signaled", tick, slot);
    }

    fn image_acquired(&mut self, tick: u64, slot: usize, image_index: u32) {
        log::trace!("tick {}: slot {} acquired image {}", tick, slot, image_index);
    }

    fn submitted(&mut self, tick: u64, slot: usize) {
        log::trace!("tick {}: slot {} submitted", tick, slot);
    }

    fn presented(&mut self, tick: u64, slot: usize, image_index: u32) {
        log::trace!("tick {}: slot {} presented image {}", tick, slot, image_index);
    }

    fn recreated(&mut self, reason: RecreateReason, generation: u64, extent: Extent2D) {
        log::info!(
            "Swapchain generation {} ({}x{}) after {:?}",
            generation,
            extent.width,
            extent.height,
            reason
        );
    }

    fn deferred(&mut self, reason: RecreateReason) {
        log::debug!("Window minimized, swapchain rebuild ({:?}) deferred", reason);
    }
}

// Synchronization objects for frames in flight
//
// One image-available semaphore, one render-finished semaphore and one
// in-flight fence per frame slot, plus a standalone fence for one-shot
// transfers. Slot fences start signaled so the first WAIT of every slot
// returns immediately; the transfer fence starts unsignaled.

use std::sync::Arc;

use crate::error::{FrameError, FrameResult};
use crate::gpu::SyncDevice;

/// Frame synchronization - one per frame in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync<S, F> {
    pub image_available: S,
    pub render_finished: S,
    pub in_flight_fence: F,
}

/// Fixed pool of per-slot semaphores/fences.
///
/// Dropping the pool destroys every object it owns. The caller must make sure
/// the device has retired all work referencing them first (wait idle, or wait
/// on every slot fence).
pub struct SyncObjectPool<D: SyncDevice> {
    device: Arc<D>,
    frames: Vec<FrameSync<D::Semaphore, D::Fence>>,
    transfer_fence: D::Fence,
}

impl<D: SyncDevice> SyncObjectPool<D> {
    pub fn create(device: Arc<D>, frames_in_flight: usize) -> FrameResult<Self> {
        if frames_in_flight == 0 {
            return Err(FrameError::InvalidFrameCount(frames_in_flight));
        }

        // Objects are moved into the pool as soon as they exist so an early
        // return drops (and destroys) whatever was already created.
        let transfer_fence = device.create_fence(false)?;
        let mut pool = Self {
            device,
            frames: Vec::with_capacity(frames_in_flight),
            transfer_fence,
        };

        for _ in 0..frames_in_flight {
            let image_available = pool.device.create_semaphore()?;
            let render_finished = match pool.device.create_semaphore() {
                Ok(s) => s,
                Err(e) => {
                    pool.device.destroy_semaphore(image_available);
                    return Err(e);
                }
            };
            let in_flight_fence = match pool.device.create_fence(true) {
                Ok(f) => f,
                Err(e) => {
                    pool.device.destroy_semaphore(image_available);
                    pool.device.destroy_semaphore(render_finished);
                    return Err(e);
                }
            };
            pool.frames.push(FrameSync {
                image_available,
                render_finished,
                in_flight_fence,
            });
        }

        log::info!(
            "Created synchronization objects for {} frames in flight",
            frames_in_flight
        );
        Ok(pool)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn slot(&self, slot: usize) -> FrameResult<FrameSync<D::Semaphore, D::Fence>> {
        self.frames
            .get(slot)
            .copied()
            .ok_or(FrameError::InvalidSlot {
                slot,
                count: self.frames.len(),
            })
    }

    /// Fence reserved for one-shot transfers. Never shared with a frame slot.
    pub fn transfer_fence(&self) -> D::Fence {
        self.transfer_fence
    }
}

impl<D: SyncDevice> Drop for SyncObjectPool<D> {
    fn drop(&mut self) {
        for sync in self.frames.drain(..) {
            self.device.destroy_semaphore(sync.image_available);
            self.device.destroy_semaphore(sync.render_finished);
            self.device.destroy_fence(sync.in_flight_fence);
        }
        self.device.destroy_fence(self.transfer_fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDevice};

    #[test]
    fn creates_pairs_and_fences_in_expected_states() {
        let device = MockDevice::new();
        let pool = SyncObjectPool::create(device.clone(), 2).unwrap();

        assert_eq!(pool.frames_in_flight(), 2);
        assert_eq!(device.live("semaphore"), 4);
        assert_eq!(device.live("fence"), 3);

        for slot in 0..2 {
            let sync = pool.slot(slot).unwrap();
            assert!(device.fence_state(sync.in_flight_fence).signaled);
            assert_ne!(sync.image_available, sync.render_finished);
        }
        assert!(!device.fence_state(pool.transfer_fence()).signaled);
    }

    #[test]
    fn zero_frames_is_rejected() {
        let device = MockDevice::new();
        let err = SyncObjectPool::create(device.clone(), 0).err().unwrap();
        assert_eq!(err, FrameError::InvalidFrameCount(0));
        assert_eq!(device.live_total(), 0);
    }

    #[test]
    fn out_of_range_slot_is_a_logic_error() {
        let device = MockDevice::new();
        let pool = SyncObjectPool::create(device, 2).unwrap();
        assert_eq!(
            pool.slot(2).unwrap_err(),
            FrameError::InvalidSlot { slot: 2, count: 2 }
        );
    }

    #[test]
    fn drop_releases_everything() {
        let device = MockDevice::new();
        let pool = SyncObjectPool::create(device.clone(), 3).unwrap();
        drop(pool);
        assert_eq!(device.live_total(), 0);
        assert_eq!(device.count(|c| matches!(c, Call::DestroyFence(_))), 4);
    }

    #[test]
    fn failed_creation_releases_partial_pool() {
        let device = MockDevice::new();
        // Transfer fence and slot 0 fence succeed, slot 1 fence fails.
        device.fail_after("fence", 2);
        let err = SyncObjectPool::create(device.clone(), 2).err().unwrap();
        assert!(matches!(err, FrameError::Creation { what: "fence", .. }));
        assert_eq!(device.live_total(), 0);
    }
}

// Synchronization primitives
//
// Fences for GPU -> CPU, semaphores for GPU -> GPU ordering. Ownership of the
// handles is with the engine's SyncObjectPool; this is only the Vulkan side.

use ash::vk;

use super::device::vk_error;
use super::VulkanDevice;
use crate::error::{FrameError, FrameResult};
use crate::gpu::SyncDevice;

impl SyncDevice for VulkanDevice {
    type Semaphore = vk::Semaphore;
    type Fence = vk::Fence;

    fn create_semaphore(&self) -> FrameResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&semaphore_info, None) }
            .map_err(|e| vk_error("semaphore", e))
    }

    fn create_fence(&self, signaled: bool) -> FrameResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&fence_info, None) }.map_err(|e| vk_error("fence", e))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> FrameResult<()> {
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(FrameError::Timeout(timeout_ns)),
            Err(e) => Err(FrameError::DeviceLost(format!("fence wait: {e}"))),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> FrameResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.map_err(|e| vk_error("fence reset", e))
    }

    fn fence_signaled(&self, fence: vk::Fence) -> FrameResult<bool> {
        unsafe { self.device.get_fence_status(fence) }
            .map_err(|e| FrameError::DeviceLost(format!("fence status: {e}")))
    }

    fn wait_idle(&self) -> FrameResult<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| FrameError::DeviceLost(format!("device wait idle: {e}")))
    }
}

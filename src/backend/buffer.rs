// GPU buffers backed by gpu-allocator
//
// Staging buffers live in host-visible memory and stay mapped; everything else
// is device-local and only reachable through a transfer-queue copy. When the
// transfer and graphics queues come from different families the buffers are
// created with concurrent sharing so no ownership transfer is needed.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::device::vk_error;
use super::VulkanDevice;
use crate::error::{FrameError, FrameResult};
use crate::gpu::{BufferDevice, BufferKind};

fn usage(kind: BufferKind) -> vk::BufferUsageFlags {
    match kind {
        BufferKind::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        BufferKind::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferKind::Index => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
    }
}

fn location(kind: BufferKind) -> MemoryLocation {
    if kind.is_host_visible() {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

impl BufferDevice for VulkanDevice {
    type Buffer = vk::Buffer;
    type Memory = Allocation;

    fn create_buffer(&self, size: u64, kind: BufferKind) -> FrameResult<(vk::Buffer, Allocation)> {
        let families = [self.graphics_queue_family, self.transfer_queue_family];
        // Zero-sized buffers are invalid in Vulkan.
        let mut buffer_info = vk::BufferCreateInfo::default()
            .size(size.max(1))
            .usage(usage(kind));
        buffer_info = if families[0] != families[1] {
            buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| vk_error("buffer", e))?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let allocation = self.allocator.lock().allocate(&AllocationCreateDesc {
            name: "frame-pacer buffer",
            requirements,
            location: location(kind),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(FrameError::creation("buffer memory", e));
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.destroy_buffer(buffer, allocation);
            return Err(vk_error("buffer memory bind", e));
        }

        Ok((buffer, allocation))
    }

    fn write_buffer(&self, memory: &mut Allocation, data: &[u8]) -> FrameResult<()> {
        let mapped = memory.mapped_slice_mut().ok_or(FrameError::NotHostVisible)?;
        if data.len() > mapped.len() {
            return Err(FrameError::CopyOutOfRange {
                size: data.len() as u64,
                capacity: mapped.len() as u64,
            });
        }
        // Host-coherent: no flush needed.
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, memory: Allocation) {
        if let Err(e) = self.allocator.lock().free(memory) {
            log::error!("Failed to free buffer memory: {}", e);
        }
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    fn cmd_copy_buffer(&self, command_buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: u64) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.device
                .cmd_copy_buffer(command_buffer, src, dst, &[region]);
        }
    }
}

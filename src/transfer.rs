// One-shot transfers onto device-local memory
//
// upload(): record a copy on the transfer queue, submit it with the dedicated
// transfer fence, block on that fence, reset it, and only then destroy the
// staging buffer. Steady-state frames do not start until uploads are done, so
// program order on the host is the only ordering needed: no semaphore.

use std::sync::Arc;

use crate::error::{FrameError, FrameResult};
use crate::gpu::{BufferDevice, BufferKind, QueueKind};

/// A buffer and its backing memory, released together on drop.
pub struct GpuBuffer<D: BufferDevice> {
    device: Arc<D>,
    handle: D::Buffer,
    memory: Option<D::Memory>,
    size: u64,
    kind: BufferKind,
}

impl<D: BufferDevice> GpuBuffer<D> {
    pub fn new(device: Arc<D>, size: u64, kind: BufferKind) -> FrameResult<Self> {
        let (handle, memory) = device.create_buffer(size, kind)?;
        Ok(Self {
            device,
            handle,
            memory: Some(memory),
            size,
            kind,
        })
    }

    /// Host-visible buffer filled with `data`.
    pub fn staging(device: Arc<D>, data: &[u8]) -> FrameResult<Self> {
        let mut buffer = Self::new(device, data.len() as u64, BufferKind::Staging)?;
        buffer.write(data)?;
        Ok(buffer)
    }

    pub fn write(&mut self, data: &[u8]) -> FrameResult<()> {
        if data.len() as u64 > self.size {
            return Err(FrameError::CopyOutOfRange {
                size: data.len() as u64,
                capacity: self.size,
            });
        }
        match self.memory.as_mut() {
            Some(memory) => self.device.write_buffer(memory, data),
            None => Err(FrameError::NotHostVisible),
        }
    }

    pub fn handle(&self) -> D::Buffer {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }
}

impl<D: BufferDevice> Drop for GpuBuffer<D> {
    fn drop(&mut self) {
        if let Some(memory) = self.memory.take() {
            self.device.destroy_buffer(self.handle, memory);
        }
    }
}

/// A device-local buffer whose upload has completed.
///
/// Only TransferScheduler hands these out, and draw resources only accept
/// these, so a recording can never reference a buffer mid-upload.
pub struct ResidentBuffer<D: BufferDevice>(GpuBuffer<D>);

impl<D: BufferDevice> ResidentBuffer<D> {
    pub fn handle(&self) -> D::Buffer {
        self.0.handle()
    }

    pub fn size(&self) -> u64 {
        self.0.size()
    }

    pub fn kind(&self) -> BufferKind {
        self.0.kind()
    }
}

pub struct TransferScheduler<D: BufferDevice> {
    device: Arc<D>,
    pool: D::CommandPool,
    command_buffer: D::CommandBuffer,
    fence: D::Fence,
    timeout_ns: u64,
}

impl<D: BufferDevice> TransferScheduler<D> {
    /// `fence` is the sync pool's transfer fence; it must be unsignaled.
    pub fn new(device: Arc<D>, fence: D::Fence, timeout_ns: u64) -> FrameResult<Self> {
        let pool = device.create_command_pool(QueueKind::Transfer, true)?;
        let command_buffer = match device.allocate_command_buffers(pool, 1) {
            Ok(buffers) if !buffers.is_empty() => buffers[0],
            Ok(_) => {
                device.destroy_command_pool(pool);
                return Err(FrameError::creation("transfer command buffer", "none allocated"));
            }
            Err(e) => {
                device.destroy_command_pool(pool);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            pool,
            command_buffer,
            fence,
            timeout_ns,
        })
    }

    /// Copies `size` bytes from `staging` into `destination` and blocks until
    /// the copy has retired. The staging buffer is destroyed on the way out.
    pub fn upload(
        &mut self,
        staging: GpuBuffer<D>,
        destination: GpuBuffer<D>,
        size: u64,
    ) -> FrameResult<ResidentBuffer<D>> {
        let capacity = staging.size().min(destination.size());
        if size > capacity {
            return Err(FrameError::CopyOutOfRange { size, capacity });
        }
        if size == 0 {
            return Ok(ResidentBuffer(destination));
        }

        let cmd = self.command_buffer;
        self.device.reset_command_buffer(cmd)?;
        self.device.begin_command_buffer(cmd, true)?;
        self.device
            .cmd_copy_buffer(cmd, staging.handle(), destination.handle(), size);
        self.device.end_command_buffer(cmd)?;

        self.device
            .submit(QueueKind::Transfer, cmd, &[], &[], Some(self.fence))?;
        if let Err(e) = self.device.wait_for_fence(self.fence, self.timeout_ns) {
            // The copy may still be reading `staging` and writing
            // `destination`; their memory must outlive it.
            if let Err(idle) = self.device.wait_idle() {
                log::error!("Transfer wait failed and device did not idle: {}", idle);
                std::mem::forget(staging);
                std::mem::forget(destination);
            }
            return Err(e);
        }
        self.device.reset_fence(self.fence)?;

        drop(staging);
        log::debug!("Uploaded {} bytes to device-local {:?} buffer", size, destination.kind());

        Ok(ResidentBuffer(destination))
    }

    /// Stages `data` through a temporary host-visible buffer into a new
    /// device-local buffer of `kind`.
    pub fn stage(&mut self, data: &[u8], kind: BufferKind) -> FrameResult<ResidentBuffer<D>> {
        let size = data.len() as u64;
        let staging = GpuBuffer::staging(self.device.clone(), data)?;
        let destination = GpuBuffer::new(self.device.clone(), size, kind)?;
        self.upload(staging, destination, size)
    }
}

impl<D: BufferDevice> Drop for TransferScheduler<D> {
    fn drop(&mut self) {
        // Frees the command buffer with it.
        self.device.destroy_command_pool(self.pool);
    }
}

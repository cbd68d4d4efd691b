// Frame pacer - frame-in-flight synchronization for a Vulkan presentation loop
//
// Engine modules are generic over the device traits in `gpu`; `backend`
// implements those traits on top of ash.

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gpu;
pub mod recorder;
pub mod scheduler;
pub mod surface;
pub mod sync_pool;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use diagnostics::{FrameEvents, LogEvents, RecreateReason};
pub use error::{ErrorKind, FrameError, FrameResult};
pub use gpu::{AcquireOutcome, BufferKind, Extent2D, PresentOutcome, QueueKind, RenderDevice};
pub use recorder::{CommandBufferRecorder, DrawResources, RecordTarget};
pub use scheduler::{FrameScheduler, FrameStatus, INFINITE_TIMEOUT};
pub use surface::{ExtentSource, RecreateOutcome, SurfaceLifecycle};
pub use sync_pool::{FrameSync, SyncObjectPool};
pub use transfer::{GpuBuffer, ResidentBuffer, TransferScheduler};

// Backend module - Vulkan implementation of the engine's device traits
//
// Design: Thin wrapper around ash; the frame engine never sees a vk:: type
// except as the associated handle types of VulkanDevice.

mod buffer;
mod command;
pub mod device;
pub mod pipeline;
pub mod shader;
mod swapchain;
mod sync;

pub use device::VulkanDevice;
pub use pipeline::{RenderPipeline, Vertex, PUSH_CONSTANT_SIZE};
pub use shader::ShaderModule;

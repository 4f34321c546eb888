// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash. Setup (device, pipeline, buffers) is done
// once; the frame engine drives everything per-frame through VulkanContext.

pub mod buffer;
pub mod context;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use context::VulkanContext;
pub use device::VulkanDevice;

// Frame engine - synchronization and swapchain lifecycle
//
// Everything that has ordering or recovery rules lives here:
// - FrameSlotPool: N reusable bundles of semaphores, fence, command buffer
// - SwapchainManager: presentable images + views + framebuffers, rebuildable
// - FrameDriver: wait -> acquire -> record -> submit -> present -> advance
// - invalidation: resize notification and stale-surface recovery
//
// The engine never calls ash directly. It talks to the GPU through the
// `GpuContext` trait below, implemented by `backend::VulkanContext` for the
// real device and by a simulated GPU in tests.

pub mod driver;
pub mod error;
pub mod invalidation;
pub mod slots;
pub mod swapchain;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use ash::vk;

pub use driver::{FrameDriver, FrameStage, FrameStatus, Overlay};
pub use error::FrameError;
pub use invalidation::{ResizeFlag, WindowSource};
pub use swapchain::{SwapchainManager, SwapchainPreferences};

/// Default number of frames the CPU may run ahead of the GPU
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image is ready to be rendered into
    Acquired(u32),
    /// Image is usable but the swapchain no longer matches the surface
    Suboptimal(u32),
    /// Swapchain can't be used any more; nothing was signaled
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn is_stale(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// What the surface currently supports, queried fresh for every swapchain build
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Everything the backend needs to create a swapchain handle
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// The GPU operations the frame engine relies on.
///
/// Handles are plain Vulkan handles so the engine can store them by value.
/// All waits are unbounded: a stalled device stalls the caller.
pub trait GpuContext {
    // Frame slot resources
    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn destroy_fence(&self, fence: vk::Fence);
    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);

    // CPU-side waits
    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    fn wait_idle(&self) -> Result<()>;

    // Swapchain lifecycle
    fn surface_support(&self) -> Result<SurfaceSupport>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<(vk::SwapchainKHR, Vec<vk::Image>)>;
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView>;
    fn create_framebuffer(&self, view: vk::ImageView, extent: vk::Extent2D) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    fn destroy_image_view(&self, view: vk::ImageView);
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    // Per-frame work
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        image_acquired: vk::Semaphore,
    ) -> Result<AcquireOutcome>;
    fn begin_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    );
    fn draw_scene(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D);
    fn end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn end_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()>;
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome>;
}

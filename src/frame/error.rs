//! Fatal conditions raised by the frame engine itself.

use thiserror::Error;

/// Errors the frame engine reports on its own behalf.
///
/// Staleness (out-of-date or suboptimal surfaces) is never an error; it is
/// recovered by rebuilding the swapchain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The surface offers no formats at all
    #[error("Surface reports no usable formats")]
    NoSurfaceFormats,

    /// The surface offers no present modes at all
    #[error("Surface reports no usable present modes")]
    NoPresentModes,

    /// Swapchain creation was attempted for a zero-sized window
    #[error("Swapchain extent is zero ({width}x{height})")]
    ZeroExtent { width: u32, height: u32 },

    /// A frame slot pool must hold at least one slot
    #[error("Frame slot pool needs at least one slot")]
    NoFrameSlots,

    /// A frame was started while no swapchain exists
    #[error("No swapchain has been created")]
    MissingSwapchain,

    /// A frame was started after the driver released its resources
    #[error("Frame driver has been shut down")]
    ShutDown,

    /// The swapchain handed out an index it doesn't have a framebuffer for
    #[error("Image index {index} out of range for {count} swapchain images")]
    ImageIndexOutOfRange { index: u32, count: usize },
}

// Surface invalidation - resize notifications and stale swapchains
//
// The window-event handler raises the ResizeFlag; the frame driver reads and
// clears it once per frame. Both run on the control thread, interleaved by
// the event pump, so a relaxed atomic is plenty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use super::{FrameError, GpuContext, SwapchainManager};

/// Shared "the window was resized" cell.
///
/// Cloning hands out another reference to the same cell; it never owns the
/// window or the renderer.
#[derive(Debug, Clone, Default)]
pub struct ResizeFlag(Arc<AtomicBool>);

impl ResizeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer side, called from the window-event handler
    pub fn notify(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Reader side: returns whether a resize was pending and clears it
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The windowing collaborator as seen by the frame engine
pub trait WindowSource {
    /// Current drawable size in physical pixels
    fn pixel_size(&self) -> vk::Extent2D;

    /// Block until at least one window event has been processed
    fn wait_events(&mut self);

    fn should_close(&self) -> bool;
}

fn is_zero(size: vk::Extent2D) -> bool {
    size.width == 0 || size.height == 0
}

/// Block until the window has a drawable area (e.g. it was un-minimized).
///
/// Returns `None` if the window is closed while waiting.
pub fn wait_for_drawable_size<W: WindowSource>(window: &mut W) -> Option<vk::Extent2D> {
    let mut size = window.pixel_size();
    if is_zero(size) {
        log::debug!("Window has zero size, waiting for it to be restored");
    }
    while is_zero(size) {
        if window.should_close() {
            return None;
        }
        window.wait_events();
        size = window.pixel_size();
    }
    Some(size)
}

/// Build the swapchain for the window's current size.
///
/// A surface can report a 0x0 extent of its own while the window still has
/// a size (minimize races on some platforms); that is waited out like
/// minimization. Returns `false` if the window closed first.
pub fn build_for_window<G: GpuContext, W: WindowSource>(
    gpu: &G,
    swapchain: &mut SwapchainManager,
    window: &mut W,
) -> Result<bool> {
    loop {
        let Some(size) = wait_for_drawable_size(window) else {
            return Ok(false);
        };

        match swapchain.rebuild(gpu, size) {
            Ok(_) => return Ok(true),
            Err(e) => match e.downcast_ref::<FrameError>() {
                Some(FrameError::ZeroExtent { .. }) => {
                    log::debug!("Surface extent is zero, waiting for window events");
                }
                _ => return Err(e),
            },
        }

        window.wait_events();
        if window.should_close() {
            return Ok(false);
        }
    }
}

/// Rebuild the swapchain for the window's current size.
///
/// Waits through minimization, then for the device to go idle, then
/// rebuilds swapchain, views and framebuffers. Frame slots and the pipeline
/// are left alone. A successful rebuild used the latest size, so any resize
/// raised while waiting is cleared. Returns whether a rebuild happened (it
/// doesn't if the window closed while minimized).
pub fn handle_resize<G: GpuContext, W: WindowSource>(
    gpu: &G,
    swapchain: &mut SwapchainManager,
    window: &mut W,
    resize: &ResizeFlag,
) -> Result<bool> {
    if wait_for_drawable_size(window).is_none() {
        log::debug!("Window closed while minimized, skipping swapchain rebuild");
        return Ok(false);
    }

    gpu.wait_idle()?;
    if !build_for_window(gpu, swapchain, window)? {
        log::debug!("Window closed before the surface had a size, swapchain not rebuilt");
        return Ok(false);
    }

    resize.take();
    Ok(true)
}

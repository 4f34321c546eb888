// Frame driver - the per-frame state machine
//
// FRAME TIMELINE (one call to run_frame):
// ┌──────────────────────────────────────────────────────────────────────┐
// │ wait fence ─> acquire ─> reset fence ─> record ─> submit ─> present  │
// │    (CPU)        │           (only after      (GPU waits on acquire   │
// │                 │            a real image)    at color output)       │
// │                 └─ out of date: rebuild, retry next call             │
// └──────────────────────────────────────────────────────────────────────┘
//
// The fence wait is the only backpressure: at most N submissions are ever
// outstanding, one per slot.

use anyhow::{bail, Context, Result};
use ash::vk;

use super::invalidation::{build_for_window, handle_resize, wait_for_drawable_size};
use super::slots::{FrameSlot, FrameSlotPool};
use super::{
    AcquireOutcome, FrameError, GpuContext, ResizeFlag, SwapchainManager, SwapchainPreferences,
    WindowSource,
};

/// Optional UI layer drawn on top of the scene, inside the same render pass
pub trait Overlay {
    fn begin_frame(&mut self);

    fn layout(&mut self) {}

    fn render_into(&mut self, command_buffer: vk::CommandBuffer);

    /// Release GPU resources (descriptor pools etc.). Called once, after the
    /// device has gone idle at shutdown.
    fn destroy(&mut self) {}
}

/// Where the driver is within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Idle,
    Waiting(usize),
    Acquiring,
    Recording,
    Submitting,
    Presenting,
}

/// What happened during one `run_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Work was submitted and the image queued for presentation
    Presented { slot: usize, image_index: u32 },
    /// The swapchain was out of date at acquire; it was rebuilt instead
    Skipped,
}

/// Index of the active frame slot, advanced modulo the pool size
#[derive(Debug, Clone, Copy)]
pub struct FrameCounter {
    index: usize,
    len: usize,
}

impl FrameCounter {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    pub fn current(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.len;
    }
}

pub struct FrameDriver<G: GpuContext> {
    gpu: G,
    slots: FrameSlotPool,
    swapchain: SwapchainManager,
    counter: FrameCounter,
    resize: ResizeFlag,
    overlay: Option<Box<dyn Overlay>>,
    stage: FrameStage,
    frames_presented: u64,
    shut_down: bool,
}

impl<G: GpuContext> FrameDriver<G> {
    /// Create the slot pool and the first swapchain.
    ///
    /// Blocks while the window has no drawable area.
    pub fn new<W: WindowSource>(
        gpu: G,
        preferences: SwapchainPreferences,
        frames_in_flight: usize,
        resize: ResizeFlag,
        window: &mut W,
    ) -> Result<Self> {
        let size = wait_for_drawable_size(window)
            .context("Window closed before the first swapchain could be created")?;

        log::debug!("Window ready at {}x{}", size.width, size.height);

        let mut slots = FrameSlotPool::create(&gpu, frames_in_flight)?;
        let mut swapchain = SwapchainManager::new(preferences);
        match build_for_window(&gpu, &mut swapchain, window) {
            Ok(true) => {}
            Ok(false) => {
                slots.destroy(&gpu);
                bail!("Window closed before the first swapchain could be created");
            }
            Err(e) => {
                slots.destroy(&gpu);
                return Err(e);
            }
        }

        Ok(Self {
            gpu,
            counter: FrameCounter::new(slots.len()),
            slots,
            swapchain,
            resize,
            overlay: None,
            stage: FrameStage::Idle,
            frames_presented: 0,
            shut_down: false,
        })
    }

    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.overlay = Some(overlay);
    }

    /// Same as raising the shared ResizeFlag
    pub fn notify_resized(&self) {
        self.resize.notify();
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn slots(&self) -> &FrameSlotPool {
        &self.slots
    }

    pub fn current_slot(&self) -> usize {
        self.counter.current()
    }

    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Drive one frame through wait, acquire, record, submit and present.
    ///
    /// Staleness is handled here by rebuilding the swapchain; only
    /// unexpected device errors are returned.
    pub fn run_frame<W: WindowSource>(&mut self, window: &mut W) -> Result<FrameStatus> {
        if self.shut_down {
            return Err(FrameError::ShutDown.into());
        }

        let slot_index = self.counter.current();
        let slot = *self.slots.get(slot_index);

        // ─────────────────────────────────────────────────────────────────
        // Waiting: previous submission from this slot must be finished
        // ─────────────────────────────────────────────────────────────────
        self.stage = FrameStage::Waiting(slot_index);
        self.gpu
            .wait_for_fence(slot.in_flight())
            .context("Failed waiting for frame fence")?;

        // ─────────────────────────────────────────────────────────────────
        // Acquiring
        // ─────────────────────────────────────────────────────────────────
        self.stage = FrameStage::Acquiring;
        let swapchain = self
            .swapchain
            .state()
            .ok_or(FrameError::MissingSwapchain)?
            .swapchain;

        let (image_index, suboptimal) =
            match self.gpu.acquire_next_image(swapchain, slot.image_acquired())? {
                AcquireOutcome::Acquired(index) => (index, false),
                AcquireOutcome::Suboptimal(index) => (index, true),
                AcquireOutcome::OutOfDate => {
                    // Nothing was signaled and the fence is untouched, so the
                    // slot is exactly as it was; retry it next frame.
                    log::debug!("Swapchain out of date during acquire");
                    self.stage = FrameStage::Idle;
                    self.rebuild(window)?;
                    return Ok(FrameStatus::Skipped);
                }
            };

        // Only now is this frame certain to submit and signal the fence again
        self.gpu.reset_fence(slot.in_flight())?;

        // ─────────────────────────────────────────────────────────────────
        // Recording
        // ─────────────────────────────────────────────────────────────────
        self.stage = FrameStage::Recording;
        self.record(&slot, image_index)?;

        // ─────────────────────────────────────────────────────────────────
        // Submitting
        // ─────────────────────────────────────────────────────────────────
        self.stage = FrameStage::Submitting;
        self.gpu
            .submit(
                slot.command_buffer(),
                slot.image_acquired(),
                slot.render_finished(),
                slot.in_flight(),
            )
            .context("Failed to submit frame")?;

        // ─────────────────────────────────────────────────────────────────
        // Presenting
        // ─────────────────────────────────────────────────────────────────
        self.stage = FrameStage::Presenting;
        let presented = self
            .gpu
            .present(swapchain, image_index, slot.render_finished())
            .context("Failed to present frame")?;
        let resized = self.resize.take();

        if suboptimal || presented.is_stale() || resized {
            log::debug!(
                "Rebuilding swapchain after present (suboptimal acquire: {}, present: {:?}, resized: {})",
                suboptimal,
                presented,
                resized
            );
            self.rebuild(window)?;
        }

        self.counter.advance();
        self.frames_presented += 1;
        self.stage = FrameStage::Idle;

        Ok(FrameStatus::Presented {
            slot: slot_index,
            image_index,
        })
    }

    fn record(&mut self, slot: &FrameSlot, image_index: u32) -> Result<()> {
        let state = self.swapchain.state().ok_or(FrameError::MissingSwapchain)?;
        let framebuffer = *state.framebuffers.get(image_index as usize).ok_or(
            FrameError::ImageIndexOutOfRange {
                index: image_index,
                count: state.framebuffers.len(),
            },
        )?;
        let extent = state.extent;
        let cmd = slot.command_buffer();

        self.gpu.begin_commands(cmd)?;
        self.gpu.begin_render_pass(cmd, framebuffer, extent);
        self.gpu.draw_scene(cmd, extent);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.begin_frame();
            overlay.layout();
            overlay.render_into(cmd);
        }
        self.gpu.end_render_pass(cmd);
        self.gpu.end_commands(cmd)?;

        Ok(())
    }

    fn rebuild<W: WindowSource>(&mut self, window: &mut W) -> Result<()> {
        handle_resize(&self.gpu, &mut self.swapchain, window, &self.resize)
            .context("Failed to rebuild swapchain")?;
        Ok(())
    }

    /// Wait for the device, then release swapchain, frame slots and the
    /// overlay's resources, in that order. Safe to call more than once; if
    /// the idle wait fails nothing is released and a later call retries.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }

        log::info!("Shutting down after {} frames", self.frames_presented);
        self.gpu.wait_idle().context("Failed waiting for device idle")?;
        self.shut_down = true;

        self.swapchain.destroy(&self.gpu);
        self.slots.destroy(&self.gpu);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.destroy();
        }
        self.stage = FrameStage::Idle;

        Ok(())
    }
}

impl<G: GpuContext> Drop for FrameDriver<G> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Frame driver teardown failed: {:?}", e);
        }
    }
}

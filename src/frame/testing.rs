//! Simulated GPU and window for exercising the frame engine without a device.
//!
//! The simulated GPU never finishes work on its own: a submission stays in
//! flight until the CPU waits on its fence or waits for idle. That makes the
//! number of outstanding submissions observable, and any ordering mistake
//! (re-recording a busy command buffer, waiting on a fence nobody will
//! signal, destroying something still referenced) is recorded as a
//! violation instead of hanging or crashing the test.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use anyhow::{bail, Result};
use ash::vk::{self, Handle};

use super::{
    AcquireOutcome, GpuContext, PresentOutcome, ResizeFlag, SurfaceSupport, SwapchainDesc,
    WindowSource,
};

/// One observable GPU interaction, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    WaitIdle,
    CreateSwapchain { width: u32, height: u32, image_count: u32 },
    DestroySwapchain(vk::SwapchainKHR),
    Acquire(vk::SwapchainKHR),
    BeginCommands(vk::CommandBuffer),
    BeginRenderPass(vk::Framebuffer),
    Draw { width: u32, height: u32 },
    EndRenderPass,
    EndCommands(vk::CommandBuffer),
    Submit { command_buffer: vk::CommandBuffer, fence: vk::Fence },
    Present { image_index: u32 },
    Overlay(&'static str),
}

/// Scripted result for an upcoming acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAcquire {
    OutOfDate,
    Suboptimal,
}

#[derive(Debug, Default, Clone, Copy)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

#[derive(Debug)]
struct SwapchainRecord {
    image_count: u32,
    next_image: u32,
}

pub struct MockGpu {
    next_handle: Cell<u64>,
    log: Rc<RefCell<Vec<Call>>>,
    violations: RefCell<Vec<String>>,

    fences: RefCell<HashMap<vk::Fence, FenceState>>,
    semaphores: RefCell<HashMap<vk::Semaphore, bool>>,
    command_buffers: RefCell<HashSet<vk::CommandBuffer>>,
    last_submission: RefCell<HashMap<vk::CommandBuffer, vk::Fence>>,

    swapchains: RefCell<HashMap<vk::SwapchainKHR, SwapchainRecord>>,
    image_views: RefCell<HashSet<vk::ImageView>>,
    framebuffers: RefCell<HashSet<vk::Framebuffer>>,

    support: RefCell<SurfaceSupport>,
    acquire_script: RefCell<VecDeque<ScriptedAcquire>>,
    present_script: RefCell<VecDeque<PresentOutcome>>,

    max_in_flight: Cell<usize>,
    fail_fence_creation: Cell<bool>,
    fail_wait_idle: Cell<bool>,
    zero_extent_queries: Cell<usize>,
}

impl MockGpu {
    /// Surface with an indeterminate current extent, 2..=3 images, and both
    /// FIFO and MAILBOX available.
    pub fn new() -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        let support = SurfaceSupport {
            capabilities,
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        Self {
            next_handle: Cell::new(1),
            log: Rc::new(RefCell::new(Vec::new())),
            violations: RefCell::new(Vec::new()),
            fences: RefCell::new(HashMap::new()),
            semaphores: RefCell::new(HashMap::new()),
            command_buffers: RefCell::new(HashSet::new()),
            last_submission: RefCell::new(HashMap::new()),
            swapchains: RefCell::new(HashMap::new()),
            image_views: RefCell::new(HashSet::new()),
            framebuffers: RefCell::new(HashSet::new()),
            support: RefCell::new(support),
            acquire_script: RefCell::new(VecDeque::new()),
            present_script: RefCell::new(VecDeque::new()),
            max_in_flight: Cell::new(0),
            fail_fence_creation: Cell::new(false),
            fail_wait_idle: Cell::new(false),
            zero_extent_queries: Cell::new(0),
        }
    }

    /// Surface that dictates its own extent regardless of the window
    pub fn with_fixed_extent(width: u32, height: u32) -> Self {
        let gpu = Self::new();
        gpu.support.borrow_mut().capabilities.current_extent = vk::Extent2D { width, height };
        gpu
    }

    pub fn set_support(&self, support: SurfaceSupport) {
        *self.support.borrow_mut() = support;
    }

    pub fn script_acquire(&self, outcome: ScriptedAcquire) {
        self.acquire_script.borrow_mut().push_back(outcome);
    }

    pub fn script_present(&self, outcome: PresentOutcome) {
        self.present_script.borrow_mut().push_back(outcome);
    }

    pub fn fail_fence_creation(&self) {
        self.fail_fence_creation.set(true);
    }

    /// The next `wait_idle` reports a lost device
    pub fn fail_next_wait_idle(&self) {
        self.fail_wait_idle.set(true);
    }

    /// The next `queries` surface queries report a fixed 0x0 extent
    pub fn zero_extent_for(&self, queries: usize) {
        self.zero_extent_queries.set(queries);
    }

    /// Shared call log, for collaborators (overlays) that record into it
    pub fn log_handle(&self) -> Rc<RefCell<Vec<Call>>> {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.borrow().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.get()
    }

    pub fn in_flight(&self) -> usize {
        self.fences.borrow().values().filter(|f| f.pending).count()
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.fences.borrow().get(&fence).is_some_and(|f| f.signaled)
    }

    /// Count of every live handle the GPU still knows about
    pub fn live_resources(&self) -> usize {
        self.fences.borrow().len()
            + self.semaphores.borrow().len()
            + self.command_buffers.borrow().len()
            + self.swapchains.borrow().len()
            + self.image_views.borrow().len()
            + self.framebuffers.borrow().len()
    }

    pub fn live_swapchains(&self) -> usize {
        self.swapchains.borrow().len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.borrow().len()
    }

    fn next<H: Handle>(&self) -> H {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        H::from_raw(raw)
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn violation(&self, message: String) {
        self.violations.borrow_mut().push(message);
    }

    fn fence_pending(&self, fence: vk::Fence) -> bool {
        self.fences.borrow().get(&fence).is_some_and(|f| f.pending)
    }

    fn command_buffer_busy(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.last_submission
            .borrow()
            .get(&command_buffer)
            .is_some_and(|&fence| self.fence_pending(fence))
    }

    fn complete(state: &mut FenceState) {
        if state.pending {
            state.pending = false;
            state.signaled = true;
        }
    }
}

impl GpuContext for MockGpu {
    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let semaphore = self.next();
        self.semaphores.borrow_mut().insert(semaphore, false);
        Ok(semaphore)
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        if self.fail_fence_creation.get() {
            bail!("simulated fence allocation failure");
        }
        let fence = self.next();
        self.fences
            .borrow_mut()
            .insert(fence, FenceState { signaled, pending: false });
        Ok(fence)
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let command_buffer = self.next();
        self.command_buffers.borrow_mut().insert(command_buffer);
        Ok(command_buffer)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        if self.semaphores.borrow_mut().remove(&semaphore).is_none() {
            self.violation(format!("destroying unknown semaphore {semaphore:?}"));
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        if self.fence_pending(fence) {
            self.violation(format!("destroying fence {fence:?} while in flight"));
        }
        self.fences.borrow_mut().remove(&fence);
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        if self.command_buffer_busy(command_buffer) {
            self.violation(format!("freeing command buffer {command_buffer:?} while in flight"));
        }
        self.command_buffers.borrow_mut().remove(&command_buffer);
        self.last_submission.borrow_mut().remove(&command_buffer);
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        self.record(Call::WaitFence(fence));
        let signaled = {
            let mut fences = self.fences.borrow_mut();
            fences.get_mut(&fence).map(|state| {
                Self::complete(state);
                state.signaled
            })
        };
        match signaled {
            Some(true) => Ok(()),
            Some(false) => {
                self.violation(format!("fence {fence:?} is unsignaled with nothing in flight"));
                bail!("wait would never return")
            }
            None => {
                self.violation(format!("waiting on unknown fence {fence:?}"));
                bail!("unknown fence")
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        self.record(Call::ResetFence(fence));
        if self.fence_pending(fence) {
            self.violation(format!("resetting fence {fence:?} while in flight"));
        }
        if let Some(state) = self.fences.borrow_mut().get_mut(&fence) {
            state.signaled = false;
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.record(Call::WaitIdle);
        if self.fail_wait_idle.replace(false) {
            bail!("device lost");
        }
        for state in self.fences.borrow_mut().values_mut() {
            Self::complete(state);
        }
        Ok(())
    }

    fn surface_support(&self) -> Result<SurfaceSupport> {
        let mut support = self.support.borrow().clone();
        let zero_queries = self.zero_extent_queries.get();
        if zero_queries > 0 {
            self.zero_extent_queries.set(zero_queries - 1);
            support.capabilities.current_extent = vk::Extent2D { width: 0, height: 0 };
        }
        Ok(support)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<(vk::SwapchainKHR, Vec<vk::Image>)> {
        self.record(Call::CreateSwapchain {
            width: desc.extent.width,
            height: desc.extent.height,
            image_count: desc.min_image_count,
        });
        if !self.swapchains.borrow().is_empty() {
            self.violation("creating a swapchain while the previous one is alive".to_string());
        }
        let swapchain = self.next();
        let images = (0..desc.min_image_count).map(|_| self.next()).collect();
        self.swapchains.borrow_mut().insert(
            swapchain,
            SwapchainRecord { image_count: desc.min_image_count, next_image: 0 },
        );
        Ok((swapchain, images))
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> Result<vk::ImageView> {
        let view = self.next();
        self.image_views.borrow_mut().insert(view);
        Ok(view)
    }

    fn create_framebuffer(&self, view: vk::ImageView, _extent: vk::Extent2D) -> Result<vk::Framebuffer> {
        if !self.image_views.borrow().contains(&view) {
            self.violation(format!("framebuffer over unknown view {view:?}"));
        }
        let framebuffer = self.next();
        self.framebuffers.borrow_mut().insert(framebuffer);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.framebuffers.borrow_mut().remove(&framebuffer);
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.image_views.borrow_mut().remove(&view);
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.record(Call::DestroySwapchain(swapchain));
        if self.in_flight() > 0 {
            self.violation(format!("destroying swapchain {swapchain:?} with work in flight"));
        }
        self.swapchains.borrow_mut().remove(&swapchain);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        image_acquired: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        self.record(Call::Acquire(swapchain));
        let scripted = self.acquire_script.borrow_mut().pop_front();
        if scripted == Some(ScriptedAcquire::OutOfDate) {
            return Ok(AcquireOutcome::OutOfDate);
        }

        let index = {
            let mut swapchains = self.swapchains.borrow_mut();
            swapchains.get_mut(&swapchain).map(|record| {
                let index = record.next_image;
                record.next_image = (record.next_image + 1) % record.image_count;
                index
            })
        };
        let Some(index) = index else {
            self.violation(format!("acquiring from dead swapchain {swapchain:?}"));
            bail!("dead swapchain");
        };

        let semaphore = self.semaphores.borrow().get(&image_acquired).copied();
        match semaphore {
            Some(true) => {
                self.violation(format!("acquire semaphore {image_acquired:?} already signaled"))
            }
            Some(false) => {
                self.semaphores.borrow_mut().insert(image_acquired, true);
            }
            None => self.violation(format!("acquire with unknown semaphore {image_acquired:?}")),
        }

        Ok(match scripted {
            Some(ScriptedAcquire::Suboptimal) => AcquireOutcome::Suboptimal(index),
            _ => AcquireOutcome::Acquired(index),
        })
    }

    fn begin_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.record(Call::BeginCommands(command_buffer));
        if self.command_buffer_busy(command_buffer) {
            self.violation(format!("re-recording command buffer {command_buffer:?} while in flight"));
        }
        Ok(())
    }

    fn begin_render_pass(
        &self,
        _command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        _extent: vk::Extent2D,
    ) {
        if !self.framebuffers.borrow().contains(&framebuffer) {
            self.violation(format!("render pass on dead framebuffer {framebuffer:?}"));
        }
        self.record(Call::BeginRenderPass(framebuffer));
    }

    fn draw_scene(&self, _command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        self.record(Call::Draw { width: extent.width, height: extent.height });
    }

    fn end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    fn end_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.record(Call::EndCommands(command_buffer));
        Ok(())
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        self.record(Call::Submit { command_buffer, fence });

        if self.semaphores.borrow().get(&wait).copied() != Some(true) {
            self.violation(format!("submit waits on unsignaled semaphore {wait:?}"));
        }
        {
            let mut semaphores = self.semaphores.borrow_mut();
            semaphores.insert(wait, false);
            semaphores.insert(signal, true);
        }

        let previous = self.fences.borrow().get(&fence).copied().unwrap_or_default();
        if previous.signaled || previous.pending {
            self.violation(format!("submit with fence {fence:?} not reset"));
        }
        self.fences
            .borrow_mut()
            .insert(fence, FenceState { signaled: false, pending: true });

        self.last_submission.borrow_mut().insert(command_buffer, fence);
        let in_flight = self.in_flight();
        if in_flight > self.max_in_flight.get() {
            self.max_in_flight.set(in_flight);
        }
        Ok(())
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        self.record(Call::Present { image_index });
        if !self.swapchains.borrow().contains_key(&swapchain) {
            self.violation(format!("presenting to dead swapchain {swapchain:?}"));
        }
        self.semaphores.borrow_mut().insert(wait, false);
        Ok(self
            .present_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }
}

/// Window whose pixel size only changes when events are pumped
pub struct MockWindow {
    size: vk::Extent2D,
    pending: VecDeque<vk::Extent2D>,
    resize: Option<ResizeFlag>,
    closed: bool,
    pub waits: usize,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: vk::Extent2D { width, height },
            pending: VecDeque::new(),
            resize: None,
            closed: false,
            waits: 0,
        }
    }

    /// Raise this flag whenever a queued size is delivered
    pub fn notify(mut self, resize: ResizeFlag) -> Self {
        self.resize = Some(resize);
        self
    }

    /// Sizes delivered one per `wait_events`
    pub fn queue_sizes(&mut self, sizes: &[(u32, u32)]) {
        self.pending.extend(
            sizes
                .iter()
                .map(|&(width, height)| vk::Extent2D { width, height }),
        );
    }

    /// Resize immediately, as if the event had already been polled
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = vk::Extent2D { width, height };
        if let Some(resize) = &self.resize {
            resize.notify();
        }
    }
}

impl WindowSource for MockWindow {
    fn pixel_size(&self) -> vk::Extent2D {
        self.size
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        match self.pending.pop_front() {
            Some(size) => {
                self.size = size;
                if let Some(resize) = &self.resize {
                    resize.notify();
                }
            }
            // Nothing left to deliver; behave like the user closed the window
            None => self.closed = true,
        }
    }

    fn should_close(&self) -> bool {
        self.closed
    }
}

// VulkanContext - the real GpuContext
//
// Owns everything that outlives a swapchain: command pool, render pass,
// triangle pipeline and vertex buffer. Per-frame objects (semaphores, fences,
// command buffers) and swapchain objects are created here on request but
// owned by the frame engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ash::vk;

use super::buffer::VertexBuffer;
use super::pipeline::{create_framebuffer, create_render_pass, TrianglePipeline};
use super::swapchain::SwapchainLoader;
use super::{sync, VulkanDevice};
use crate::frame::swapchain::choose_surface_format;
use crate::frame::{
    AcquireOutcome, GpuContext, PresentOutcome, SurfaceSupport, SwapchainDesc,
    SwapchainPreferences,
};
use crate::scene::TRIANGLE;

pub struct VulkanContext {
    vertex_buffer: VertexBuffer,
    pipeline: TrianglePipeline,
    render_pass: vk::RenderPass,
    render_format: vk::Format,
    command_pool: vk::CommandPool,
    swapchains: SwapchainLoader,
    clear_color: [f32; 4],
    device: Arc<VulkanDevice>,
}

impl VulkanContext {
    /// Build the render pass for the format the swapchain will use, then the
    /// pipeline and vertex buffer.
    pub fn new(
        device: Arc<VulkanDevice>,
        preferences: &SwapchainPreferences,
        shader_dir: &Path,
        clear_color: [f32; 4],
    ) -> Result<Self> {
        let support = device.surface_support()?;
        let surface_format = choose_surface_format(&support.formats, preferences)
            .context("Surface reports no formats")?;
        log::info!(
            "Surface format: {:?} / {:?}",
            surface_format.format,
            surface_format.color_space
        );

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.queue_families.graphics);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let render_pass = match create_render_pass(&device, surface_format.format) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                unsafe { device.device.destroy_command_pool(command_pool, None) };
                return Err(e);
            }
        };

        let built = TrianglePipeline::new(&device, render_pass, shader_dir).and_then(|pipeline| {
            match VertexBuffer::new(device.clone(), "triangle vertices", &TRIANGLE) {
                Ok(vertex_buffer) => Ok((pipeline, vertex_buffer)),
                Err(e) => {
                    pipeline.destroy(&device);
                    Err(e)
                }
            }
        });
        let (pipeline, vertex_buffer) = match built {
            Ok(built) => built,
            Err(e) => {
                unsafe {
                    device.device.destroy_render_pass(render_pass, None);
                    device.device.destroy_command_pool(command_pool, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            vertex_buffer,
            pipeline,
            render_pass,
            render_format: surface_format.format,
            command_pool,
            swapchains: SwapchainLoader::new(device.clone()),
            clear_color,
            device,
        })
    }
}

impl GpuContext for VulkanContext {
    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        sync::create_semaphore(&self.device.device)
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        sync::create_fence(&self.device.device, signaled)
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffer")?;
        buffers
            .into_iter()
            .next()
            .context("Driver returned no command buffer")
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.device.destroy_semaphore(semaphore, None) };
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.device.destroy_fence(fence, None) };
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .device
                .free_command_buffers(self.command_pool, &[command_buffer])
        };
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("vkWaitForFences failed")
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.device.reset_fences(&[fence]) }.context("vkResetFences failed")
    }

    fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    fn surface_support(&self) -> Result<SurfaceSupport> {
        self.device.surface_support()
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<(vk::SwapchainKHR, Vec<vk::Image>)> {
        // The render pass (and with it the pipeline) is built once
        if desc.surface_format.format != self.render_format {
            bail!(
                "Surface format changed from {:?} to {:?}",
                self.render_format,
                desc.surface_format.format
            );
        }
        self.swapchains.create(desc)
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
        self.swapchains.create_image_view(image, format)
    }

    fn create_framebuffer(&self, view: vk::ImageView, extent: vk::Extent2D) -> Result<vk::Framebuffer> {
        create_framebuffer(&self.device, self.render_pass, view, extent)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.device.destroy_framebuffer(framebuffer, None) };
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.device.destroy_image_view(view, None) };
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.swapchains.destroy(swapchain);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        image_acquired: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        self.swapchains.acquire(swapchain, image_acquired)
    }

    fn begin_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            self.device
                .device
                .begin_command_buffer(command_buffer, &begin_info)
                .context("Failed to begin command buffer")?;
        }
        Ok(())
    }

    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn draw_scene(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let device = &self.device.device;
        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline,
            );
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_draw(command_buffer, self.vertex_buffer.vertex_count, 1, 0, 0);
        }
    }

    fn end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.device.cmd_end_render_pass(command_buffer) };
    }

    fn end_commands(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe { self.device.device.end_command_buffer(command_buffer) }
            .context("Failed to end command buffer")
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info], fence)
        }
        .context("vkQueueSubmit failed")
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        self.swapchains.present(swapchain, image_index, wait)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("{:?}", e);
        }
        unsafe {
            // Also frees any command buffers still allocated from it
            self.device.device.destroy_command_pool(self.command_pool, None);
            self.pipeline.destroy(&self.device);
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
        // vertex_buffer releases its memory in its own Drop
    }
}

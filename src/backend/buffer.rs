// Vertex buffer
//
// Host-visible memory from gpu-allocator, filled once at startup. The
// triangle never changes, so there is no staging copy to device-local memory.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::VulkanDevice;

pub struct VertexBuffer {
    pub buffer: vk::Buffer,
    pub vertex_count: u32,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl VertexBuffer {
    pub fn new<T: Copy>(device: Arc<VulkanDevice>, name: &str, vertices: &[T]) -> Result<Self> {
        let size = std::mem::size_of_val(vertices);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create vertex buffer")?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let mut allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).context("Failed to allocate vertex buffer memory");
            }
        };

        let filled = Self::bind_and_fill(&device, buffer, &mut allocation, vertices);
        if let Err(e) = filled {
            unsafe { device.device.destroy_buffer(buffer, None) };
            if let Err(free_err) = device.allocator().free(allocation) {
                log::error!("Failed to free vertex buffer memory: {}", free_err);
            }
            return Err(e);
        }

        log::debug!("Vertex buffer '{}' created ({} bytes)", name, size);

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
            allocation: Some(allocation),
            device,
        })
    }

    fn bind_and_fill<T: Copy>(
        device: &VulkanDevice,
        buffer: vk::Buffer,
        allocation: &mut Allocation,
        vertices: &[T],
    ) -> Result<()> {
        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }
        .context("Failed to bind vertex buffer memory")?;

        let size = std::mem::size_of_val(vertices);
        let mapped = allocation
            .mapped_slice_mut()
            .context("Vertex buffer memory is not host visible")?;

        // Memory is HOST_COHERENT for CpuToGpu, no flush needed
        let bytes = unsafe { std::slice::from_raw_parts(vertices.as_ptr().cast::<u8>(), size) };
        mapped[..size].copy_from_slice(bytes);

        Ok(())
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::error!("Failed to free vertex buffer memory: {}", e);
            }
        }
    }
}

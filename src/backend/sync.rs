// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU sync. Ownership and reuse
// rules are in frame::slots; these only create the handles.

use anyhow::{Context, Result};
use ash::vk;

pub fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::default();
    unsafe { device.create_semaphore(&semaphore_info, None) }.context("Failed to create semaphore")
}

/// `signaled` fences satisfy their first wait immediately
pub fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let fence_info = vk::FenceCreateInfo::default().flags(flags);
    unsafe { device.create_fence(&fence_info, None) }.context("Failed to create fence")
}

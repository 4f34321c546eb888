// Frame slots - per-frame synchronization and command recording
//
// One slot per frame in flight, created once and reused forever. The pool
// size N is unrelated to the number of swapchain images: slots are indexed
// by the frame counter, framebuffers by the acquired image index.

use anyhow::Result;
use ash::vk;

use super::{FrameError, GpuContext};

/// Frame synchronization - one per frame in flight
///
/// ```text
/// 1. CPU waits on in_flight (previous submission from this slot is done)
/// 2. acquire signals image_acquired
/// 3. submit waits on image_acquired, signals render_finished + in_flight
/// 4. present waits on render_finished
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    image_acquired: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
    command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    fn new<G: GpuContext>(gpu: &G) -> Result<Self> {
        // Semaphores start unsignaled, the fence starts signaled so the
        // very first wait on a fresh slot returns immediately.
        let image_acquired = gpu.create_semaphore()?;
        let render_finished = match gpu.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                gpu.destroy_semaphore(image_acquired);
                return Err(e);
            }
        };
        let in_flight = match gpu.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                gpu.destroy_semaphore(image_acquired);
                gpu.destroy_semaphore(render_finished);
                return Err(e);
            }
        };
        let command_buffer = match gpu.allocate_command_buffer() {
            Ok(command_buffer) => command_buffer,
            Err(e) => {
                gpu.destroy_semaphore(image_acquired);
                gpu.destroy_semaphore(render_finished);
                gpu.destroy_fence(in_flight);
                return Err(e);
            }
        };

        Ok(Self {
            image_acquired,
            render_finished,
            in_flight,
            command_buffer,
        })
    }

    fn destroy<G: GpuContext>(&self, gpu: &G) {
        gpu.free_command_buffer(self.command_buffer);
        gpu.destroy_fence(self.in_flight);
        gpu.destroy_semaphore(self.render_finished);
        gpu.destroy_semaphore(self.image_acquired);
    }

    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired
    }

    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }

    pub fn in_flight(&self) -> vk::Fence {
        self.in_flight
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

/// Fixed-size pool of frame slots. Never grows after creation.
#[derive(Debug)]
pub struct FrameSlotPool {
    slots: Box<[FrameSlot]>,
}

impl FrameSlotPool {
    /// Allocate `count` slots. Anything created before a failure is released.
    pub fn create<G: GpuContext>(gpu: &G, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(FrameError::NoFrameSlots.into());
        }

        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            match FrameSlot::new(gpu) {
                Ok(slot) => {
                    log::debug!("Created frame slot {}", i);
                    slots.push(slot);
                }
                Err(e) => {
                    for slot in &slots {
                        slot.destroy(gpu);
                    }
                    return Err(e.context(format!("Failed to create frame slot {}", i)));
                }
            }
        }

        log::info!("Frame slot pool created with {} frames in flight", count);

        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }

    /// Release every slot. The device must be idle.
    pub fn destroy<G: GpuContext>(&mut self, gpu: &G) {
        for slot in self.slots.iter() {
            slot.destroy(gpu);
        }
        if !self.slots.is_empty() {
            log::debug!("Destroyed {} frame slots", self.slots.len());
        }
        self.slots = Box::new([]);
    }

    pub fn get(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }
}

// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use pulsar_core::{Error, Result};
use pulsar_render::FRAMES_IN_FLIGHT;

/// Per-slot command buffers and sync primitives, plus the timeline that
/// orders compute against graphics across slots.
///
/// None of this depends on the swapchain, so it survives rebuilds.
pub struct FrameSync {
    device: ash::Device,
    pub pool: vk::CommandPool,
    pub compute_cmds: Vec<vk::CommandBuffer>,
    pub graphics_cmds: Vec<vk::CommandBuffer>,
    /// Signalled by the graphics submission of each slot; created signalled.
    pub in_flight: Vec<vk::Fence>,
    pub image_available: Vec<vk::Semaphore>,
    pub timeline: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| Error::resource("command pool", e))?;

        let mut this = Self {
            device: device.clone(),
            pool,
            compute_cmds: Vec::new(),
            graphics_cmds: Vec::new(),
            in_flight: Vec::new(),
            image_available: Vec::new(),
            timeline: vk::Semaphore::null(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: FRAMES_IN_FLIGHT as u32,
            ..Default::default()
        };
        this.compute_cmds = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| Error::resource("compute command buffers", e))?;
        this.graphics_cmds = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| Error::resource("graphics command buffers", e))?;

        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let sem_ci = vk::SemaphoreCreateInfo::default();
        for _ in 0..FRAMES_IN_FLIGHT {
            let fence = unsafe { device.create_fence(&fence_ci, None) }
                .map_err(|e| Error::resource("in-flight fence", e))?;
            this.in_flight.push(fence);
            let sem = unsafe { device.create_semaphore(&sem_ci, None) }
                .map_err(|e| Error::resource("image-available semaphore", e))?;
            this.image_available.push(sem);
        }

        let mut type_ci = vk::SemaphoreTypeCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_TYPE_CREATE_INFO,
            semaphore_type: vk::SemaphoreType::TIMELINE,
            initial_value: 0,
            ..Default::default()
        };
        let timeline_ci = vk::SemaphoreCreateInfo::default().push_next(&mut type_ci);
        this.timeline = unsafe { device.create_semaphore(&timeline_ci, None) }
            .map_err(|e| Error::resource("timeline semaphore", e))?;

        Ok(this)
    }

    pub fn wait_fence(&self, slot: usize) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(std::slice::from_ref(&self.in_flight[slot]), true, u64::MAX)
        }
        .map_err(|e| Error::submission("wait in-flight fence", e))
    }

    pub fn reset_fence(&self, slot: usize) -> Result<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&self.in_flight[slot])) }
            .map_err(|e| Error::submission("reset in-flight fence", e))
    }

    /// Host-side wait until the timeline reaches `value`.
    pub fn wait_timeline(&self, value: u64) -> Result<()> {
        let info = vk::SemaphoreWaitInfo {
            s_type: vk::StructureType::SEMAPHORE_WAIT_INFO,
            semaphore_count: 1,
            p_semaphores: &self.timeline,
            p_values: &value,
            ..Default::default()
        };
        unsafe { self.device.wait_semaphores(&info, u64::MAX) }.map_err(|e| Error::submission("wait timeline", e))
    }

    pub fn timeline_value(&self) -> Result<u64> {
        unsafe { self.device.get_semaphore_counter_value(self.timeline) }
            .map_err(|e| Error::submission("timeline value", e))
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            if self.timeline != vk::Semaphore::null() {
                d.destroy_semaphore(self.timeline, None);
            }
            for &s in &self.image_available {
                d.destroy_semaphore(s, None);
            }
            for &f in &self.in_flight {
                d.destroy_fence(f, None);
            }
            // command buffers are freed with the pool
            d.destroy_command_pool(self.pool, None);
        }
    }
}

/// Records image barriers only; buffers are ordered by the timeline.
pub(crate) unsafe fn pipeline_barrier(device: &ash::Device, cmd: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2]) {
    let dep = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        image_memory_barrier_count: barriers.len() as u32,
        p_image_memory_barriers: barriers.as_ptr(),
        ..Default::default()
    };
    unsafe { device.cmd_pipeline_barrier2(cmd, &dep) };
}

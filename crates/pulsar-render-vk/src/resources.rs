// SPDX-License-Identifier: CEPL-1.0
//! Buffers created once at startup and never rebuilt.
use ash::vk;
use pulsar_core::{Error, Result};
use pulsar_render::{Particle, SimParams, FRAMES_IN_FLIGHT};
use tracing::debug;

use crate::memory::{Allocator, Buffer, MemoryLocation};

/// Double-buffered particle state; slot `i` writes `buffers[i]`.
pub struct SimulationBuffers {
    pub buffers: Vec<Buffer>,
    pub particle_count: u32,
}

impl SimulationBuffers {
    pub fn new(
        device: &ash::Device,
        queue: vk::Queue,
        pool: vk::CommandPool,
        allocator: &Allocator,
        particles: &[Particle],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(particles);
        let size = bytes.len() as vk::DeviceSize;
        let usage = vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::VERTEX_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST;
        let buffers = (0..FRAMES_IN_FLIGHT)
            .map(|_| allocator.create_buffer("simulation buffer", size, usage, MemoryLocation::DeviceLocal))
            .collect::<Result<Vec<_>>>()?;

        let targets: Vec<&Buffer> = buffers.iter().collect();
        upload_via_staging(device, queue, pool, allocator, &targets, bytes)?;
        debug!("seeded {} particles into {} buffers", particles.len(), buffers.len());

        Ok(Self {
            buffers,
            particle_count: particles.len() as u32,
        })
    }
}

/// One persistently mapped [`SimParams`] block per frame slot.
pub struct UniformBuffers {
    pub buffers: Vec<Buffer>,
}

impl UniformBuffers {
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<SimParams>() as vk::DeviceSize;

    pub fn new(allocator: &Allocator) -> Result<Self> {
        let buffers = (0..FRAMES_IN_FLIGHT)
            .map(|_| {
                allocator.create_buffer(
                    "uniform buffer",
                    Self::SIZE,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::HostVisible,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { buffers })
    }

    pub fn write(&self, slot: usize, params: &SimParams) -> Result<()> {
        let buf = self
            .buffers
            .get(slot)
            .ok_or_else(|| Error::resource("uniform write", format!("no slot {slot}")))?;
        buf.write(0, bytemuck::bytes_of(params))
    }
}

/// One-shot staging upload: host → staging, then staging → every `dst` on the
/// given queue. Waits for completion; the staging buffer is gone on return.
pub fn upload_via_staging(
    device: &ash::Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
    allocator: &Allocator,
    dsts: &[&Buffer],
    data: &[u8],
) -> Result<()> {
    let staging = staged(allocator, data)?;
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size: data.len() as vk::DeviceSize,
    };
    one_time_submit(device, queue, pool, |cmd| {
        for dst in dsts {
            unsafe { device.cmd_copy_buffer(cmd, staging.handle, dst.handle, std::slice::from_ref(&region)) };
        }
    })
}

/// Host-visible copy of `data`, ready to be a transfer source.
pub fn staged(allocator: &Allocator, data: &[u8]) -> Result<Buffer> {
    let staging = allocator.create_buffer(
        "staging buffer",
        data.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::Staging,
    )?;
    staging.write(0, data)?;
    Ok(staging)
}

/// Records `record` into a throwaway command buffer, submits it and waits for
/// the queue to drain.
pub fn one_time_submit(
    device: &ash::Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
    record: impl FnOnce(vk::CommandBuffer),
) -> Result<()> {
    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let cmd = unsafe { device.allocate_command_buffers(&ai) }
        .map_err(|e| Error::resource("upload command buffer", e))?[0];

    let result = unsafe { record_and_submit(device, queue, cmd, record) };
    unsafe { device.free_command_buffers(pool, std::slice::from_ref(&cmd)) };
    result
}

unsafe fn record_and_submit(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    record: impl FnOnce(vk::CommandBuffer),
) -> Result<()> {
    let bi = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    unsafe {
        device
            .begin_command_buffer(cmd, &bi)
            .map_err(|e| Error::submission("upload", e))?;
        record(cmd);
        device
            .end_command_buffer(cmd)
            .map_err(|e| Error::submission("upload", e))?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        device
            .queue_submit(queue, std::slice::from_ref(&si), vk::Fence::null())
            .map_err(|e| Error::submission("upload", e))?;
        device
            .queue_wait_idle(queue)
            .map_err(|e| Error::submission("upload", e))
    }
}

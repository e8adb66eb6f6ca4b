// SPDX-License-Identifier: CEPL-1.0
//! GPU side of the model pass: device-local mesh buffers, a mipmapped
//! texture with an anisotropic sampler, and one transform block per slot.
use std::ops::Range;
use std::time::Instant;

use ash::vk;
use pulsar_core::{Error, Result};
use pulsar_render::{ModelData, ModelUniform, TextureData, FRAMES_IN_FLIGHT};
use tracing::{debug, info};

use crate::device::DeviceContext;
use crate::memory::{Allocator, Buffer, Image, MemoryLocation};
use crate::pipelines::allocate_sets;
use crate::resources::{one_time_submit, staged, upload_via_staging};
use crate::sync::pipeline_barrier;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Mip generation blits each level from the one above with linear filtering.
pub fn supports_mip_blits(features: vk::FormatFeatureFlags) -> bool {
    features.contains(
        vk::FormatFeatureFlags::BLIT_SRC
            | vk::FormatFeatureFlags::BLIT_DST
            | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
    )
}

/// Extent of mip `level`, never below 1x1.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

pub fn sampler_info(max_anisotropy: f32, mip_levels: u32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable: vk::TRUE,
        max_anisotropy,
        compare_enable: vk::FALSE,
        min_lod: 0.0,
        max_lod: mip_levels as f32,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        ..Default::default()
    }
}

fn layout_access(layout: vk::ImageLayout) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        _ => (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
    }
}

fn mip_barrier(
    image: vk::Image,
    levels: Range<u32>,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> vk::ImageMemoryBarrier2<'static> {
    let (src_stage_mask, src_access_mask) = layout_access(old);
    let (dst_stage_mask, dst_access_mask) = layout_access(new);
    vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask,
        src_access_mask,
        dst_stage_mask,
        dst_access_mask,
        old_layout: old,
        new_layout: new,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: levels.start,
            level_count: levels.end - levels.start,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn corner(w: u32, h: u32) -> vk::Offset3D {
    vk::Offset3D {
        x: w as i32,
        y: h as i32,
        z: 1,
    }
}

/// Sampled RGBA8 texture. Every level ends in `SHADER_READ_ONLY_OPTIMAL`.
pub struct Texture {
    device: ash::Device,
    pub sampler: vk::Sampler,
    pub image: Image,
    pub mip_levels: u32,
}

impl Texture {
    pub fn new(ctx: &DeviceContext, allocator: &Allocator, pool: vk::CommandPool, data: &TextureData) -> Result<Self> {
        let props = unsafe {
            ctx.instance
                .get_physical_device_format_properties(ctx.phys, TEXTURE_FORMAT)
        };
        if !supports_mip_blits(props.optimal_tiling_features) {
            return Err(Error::resource(
                "texture",
                format!("{TEXTURE_FORMAT:?} cannot be blitted with linear filtering"),
            ));
        }

        let mip_levels = data.mip_levels();
        let info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: TEXTURE_FORMAT,
            extent: vk::Extent3D {
                width: data.width,
                height: data.height,
                depth: 1,
            },
            mip_levels,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = allocator.create_image("texture", &info, vk::ImageAspectFlags::COLOR)?;
        let staging = staged(allocator, &data.pixels)?;
        let device = &ctx.device;
        one_time_submit(device, ctx.queue, pool, |cmd| unsafe {
            record_mip_chain(device, cmd, image.handle, staging.handle, data.width, data.height, mip_levels)
        })?;

        let sampler_ci = sampler_info(ctx.properties.limits.max_sampler_anisotropy, mip_levels);
        let sampler =
            unsafe { device.create_sampler(&sampler_ci, None) }.map_err(|e| Error::resource("texture sampler", e))?;
        debug!(
            "texture: {}x{}, {mip_levels} mips, anisotropy {}",
            data.width, data.height, sampler_ci.max_anisotropy
        );
        Ok(Self {
            device: device.clone(),
            sampler,
            image,
            mip_levels,
        })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}

/// Copies level 0 from `staging`, then halves down the chain. Each level
/// moves to shader-read as soon as the next one has been blitted from it.
unsafe fn record_mip_chain(
    d: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    staging: vk::Buffer,
    width: u32,
    height: u32,
    levels: u32,
) {
    use vk::ImageLayout as L;
    unsafe {
        pipeline_barrier(d, cmd, &[mip_barrier(image, 0..levels, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL)]);
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: color_layers(0),
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D { width, height, depth: 1 },
        };
        d.cmd_copy_buffer_to_image(cmd, staging, image, L::TRANSFER_DST_OPTIMAL, std::slice::from_ref(&region));

        for level in 1..levels {
            let src = level - 1;
            pipeline_barrier(
                d,
                cmd,
                &[mip_barrier(image, src..level, L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL)],
            );
            let (sw, sh) = mip_extent(width, height, src);
            let (dw, dh) = mip_extent(width, height, level);
            let blit = vk::ImageBlit {
                src_subresource: color_layers(src),
                src_offsets: [vk::Offset3D::default(), corner(sw, sh)],
                dst_subresource: color_layers(level),
                dst_offsets: [vk::Offset3D::default(), corner(dw, dh)],
            };
            d.cmd_blit_image(
                cmd,
                image,
                L::TRANSFER_SRC_OPTIMAL,
                image,
                L::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&blit),
                vk::Filter::LINEAR,
            );
            pipeline_barrier(
                d,
                cmd,
                &[mip_barrier(image, src..level, L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)],
            );
        }
        // the last level was only ever a blit target
        pipeline_barrier(
            d,
            cmd,
            &[mip_barrier(image, levels - 1..levels, L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL)],
        );
    }
}

/// Mesh, texture and per-slot transforms for one textured model, plus the
/// descriptor sets binding them (0: transforms, 1: texture).
pub struct ModelScene {
    device: ash::Device,
    pub set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    uniforms: Vec<Buffer>,
    pub vertices: Buffer,
    pub indices: Buffer,
    pub index_count: u32,
    texture: Texture,
    spin_deg_per_sec: f32,
    started: Instant,
}

impl ModelScene {
    pub const UNIFORM_SIZE: vk::DeviceSize = std::mem::size_of::<ModelUniform>() as vk::DeviceSize;

    pub fn new(
        ctx: &DeviceContext,
        allocator: &Allocator,
        pool: vk::CommandPool,
        model: &ModelData,
        spin_deg_per_sec: f32,
    ) -> Result<Self> {
        let device = &ctx.device;
        let mesh = &model.mesh;
        let vertices = device_buffer(
            ctx,
            allocator,
            pool,
            "model vertex buffer",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let indices = device_buffer(
            ctx,
            allocator,
            pool,
            "model index buffer",
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&mesh.indices),
        )?;
        let uniforms = (0..FRAMES_IN_FLIGHT)
            .map(|_| {
                allocator.create_buffer(
                    "model uniform buffer",
                    Self::UNIFORM_SIZE,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::HostVisible,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let texture = Texture::new(ctx, allocator, pool, &model.texture)?;

        let mut this = Self {
            device: device.clone(),
            set_layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
            uniforms,
            vertices,
            indices,
            index_count: mesh.indices.len() as u32,
            texture,
            spin_deg_per_sec,
            started: Instant::now(),
        };
        // Early returns below release whatever was created through Drop.
        this.set_layout = unsafe { create_model_set_layout(device)? };
        let n = FRAMES_IN_FLIGHT as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: n,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: n,
            },
        ];
        let (desc_pool, sets) = unsafe { allocate_sets(device, this.set_layout, &pool_sizes)? };
        this.pool = desc_pool;
        this.sets = sets;
        unsafe { this.write_sets() };

        info!(
            "model scene: {} indices, {} mip levels, spin {spin_deg_per_sec}°/s",
            this.index_count, this.texture.mip_levels
        );
        Ok(this)
    }

    /// Transforms for `slot` at the current time.
    pub fn write_uniform(&self, slot: usize, aspect: f32) -> Result<()> {
        let buf = self
            .uniforms
            .get(slot)
            .ok_or_else(|| Error::resource("model uniform write", format!("no slot {slot}")))?;
        let xf = ModelUniform::orbit(self.started.elapsed().as_secs_f32(), self.spin_deg_per_sec, aspect);
        buf.write(0, bytemuck::bytes_of(&xf))
    }

    /// Binds mesh and slot set, then draws. The model pipeline must be bound.
    pub(crate) unsafe fn record_draw(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, slot: usize) {
        let d = &self.device;
        unsafe {
            d.cmd_bind_vertex_buffers(cmd, 0, std::slice::from_ref(&self.vertices.handle), &[0]);
            d.cmd_bind_index_buffer(cmd, self.indices.handle, 0, vk::IndexType::UINT32);
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                std::slice::from_ref(&self.sets[slot]),
                &[],
            );
            d.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
        }
    }

    unsafe fn write_sets(&self) {
        let buffers: Vec<_> = self
            .uniforms
            .iter()
            .map(|u| vk::DescriptorBufferInfo {
                buffer: u.handle,
                offset: 0,
                range: Self::UNIFORM_SIZE,
            })
            .collect();
        let image = vk::DescriptorImageInfo {
            sampler: self.texture.sampler,
            image_view: self.texture.image.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let mut writes = Vec::with_capacity(self.sets.len() * 2);
        for (set, info) in self.sets.iter().zip(&buffers) {
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: info,
                ..Default::default()
            });
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: 1,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &image,
                ..Default::default()
            });
        }
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }
}

impl Drop for ModelScene {
    fn drop(&mut self) {
        unsafe {
            // sets go with the pool
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

fn device_buffer(
    ctx: &DeviceContext,
    allocator: &Allocator,
    pool: vk::CommandPool,
    what: &'static str,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> Result<Buffer> {
    let buf = allocator.create_buffer(
        what,
        bytes.len() as vk::DeviceSize,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::DeviceLocal,
    )?;
    upload_via_staging(&ctx.device, ctx.queue, pool, allocator, &[&buf], bytes)?;
    Ok(buf)
}

unsafe fn create_model_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ];
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    unsafe { device.create_descriptor_set_layout(&ci, None) }
        .map_err(|e| Error::resource("model descriptor set layout", e))
}

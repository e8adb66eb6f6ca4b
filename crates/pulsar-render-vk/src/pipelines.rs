// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;
use std::io::Cursor;
use std::fs;
use std::path::PathBuf;

use ash::util::read_spv;
use ash::vk;
use pulsar_core::{Error, Result};
use pulsar_render::assets::{ShaderBlobs, ShaderStage};
use pulsar_render::{FrameSlot, MeshVertex, Particle, FRAMES_IN_FLIGHT};
use tracing::{debug, warn};

use crate::resources::{SimulationBuffers, UniformBuffers};

const ENTRY: &CStr = c"main";

/// SPIR-V compiled from the bundled GLSL at build time.
pub fn builtin_shaders() -> ShaderBlobs {
    ShaderBlobs {
        compute: include_bytes!(concat!(env!("OUT_DIR"), "/particles.comp.spv")).to_vec(),
        vertex: include_bytes!(concat!(env!("OUT_DIR"), "/particles.vert.spv")).to_vec(),
        fragment: include_bytes!(concat!(env!("OUT_DIR"), "/particles.frag.spv")).to_vec(),
        model_vertex: include_bytes!(concat!(env!("OUT_DIR"), "/model.vert.spv")).to_vec(),
        model_fragment: include_bytes!(concat!(env!("OUT_DIR"), "/model.frag.spv")).to_vec(),
    }
}

/// Point size the particle shader is specialized with when wide points are
/// available.
pub const PARTICLE_POINT_SIZE: f32 = 14.0;

/// Without `largePoints` only 1.0 is guaranteed to rasterize.
pub fn particle_point_size(large_points: bool, range: [f32; 2]) -> f32 {
    if large_points {
        PARTICLE_POINT_SIZE.clamp(range[0], range[1])
    } else {
        1.0
    }
}

/// Buffer indices bound to the compute set of `slot`: (uniform, read, write).
pub fn compute_bindings(slot: FrameSlot) -> (usize, usize, usize) {
    (slot.index, slot.read_buffer(), slot.write_buffer())
}

pub fn create_shader_module(device: &ash::Device, stage: ShaderStage, bytes: &[u8]) -> Result<vk::ShaderModule> {
    let code = read_spv(&mut Cursor::new(bytes)).map_err(|e| Error::InvalidAsset {
        name: stage.file_name().into(),
        detail: e.to_string(),
    })?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    unsafe { device.create_shader_module(&ci, None) }.map_err(|e| Error::resource("shader module", e))
}

/// Cache file name keyed on everything that invalidates a cache blob:
/// vendor, device, driver and the driver's cache UUID.
pub fn pipeline_cache_path(props: &vk::PhysicalDeviceProperties) -> PathBuf {
    let uuid: String = props.pipeline_cache_uuid.iter().map(|b| format!("{b:02x}")).collect();
    PathBuf::from(format!(
        "pulsar-{:04x}-{:04x}-{:08x}-{uuid}.pipeline-cache",
        props.vendor_id, props.device_id, props.driver_version
    ))
}

/// Optional on-disk pipeline cache, written back when dropped.
pub struct PipelineCache {
    device: ash::Device,
    pub handle: vk::PipelineCache,
    path: Option<PathBuf>,
}

impl PipelineCache {
    /// With `path == None` the cache lives in memory only.
    pub fn new(device: &ash::Device, path: Option<PathBuf>) -> Result<Self> {
        let data = path.as_ref().and_then(|p| fs::read(p).ok()).unwrap_or_default();
        if !data.is_empty() {
            debug!("pipeline cache: {} bytes loaded", data.len());
        }
        let ci = vk::PipelineCacheCreateInfo {
            s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
            initial_data_size: data.len(),
            p_initial_data: data.as_ptr().cast(),
            ..Default::default()
        };
        let handle = match unsafe { device.create_pipeline_cache(&ci, None) } {
            Ok(h) => h,
            // A stale blob from another driver is rejected; start empty.
            Err(_) if !data.is_empty() => {
                let empty = vk::PipelineCacheCreateInfo::default();
                unsafe { device.create_pipeline_cache(&empty, None) }
                    .map_err(|e| Error::resource("pipeline cache", e))?
            }
            Err(e) => return Err(Error::resource("pipeline cache", e)),
        };
        Ok(Self {
            device: device.clone(),
            handle,
            path,
        })
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            match unsafe { self.device.get_pipeline_cache_data(self.handle) } {
                Ok(bytes) => {
                    if let Err(e) = fs::write(path, &bytes) {
                        warn!("pipeline cache not saved to {}: {e}", path.display());
                    }
                }
                Err(e) => debug!("pipeline cache data unavailable: {e:?}"),
            }
        }
        unsafe { self.device.destroy_pipeline_cache(self.handle, None) };
    }
}

/// Particle integration pipeline plus its descriptor sets, one per slot.
/// The sets are written once; buffers never change identity.
pub struct ComputePipeline {
    device: ash::Device,
    pub set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl ComputePipeline {
    pub fn new(
        device: &ash::Device,
        cache: &PipelineCache,
        shader: &[u8],
        sim: &SimulationBuffers,
        uniforms: &UniformBuffers,
    ) -> Result<Self> {
        let mut this = Self {
            device: device.clone(),
            set_layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
        };
        // Early returns below release whatever was created through Drop.
        this.set_layout = unsafe { create_compute_set_layout(device)? };
        let n = FRAMES_IN_FLIGHT as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: n,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: n * 2,
            },
        ];
        let (pool, sets) = unsafe { allocate_sets(device, this.set_layout, &pool_sizes)? };
        this.pool = pool;
        this.sets = sets;
        unsafe { write_sets(device, &this.sets, sim, uniforms) };

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &this.set_layout,
            ..Default::default()
        };
        this.layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| Error::pipeline("compute layout", e))?;

        let module = create_shader_module(device, ShaderStage::Compute, shader)?;
        let info = vk::ComputePipelineCreateInfo {
            s_type: vk::StructureType::COMPUTE_PIPELINE_CREATE_INFO,
            stage: vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::COMPUTE,
                module,
                p_name: ENTRY.as_ptr(),
                ..Default::default()
            },
            layout: this.layout,
            ..Default::default()
        };
        let created = unsafe { device.create_compute_pipelines(cache.handle, std::slice::from_ref(&info), None) };
        unsafe { device.destroy_shader_module(module, None) };
        this.pipeline = created.map_err(|(_, e)| Error::pipeline("compute", e))?[0];
        Ok(this)
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            d.destroy_pipeline(self.pipeline, None);
            d.destroy_pipeline_layout(self.layout, None);
            // sets go with the pool
            d.destroy_descriptor_pool(self.pool, None);
            d.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

unsafe fn create_compute_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let binding = |binding, ty| vk::DescriptorSetLayoutBinding {
        binding,
        descriptor_type: ty,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::COMPUTE,
        ..Default::default()
    };
    let bindings = [
        binding(0, vk::DescriptorType::UNIFORM_BUFFER),
        binding(1, vk::DescriptorType::STORAGE_BUFFER),
        binding(2, vk::DescriptorType::STORAGE_BUFFER),
    ];
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    unsafe { device.create_descriptor_set_layout(&ci, None) }
        .map_err(|e| Error::resource("compute descriptor set layout", e))
}

/// One set of `layout` per frame slot, from a pool sized by `pool_sizes`.
pub(crate) unsafe fn allocate_sets(
    device: &ash::Device,
    layout: vk::DescriptorSetLayout,
    pool_sizes: &[vk::DescriptorPoolSize],
) -> Result<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
    let n = FRAMES_IN_FLIGHT as u32;
    let pool_ci = vk::DescriptorPoolCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
        max_sets: n,
        pool_size_count: pool_sizes.len() as u32,
        p_pool_sizes: pool_sizes.as_ptr(),
        ..Default::default()
    };
    let pool = unsafe { device.create_descriptor_pool(&pool_ci, None) }
        .map_err(|e| Error::resource("descriptor pool", e))?;

    let layouts = vec![layout; FRAMES_IN_FLIGHT];
    let alloc = vk::DescriptorSetAllocateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
        descriptor_pool: pool,
        descriptor_set_count: n,
        p_set_layouts: layouts.as_ptr(),
        ..Default::default()
    };
    match unsafe { device.allocate_descriptor_sets(&alloc) } {
        Ok(sets) => Ok((pool, sets)),
        Err(e) => {
            unsafe { device.destroy_descriptor_pool(pool, None) };
            Err(Error::resource("descriptor sets", e))
        }
    }
}

unsafe fn write_sets(device: &ash::Device, sets: &[vk::DescriptorSet], sim: &SimulationBuffers, uniforms: &UniformBuffers) {
    // Infos must stay put while the writes point into them.
    let mut infos = Vec::with_capacity(sets.len() * 3);
    for i in 0..sets.len() {
        let (u, read, write) = compute_bindings(FrameSlot::new(i));
        infos.push(vk::DescriptorBufferInfo {
            buffer: uniforms.buffers[u].handle,
            offset: 0,
            range: UniformBuffers::SIZE,
        });
        for b in [read, write] {
            infos.push(vk::DescriptorBufferInfo {
                buffer: sim.buffers[b].handle,
                offset: 0,
                range: vk::WHOLE_SIZE,
            });
        }
    }

    let mut writes = Vec::with_capacity(infos.len());
    for (i, &set) in sets.iter().enumerate() {
        for binding in 0..3u32 {
            let ty = if binding == 0 {
                vk::DescriptorType::UNIFORM_BUFFER
            } else {
                vk::DescriptorType::STORAGE_BUFFER
            };
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: set,
                dst_binding: binding,
                descriptor_count: 1,
                descriptor_type: ty,
                p_buffer_info: &infos[i * 3 + binding as usize],
                ..Default::default()
            });
        }
    }
    unsafe { device.update_descriptor_sets(&writes, &[]) };
}

/// What a graphics pipeline draws. Both kinds share one dynamic-rendering
/// pass; the model goes first and fills depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawKind {
    /// The simulation buffer as a point list.
    Particles,
    /// Indexed, textured triangles.
    Model,
}

/// Fixed-function state that differs between the draw kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedFunction {
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub blend: bool,
}

impl DrawKind {
    pub fn fixed_function(self) -> FixedFunction {
        match self {
            // Test against the model without writing so blending stays order-free.
            DrawKind::Particles => FixedFunction {
                topology: vk::PrimitiveTopology::POINT_LIST,
                cull_mode: vk::CullModeFlags::NONE,
                depth_write: false,
                depth_compare: vk::CompareOp::LESS_OR_EQUAL,
                blend: true,
            },
            DrawKind::Model => FixedFunction {
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                cull_mode: vk::CullModeFlags::BACK,
                depth_write: true,
                depth_compare: vk::CompareOp::LESS,
                blend: false,
            },
        }
    }

    pub fn vertex_layout(self) -> (vk::VertexInputBindingDescription, Vec<vk::VertexInputAttributeDescription>) {
        let attr = |location, format, offset| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset,
        };
        let (stride, attrs) = match self {
            DrawKind::Particles => (
                Particle::STRIDE,
                vec![
                    attr(0, vk::Format::R32G32_SFLOAT, Particle::POSITION_OFFSET),
                    attr(1, vk::Format::R32G32B32A32_SFLOAT, Particle::COLOR_OFFSET),
                ],
            ),
            DrawKind::Model => (
                MeshVertex::STRIDE,
                vec![
                    attr(0, vk::Format::R32G32B32_SFLOAT, MeshVertex::POSITION_OFFSET),
                    attr(1, vk::Format::R32G32B32_SFLOAT, MeshVertex::COLOR_OFFSET),
                    attr(2, vk::Format::R32G32_SFLOAT, MeshVertex::TEX_COORD_OFFSET),
                ],
            ),
        };
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        (binding, attrs)
    }

    fn stages(self) -> (ShaderStage, ShaderStage) {
        match self {
            DrawKind::Particles => (ShaderStage::Vertex, ShaderStage::Fragment),
            DrawKind::Model => (ShaderStage::ModelVertex, ShaderStage::ModelFragment),
        }
    }
}

pub struct GraphicsDesc<'a> {
    pub kind: DrawKind,
    pub vertex: &'a [u8],
    pub fragment: &'a [u8],
    pub set_layouts: &'a [vk::DescriptorSetLayout],
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
    /// Specialization constant 0 of the particle vertex shader; ignored for
    /// the model.
    pub point_size: f32,
}

/// One draw kind's pipeline for dynamic rendering.
pub struct GraphicsPipeline {
    device: ash::Device,
    pub kind: DrawKind,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub color_format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

impl GraphicsPipeline {
    pub fn new(device: &ash::Device, cache: &PipelineCache, desc: &GraphicsDesc<'_>) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: desc.set_layouts.len() as u32,
            p_set_layouts: desc.set_layouts.as_ptr(),
            ..Default::default()
        };
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| Error::pipeline("graphics layout", e))?;
        let mut this = Self {
            device: device.clone(),
            kind: desc.kind,
            layout,
            pipeline: vk::Pipeline::null(),
            color_format: desc.color_format,
            samples: desc.samples,
        };

        let (vs_stage, fs_stage) = desc.kind.stages();
        let vs = create_shader_module(device, vs_stage, desc.vertex)?;
        let fs = match create_shader_module(device, fs_stage, desc.fragment) {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.destroy_shader_module(vs, None) };
                return Err(e);
            }
        };
        let created = unsafe { build_graphics(device, cache, layout, vs, fs, desc) };
        unsafe {
            device.destroy_shader_module(vs, None);
            device.destroy_shader_module(fs, None);
        }
        this.pipeline = created?;
        Ok(this)
    }

    /// Whether a swapchain with these properties can reuse this pipeline.
    pub fn matches(&self, color_format: vk::Format, samples: vk::SampleCountFlags) -> bool {
        self.color_format == color_format && self.samples == samples
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

unsafe fn build_graphics(
    device: &ash::Device,
    cache: &PipelineCache,
    layout: vk::PipelineLayout,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
    desc: &GraphicsDesc<'_>,
) -> Result<vk::Pipeline> {
    let fixed = desc.kind.fixed_function();
    let point_size = desc.point_size.to_ne_bytes();
    let spec_entry = vk::SpecializationMapEntry {
        constant_id: 0,
        offset: 0,
        size: point_size.len(),
    };
    let specialization = vk::SpecializationInfo {
        map_entry_count: 1,
        p_map_entries: &spec_entry,
        data_size: point_size.len(),
        p_data: point_size.as_ptr().cast(),
        ..Default::default()
    };
    let vs_spec: *const vk::SpecializationInfo = match desc.kind {
        DrawKind::Particles => &specialization,
        DrawKind::Model => std::ptr::null(),
    };
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: ENTRY.as_ptr(),
            p_specialization_info: vs_spec,
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        },
    ];

    let (vb, va) = desc.kind.vertex_layout();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &vb,
        vertex_attribute_description_count: va.len() as u32,
        p_vertex_attribute_descriptions: va.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: fixed.topology,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: fixed.cull_mode,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: desc.samples,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: fixed.depth_write.into(),
        depth_compare_op: fixed.depth_compare,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        blend_enable: fixed.blend.into(),
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };
    let rendering = vk::PipelineRenderingCreateInfo {
        s_type: vk::StructureType::PIPELINE_RENDERING_CREATE_INFO,
        color_attachment_count: 1,
        p_color_attachment_formats: &desc.color_format,
        depth_attachment_format: desc.depth_format,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        p_next: (&rendering as *const vk::PipelineRenderingCreateInfo).cast(),
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        ..Default::default()
    };

    let what = match desc.kind {
        DrawKind::Particles => "particle graphics",
        DrawKind::Model => "model graphics",
    };
    let pipelines =
        unsafe { device.create_graphics_pipelines(cache.handle, std::slice::from_ref(&pipeline_info), None) }
            .map_err(|(_, e)| Error::pipeline(what, e))?;
    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_particle() {
        let (binding, attrs) = DrawKind::Particles.vertex_layout();
        assert_eq!(binding.stride, 32);
        assert_eq!(attrs[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attrs[1].offset, 16);
    }

    #[test]
    fn vertex_layout_matches_mesh() {
        let (binding, attrs) = DrawKind::Model.vertex_layout();
        assert_eq!(binding.stride, 32);
        let got: Vec<_> = attrs.iter().map(|a| (a.location, a.format, a.offset)).collect();
        assert_eq!(
            got,
            [
                (0, vk::Format::R32G32B32_SFLOAT, 0),
                (1, vk::Format::R32G32B32_SFLOAT, 12),
                (2, vk::Format::R32G32_SFLOAT, 24),
            ]
        );
    }

    #[test]
    fn model_writes_depth_and_particles_blend() {
        let model = DrawKind::Model.fixed_function();
        assert_eq!(model.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(model.cull_mode, vk::CullModeFlags::BACK);
        assert!(model.depth_write && !model.blend);
        assert_eq!(model.depth_compare, vk::CompareOp::LESS);

        let points = DrawKind::Particles.fixed_function();
        assert_eq!(points.topology, vk::PrimitiveTopology::POINT_LIST);
        assert!(!points.depth_write && points.blend);
    }

    #[test]
    fn point_size_needs_large_points() {
        assert_eq!(particle_point_size(false, [1.0, 64.0]), 1.0);
        assert_eq!(particle_point_size(true, [1.0, 64.0]), 14.0);
        assert_eq!(particle_point_size(true, [1.0, 8.0]), 8.0);
    }

    #[test]
    fn compute_sets_read_previous_write_current() {
        assert_eq!(compute_bindings(FrameSlot::new(0)), (0, 1, 0));
        assert_eq!(compute_bindings(FrameSlot::new(1)), (1, 0, 1));
    }

    #[test]
    fn cache_path_encodes_device_identity() {
        let props = vk::PhysicalDeviceProperties {
            vendor_id: 0x10de,
            device_id: 0x2684,
            driver_version: 0x1234,
            pipeline_cache_uuid: [0xab; vk::UUID_SIZE],
            ..Default::default()
        };
        let name = pipeline_cache_path(&props).display().to_string();
        assert_eq!(
            name,
            format!("pulsar-10de-2684-00001234-{}.pipeline-cache", "ab".repeat(vk::UUID_SIZE))
        );
    }

    #[test]
    fn builtin_shaders_are_spirv() {
        let blobs = builtin_shaders();
        for stage in ShaderStage::ALL {
            let code = read_spv(&mut Cursor::new(blobs.get(stage))).unwrap();
            assert_eq!(code[0], 0x0723_0203, "{stage:?} magic");
        }
    }

    #[test]
    fn malformed_spirv_is_rejected() {
        // read_spv rejects lengths that are not a multiple of four
        let err = read_spv(&mut Cursor::new(&[1u8, 2, 3][..]));
        assert!(err.is_err());
    }
}

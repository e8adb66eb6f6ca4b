// SPDX-License-Identifier: CEPL-1.0
//! The ash implementation of [`FrameBackend`].
//!
//! Every frame is two submissions on one queue. Compute integrates the
//! particles of the previous slot into this slot's buffer; graphics draws that
//! buffer as points. A single timeline semaphore orders them:
//!
//! ```text
//! compute  : wait c     @ COMPUTE_SHADER        signal c+1
//! graphics : wait c+1   @ VERTEX_ATTRIBUTE_INPUT signal c+2, fence in_flight[slot]
//!            wait image_available[slot] @ COLOR_ATTACHMENT_OUTPUT
//! ```
//!
//! With a model loaded, the graphics pass draws it first so the particles
//! depth-test against it.
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use pulsar_core::{Error, Result};
use pulsar_render::assets::ShaderBlobs;
use pulsar_render::config::WORKGROUP_SIZE;
use pulsar_render::particles::seed_particles;
use pulsar_render::{
    AcquireOutcome, FrameBackend, FrameSlot, FrameTimeline, ModelData, PresentStatus, RenderSize, RendererConfig,
    SimParams, SwapchainHost, SwapchainInfo,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::device::{DeviceConfig, DeviceContext, DiagnosticCallback};
use crate::memory::{Allocator, AllocatorStats, Image};
use crate::model::ModelScene;
use crate::pipelines::{
    particle_point_size, pipeline_cache_path, ComputePipeline, DrawKind, GraphicsDesc, GraphicsPipeline, PipelineCache,
};
use crate::resources::{SimulationBuffers, UniformBuffers};
use crate::swapchain::{color_range, surface_error, surface_extent, SwapchainResources, SwapchainSettings};
use crate::sync::{pipeline_barrier, FrameSync};

/// Everything needed to bring up a renderer besides the window.
pub struct RendererDesc {
    pub app_name: String,
    pub config: RendererConfig,
    /// Already rounded to a whole number of workgroups.
    pub particle_count: u32,
    pub seed: u64,
    pub shaders: ShaderBlobs,
    /// Textured mesh drawn under the particles.
    pub model: Option<ModelData>,
    pub spin_deg_per_sec: f32,
    pub diagnostic: Option<DiagnosticCallback>,
}

struct ModelPass {
    pipeline: GraphicsPipeline,
    scene: ModelScene,
}

/// Attachment formats both graphics pipelines are built against.
#[derive(Clone, Copy)]
struct PassFormats {
    color: vk::Format,
    depth: vk::Format,
    samples: vk::SampleCountFlags,
}

fn particle_pipeline(
    device: &ash::Device,
    cache: &PipelineCache,
    shaders: &ShaderBlobs,
    formats: PassFormats,
    point_size: f32,
) -> Result<GraphicsPipeline> {
    let desc = GraphicsDesc {
        kind: DrawKind::Particles,
        vertex: &shaders.vertex,
        fragment: &shaders.fragment,
        set_layouts: &[],
        color_format: formats.color,
        depth_format: formats.depth,
        samples: formats.samples,
        point_size,
    };
    GraphicsPipeline::new(device, cache, &desc)
}

fn model_pipeline(
    device: &ash::Device,
    cache: &PipelineCache,
    shaders: &ShaderBlobs,
    formats: PassFormats,
    set_layout: vk::DescriptorSetLayout,
) -> Result<GraphicsPipeline> {
    let desc = GraphicsDesc {
        kind: DrawKind::Model,
        vertex: &shaders.model_vertex,
        fragment: &shaders.model_fragment,
        set_layouts: std::slice::from_ref(&set_layout),
        color_format: formats.color,
        depth_format: formats.depth,
        samples: formats.samples,
        point_size: 1.0,
    };
    GraphicsPipeline::new(device, cache, &desc)
}

// Field order is teardown order.
pub struct VkRenderer {
    swapchain: Option<SwapchainResources>,
    graphics: GraphicsPipeline,
    model: Option<ModelPass>,
    compute: ComputePipeline,
    pipeline_cache: PipelineCache,
    uniforms: UniformBuffers,
    simulation: SimulationBuffers,
    sync: FrameSync,
    allocator: Allocator,
    settings: SwapchainSettings,
    shaders: ShaderBlobs,
    clear: vk::ClearValue,
    workgroups: u32,
    point_size: f32,
    window_extent: RenderSize,
    poll_interval: Duration,
    ctx: DeviceContext,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        desc: RendererDesc,
    ) -> Result<(Self, SwapchainInfo)> {
        if size.is_zero() {
            return Err(Error::Initialization("window has a zero extent at startup".into()));
        }
        let RendererDesc {
            app_name,
            config,
            particle_count,
            seed,
            shaders,
            model,
            spin_deg_per_sec,
            diagnostic,
        } = desc;

        let device_config = DeviceConfig {
            app_name,
            validation: config.validation,
            diagnostic,
            ..Default::default()
        };
        let ctx = DeviceContext::new(window, display, &device_config)?;
        let device = &ctx.device;

        let allocator = Allocator::new(&ctx.instance, ctx.phys, device);
        let sync = FrameSync::new(device, ctx.queue_family)?;

        let aspect = size.height as f32 / size.width as f32;
        let particles = seed_particles(particle_count as usize, seed, aspect);
        let simulation = SimulationBuffers::new(device, ctx.queue, sync.pool, &allocator, &particles)?;
        let uniforms = UniformBuffers::new(&allocator)?;
        info!("sim: {particle_count} particles, seed {seed}");

        let cache_path = config.pipeline_cache.then(|| pipeline_cache_path(&ctx.properties));
        let pipeline_cache = PipelineCache::new(device, cache_path)?;
        let compute = ComputePipeline::new(device, &pipeline_cache, &shaders.compute, &simulation, &uniforms)?;

        let settings = SwapchainSettings {
            vsync: config.vsync,
            vsync_mode: config.vsync_mode,
            msaa_samples: config.msaa_samples,
            depth_format: ctx.depth_format(),
        };
        let swapchain = SwapchainResources::create(&ctx, &allocator, &settings, size)?;
        let formats = PassFormats {
            color: swapchain.format,
            depth: settings.depth_format,
            samples: swapchain.samples,
        };
        let limits = &ctx.properties.limits;
        let point_size = particle_point_size(ctx.features.large_points, limits.point_size_range);
        if point_size < 2.0 {
            info!("particles drawn at {point_size}px; device lacks wide points");
        }
        let graphics = particle_pipeline(device, &pipeline_cache, &shaders, formats, point_size)?;
        let model = match model {
            Some(data) => {
                let scene = ModelScene::new(&ctx, &allocator, sync.pool, &data, spin_deg_per_sec)?;
                let pipeline = model_pipeline(device, &pipeline_cache, &shaders, formats, scene.set_layout)?;
                Some(ModelPass { pipeline, scene })
            }
            None => None,
        };
        let info = swapchain.info();

        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: config.clear_color,
            },
        };

        Ok((
            Self {
                swapchain: Some(swapchain),
                graphics,
                model,
                compute,
                pipeline_cache,
                uniforms,
                simulation,
                sync,
                allocator,
                settings,
                shaders,
                clear,
                workgroups: particle_count.div_ceil(WORKGROUP_SIZE),
                point_size,
                window_extent: size,
                poll_interval: Duration::from_millis(config.extent_poll_interval_ms),
                ctx,
            },
            info,
        ))
    }

    pub fn device_name(&self) -> String {
        self.ctx.device_name()
    }

    pub fn particle_count(&self) -> u32 {
        self.simulation.particle_count
    }

    /// Extent used when the surface leaves sizing to the window.
    pub fn set_window_extent(&mut self, size: RenderSize) {
        self.window_extent = size;
    }

    pub fn allocator_stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    fn swapchain(&self) -> Result<&SwapchainResources> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| Error::SurfaceStale("swapchain not created".into()))
    }

    unsafe fn record_compute(&self, cmd: vk::CommandBuffer, slot: FrameSlot) -> Result<()> {
        let d = &self.ctx.device;
        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| Error::submission("compute record", e))?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)
                .map_err(|e| Error::submission("compute record", e))?;
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.compute.pipeline);
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.compute.layout,
                0,
                std::slice::from_ref(&self.compute.sets[slot.index]),
                &[],
            );
            d.cmd_dispatch(cmd, self.workgroups, 1, 1);
            d.end_command_buffer(cmd)
                .map_err(|e| Error::submission("compute record", e))
        }
    }

    unsafe fn record_graphics(&self, cmd: vk::CommandBuffer, slot: FrameSlot, image_index: usize) -> Result<()> {
        let d = &self.ctx.device;
        let sc = self.swapchain()?;
        let image = *sc
            .images
            .get(image_index)
            .ok_or_else(|| Error::submission("graphics record", format!("no swapchain image {image_index}")))?;
        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| Error::submission("graphics record", e))?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)
                .map_err(|e| Error::submission("graphics record", e))?;

            let mut barriers = vec![
                color_barrier(image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                depth_barrier(&sc.depth),
            ];
            if let Some(msaa) = &sc.msaa {
                barriers.push(color_barrier(
                    msaa.handle,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ));
            }
            pipeline_barrier(d, cmd, &barriers);

            self.begin_rendering(cmd, sc, sc.views[image_index]);
            self.set_viewport(cmd, sc.extent);
            if let Some(model) = &self.model {
                d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, model.pipeline.pipeline);
                model.scene.record_draw(cmd, model.pipeline.layout, slot.index);
            }
            self.draw_particles(cmd, slot);
            d.cmd_end_rendering(cmd);

            let to_present = color_barrier(
                image,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
            pipeline_barrier(d, cmd, std::slice::from_ref(&to_present));

            d.end_command_buffer(cmd)
                .map_err(|e| Error::submission("graphics record", e))
        }
    }

    unsafe fn begin_rendering(&self, cmd: vk::CommandBuffer, sc: &SwapchainResources, target: vk::ImageView) {
        // With MSAA the multisampled target is drawn and resolved into the swapchain image.
        let color_att = match &sc.msaa {
            Some(msaa) => vk::RenderingAttachmentInfo {
                s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
                image_view: msaa.view,
                image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                resolve_mode: vk::ResolveModeFlags::AVERAGE,
                resolve_image_view: target,
                resolve_image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                clear_value: self.clear,
                ..Default::default()
            },
            None => vk::RenderingAttachmentInfo {
                s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
                image_view: target,
                image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                clear_value: self.clear,
                ..Default::default()
            },
        };

        let depth_att = vk::RenderingAttachmentInfo {
            s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
            image_view: sc.depth.view,
            image_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
            ..Default::default()
        };

        let rendering_info = vk::RenderingInfo {
            s_type: vk::StructureType::RENDERING_INFO,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: sc.extent,
            },
            layer_count: 1,
            color_attachment_count: 1,
            p_color_attachments: &color_att,
            p_depth_attachment: &depth_att,
            ..Default::default()
        };
        unsafe { self.ctx.device.cmd_begin_rendering(cmd, &rendering_info) };
    }

    unsafe fn set_viewport(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        let d = &self.ctx.device;
        let vp = vk::Viewport {
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
        // both pipelines keep viewport and scissor dynamic
        unsafe {
            d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&vp));
            d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
        }
    }

    unsafe fn draw_particles(&self, cmd: vk::CommandBuffer, slot: FrameSlot) {
        let d = &self.ctx.device;
        // this slot's compute output
        let vbuf = self.simulation.buffers[slot.write_buffer()].handle;
        unsafe {
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.graphics.pipeline);
            d.cmd_bind_vertex_buffers(cmd, 0, std::slice::from_ref(&vbuf), &[0]);
            d.cmd_draw(cmd, self.simulation.particle_count, 1, 0, 0);
        }
    }

    fn submit(&self, stage: &'static str, info: &vk::SubmitInfo2, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .queue_submit2(self.ctx.queue, std::slice::from_ref(info), fence)
        }
        .map_err(|e| match e {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => Error::OutOfMemory {
                what: stage,
                detail: format!("{e:?}"),
            },
            other => Error::submission(stage, other),
        })
    }
}

impl SwapchainHost for VkRenderer {
    fn surface_extent(&mut self) -> Result<RenderSize> {
        let caps = unsafe {
            self.ctx
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.phys, self.ctx.surface)
        }
        .map_err(surface_error("surface capabilities"))?;
        Ok(surface_extent(&caps, self.window_extent))
    }

    fn wait_for_surface_events(&mut self) {
        std::thread::sleep(self.poll_interval);
    }

    fn wait_device_idle(&mut self) -> Result<()> {
        self.ctx.wait_idle()
    }

    fn destroy_swapchain_resources(&mut self) {
        self.swapchain = None;
    }

    fn create_swapchain_resources(&mut self, extent: RenderSize) -> Result<SwapchainInfo> {
        let sc = SwapchainResources::create(&self.ctx, &self.allocator, &self.settings, extent)?;
        if !self.graphics.matches(sc.format, sc.samples) {
            debug!("swapchain format or sample count changed; rebuilding graphics pipelines");
            let formats = PassFormats {
                color: sc.format,
                depth: self.settings.depth_format,
                samples: sc.samples,
            };
            let device = &self.ctx.device;
            self.graphics = particle_pipeline(device, &self.pipeline_cache, &self.shaders, formats, self.point_size)?;
            if let Some(model) = &mut self.model {
                model.pipeline =
                    model_pipeline(device, &self.pipeline_cache, &self.shaders, formats, model.scene.set_layout)?;
            }
        }
        let info = sc.info();
        self.swapchain = Some(sc);
        Ok(info)
    }
}

impl FrameBackend for VkRenderer {
    fn acquire_image(&mut self, slot: FrameSlot) -> Result<AcquireOutcome> {
        // image_available[slot] was last waited on by this slot's previous graphics submission
        self.sync.wait_fence(slot.index)?;
        let sc = self.swapchain()?;
        let acquired = unsafe {
            self.ctx.swapchain_loader.acquire_next_image(
                sc.swapchain,
                u64::MAX,
                self.sync.image_available[slot.index],
                vk::Fence::null(),
            )
        };
        acquire_outcome(acquired)
    }

    fn wait_slot_fence(&mut self, slot: FrameSlot) -> Result<()> {
        self.sync.wait_fence(slot.index)
    }

    fn reset_slot_fence(&mut self, slot: FrameSlot) -> Result<()> {
        self.sync.reset_fence(slot.index)
    }

    fn write_uniforms(&mut self, slot: FrameSlot, params: &SimParams) -> Result<()> {
        self.uniforms.write(slot.index, params)?;
        if let Some(model) = &self.model {
            let extent = self
                .swapchain
                .as_ref()
                .map_or(self.window_extent, |sc| RenderSize::new(sc.extent.width, sc.extent.height));
            let aspect = extent.width as f32 / extent.height.max(1) as f32;
            model.scene.write_uniform(slot.index, aspect)?;
        }
        Ok(())
    }

    fn submit_compute(&mut self, slot: FrameSlot, timeline: &FrameTimeline) -> Result<()> {
        let cmd = self.sync.compute_cmds[slot.index];
        unsafe { self.record_compute(cmd, slot)? };

        let wait = timeline_info(self.sync.timeline, timeline.compute_wait, vk::PipelineStageFlags2::COMPUTE_SHADER);
        let signal =
            timeline_info(self.sync.timeline, timeline.compute_signal, vk::PipelineStageFlags2::COMPUTE_SHADER);
        let cmd_info = command_info(cmd);
        let submit = vk::SubmitInfo2 {
            s_type: vk::StructureType::SUBMIT_INFO_2,
            wait_semaphore_info_count: 1,
            p_wait_semaphore_infos: &wait,
            command_buffer_info_count: 1,
            p_command_buffer_infos: &cmd_info,
            signal_semaphore_info_count: 1,
            p_signal_semaphore_infos: &signal,
            ..Default::default()
        };
        self.submit("compute submit", &submit, vk::Fence::null())
    }

    fn submit_graphics(
        &mut self,
        slot: FrameSlot,
        image_index: u32,
        timeline: &FrameTimeline,
        signal_render_finished: bool,
    ) -> Result<()> {
        let cmd = self.sync.graphics_cmds[slot.index];
        unsafe { self.record_graphics(cmd, slot, image_index as usize)? };

        let waits = [
            timeline_info(
                self.sync.timeline,
                timeline.graphics_wait,
                vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
            ),
            binary_info(
                self.sync.image_available[slot.index],
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            ),
        ];
        let mut signals = vec![timeline_info(
            self.sync.timeline,
            timeline.graphics_signal,
            vk::PipelineStageFlags2::ALL_GRAPHICS,
        )];
        if signal_render_finished {
            let sem = self.swapchain()?.render_finished[image_index as usize];
            signals.push(binary_info(sem, vk::PipelineStageFlags2::ALL_GRAPHICS));
        }

        let cmd_info = command_info(cmd);
        let submit = vk::SubmitInfo2 {
            s_type: vk::StructureType::SUBMIT_INFO_2,
            wait_semaphore_info_count: waits.len() as u32,
            p_wait_semaphore_infos: waits.as_ptr(),
            command_buffer_info_count: 1,
            p_command_buffer_infos: &cmd_info,
            signal_semaphore_info_count: signals.len() as u32,
            p_signal_semaphore_infos: signals.as_ptr(),
            ..Default::default()
        };
        self.submit("graphics submit", &submit, self.sync.in_flight[slot.index])
    }

    fn wait_timeline(&mut self, value: u64) -> Result<()> {
        self.sync.wait_timeline(value)
    }

    fn present(&mut self, image_index: u32, wait_render_finished: bool) -> Result<PresentStatus> {
        let sc = self.swapchain()?;
        let rf = sc.render_finished[image_index as usize];
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: u32::from(wait_render_finished),
            p_wait_semaphores: &rf,
            swapchain_count: 1,
            p_swapchains: &sc.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        present_status(unsafe { self.ctx.swapchain_loader.queue_present(self.ctx.queue, &present) })
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            tracing::error!("device idle before teardown failed: {e}");
        }
        if let Ok(done) = self.sync.timeline_value() {
            debug!("teardown at timeline value {done}");
        }
    }
}

/// Only an out-of-date swapchain is a rebuild; a lost surface or device is
/// fatal.
fn acquire_outcome(acquired: VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
    match acquired {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(Error::submission("acquire", e)),
    }
}

fn present_status(presented: VkResult<bool>) -> Result<PresentStatus> {
    match presented {
        Ok(false) => Ok(PresentStatus::Presented),
        Ok(true) => Ok(PresentStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
        Err(e) => Err(Error::Presentation(format!("queue_present: {e:?}"))),
    }
}

fn timeline_info(sem: vk::Semaphore, value: u64, stage: vk::PipelineStageFlags2) -> vk::SemaphoreSubmitInfo<'static> {
    vk::SemaphoreSubmitInfo {
        s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
        semaphore: sem,
        value,
        stage_mask: stage,
        ..Default::default()
    }
}

fn binary_info(sem: vk::Semaphore, stage: vk::PipelineStageFlags2) -> vk::SemaphoreSubmitInfo<'static> {
    timeline_info(sem, 0, stage)
}

fn command_info(cmd: vk::CommandBuffer) -> vk::CommandBufferSubmitInfo<'static> {
    vk::CommandBufferSubmitInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_SUBMIT_INFO,
        command_buffer: cmd,
        ..Default::default()
    }
}

fn color_barrier(image: vk::Image, old: vk::ImageLayout, new: vk::ImageLayout) -> vk::ImageMemoryBarrier2<'static> {
    let to_present = new == vk::ImageLayout::PRESENT_SRC_KHR;
    let (src_stage, src_access, dst_stage, dst_access) = if to_present {
        (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            vk::AccessFlags2::empty(),
        )
    } else {
        // Chained to the image_available wait, which happens at this stage.
        (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::empty(),
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE | vk::AccessFlags2::COLOR_ATTACHMENT_READ,
        )
    };
    vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask: src_stage,
        src_access_mask: src_access,
        dst_stage_mask: dst_stage,
        dst_access_mask: dst_access,
        old_layout: old,
        new_layout: new,
        image,
        subresource_range: color_range(),
        ..Default::default()
    }
}

fn depth_barrier(depth: &Image) -> vk::ImageMemoryBarrier2<'static> {
    let mut aspect = vk::ImageAspectFlags::DEPTH;
    if matches!(
        depth.format,
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
    ) {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }
    let tests = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
    vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask: tests,
        src_access_mask: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_stage_mask: tests,
        dst_access_mask: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        image: depth.handle,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}

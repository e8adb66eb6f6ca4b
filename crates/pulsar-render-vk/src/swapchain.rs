// SPDX-License-Identifier: CEPL-1.0
//! Everything sized to the surface: swapchain, image views, depth and MSAA
//! targets, and the per-image render-finished semaphores.
use ash::khr::swapchain;
use ash::vk;
use pulsar_core::{Error, Result};
use pulsar_render::{RenderSize, SwapchainInfo, VsyncMode};
use tracing::info;

use crate::device::DeviceContext;
use crate::memory::{Allocator, Image};

#[derive(Clone, Copy, Debug)]
pub struct SwapchainSettings {
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    pub msaa_samples: u32,
    pub depth_format: vk::Format,
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool, mode: VsyncMode) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match (vsync, mode) {
        (false, _) => &[
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ],
        (true, VsyncMode::Mailbox) => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        (true, VsyncMode::Fifo) => &[vk::PresentModeKHR::FIFO],
    };
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// SDR only: sRGB formats first, then UNORM with an sRGB colour space, then
/// whatever the driver lists first.
pub fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, &'static str)> {
    let by = |want: vk::Format, cs: Option<vk::ColorSpaceKHR>| {
        formats
            .iter()
            .copied()
            .find(|f| f.format == want && cs.map_or(true, |c| f.color_space == c))
    };
    by(vk::Format::B8G8R8A8_SRGB, None)
        .map(|f| (f, "bgra8_srgb"))
        .or_else(|| by(vk::Format::R8G8B8A8_SRGB, None).map(|f| (f, "rgba8_srgb")))
        .or_else(|| {
            by(vk::Format::B8G8R8A8_UNORM, Some(vk::ColorSpaceKHR::SRGB_NONLINEAR))
                .map(|f| (f, "bgra8_unorm_srgbcs"))
        })
        .or_else(|| formats.first().map(|&f| (f, "driver_default")))
}

/// What the surface will accept right now. `u32::MAX` means the window
/// decides, so `hint` is fitted into the surface limits; a zero hint stays
/// zero. Zero on either axis means minimized.
pub fn surface_extent(caps: &vk::SurfaceCapabilitiesKHR, hint: RenderSize) -> RenderSize {
    let current = caps.current_extent;
    if current.width != u32::MAX {
        return RenderSize::new(current.width, current.height);
    }
    if hint.is_zero() {
        return hint;
    }
    let (lo, hi) = (caps.min_image_extent, caps.max_image_extent);
    RenderSize::new(hint.width.clamp(lo.width, hi.width), hint.height.clamp(lo.height, hi.height))
}

/// One more than the minimum, capped by the maximum (0 = no maximum).
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

/// Largest supported sample count not above `requested`.
pub fn clamp_samples(requested: u32, supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
    ]
    .into_iter()
    .find(|&(n, flag)| n <= requested && supported.contains(flag))
    .map(|(_, flag)| flag)
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

pub fn sample_count(flags: vk::SampleCountFlags) -> u32 {
    flags.as_raw().max(1)
}

/// Torn down as a unit: dropping it releases views, attachments, semaphores
/// and the swapchain itself. The device must be idle.
pub struct SwapchainResources {
    device: ash::Device,
    loader: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub render_finished: Vec<vk::Semaphore>,
    pub depth: Image,
    /// Multisampled colour target resolved into the swapchain image.
    pub msaa: Option<Image>,
}

impl SwapchainResources {
    pub fn create(
        ctx: &DeviceContext,
        allocator: &Allocator,
        settings: &SwapchainSettings,
        want: RenderSize,
    ) -> Result<Self> {
        let surf = &ctx.surface_loader;
        let (caps, formats, modes) = unsafe {
            (
                surf.get_physical_device_surface_capabilities(ctx.phys, ctx.surface),
                surf.get_physical_device_surface_formats(ctx.phys, ctx.surface),
                surf.get_physical_device_surface_present_modes(ctx.phys, ctx.surface),
            )
        };
        let caps = caps.map_err(surface_error("surface capabilities"))?;
        let formats = formats.map_err(surface_error("surface formats"))?;
        let modes = modes.map_err(surface_error("present modes"))?;

        // The window may have been minimized since the lifecycle polled it.
        let size = surface_extent(&caps, want);
        if size.is_zero() {
            return Err(Error::SurfaceStale(format!(
                "surface extent {}x{} at creation",
                size.width, size.height
            )));
        }
        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        let (surf_format, reason) =
            pick_surface_format(&formats).ok_or_else(|| Error::resource("swapchain", "surface reports no formats"))?;
        let present_mode = choose_present_mode(&modes, settings.vsync, settings.vsync_mode);
        let min_count = image_count(&caps);

        let limits = &ctx.properties.limits;
        let samples = clamp_samples(
            settings.msaa_samples,
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        );

        info!(
            "vk: swapchain {:?}/{:?} ({reason}), {present_mode:?}, {}x{}, images {} (min {}), {}x msaa",
            surf_format.format,
            surf_format.color_space,
            extent.width,
            extent.height,
            min_count,
            caps.min_image_count,
            sample_count(samples),
        );

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: min_count,
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let loader = ctx.swapchain_loader.clone();
        let handle = unsafe { loader.create_swapchain(&swap_info, None) }.map_err(surface_error("swapchain"))?;

        let depth = match create_depth(allocator, settings.depth_format, extent, samples) {
            Ok(d) => d,
            Err(e) => {
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(e);
            }
        };

        // Partially built sets clean up through Drop from here on.
        let mut res = SwapchainResources {
            device: ctx.device.clone(),
            loader,
            swapchain: handle,
            format: surf_format.format,
            extent,
            samples,
            images: Vec::new(),
            views: Vec::new(),
            render_finished: Vec::new(),
            depth,
            msaa: None,
        };

        res.images =
            unsafe { res.loader.get_swapchain_images(handle) }.map_err(|e| Error::resource("swapchain images", e))?;

        for &img in &res.images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: img,
                view_type: vk::ImageViewType::TYPE_2D,
                format: surf_format.format,
                subresource_range: color_range(),
                ..Default::default()
            };
            let view = unsafe { res.device.create_image_view(&iv_info, None) }
                .map_err(|e| Error::resource("swapchain image view", e))?;
            res.views.push(view);

            let sem = unsafe { res.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                .map_err(|e| Error::resource("render-finished semaphore", e))?;
            res.render_finished.push(sem);
        }

        if samples != vk::SampleCountFlags::TYPE_1 {
            res.msaa = Some(create_msaa_target(allocator, surf_format.format, extent, samples)?);
        }
        Ok(res)
    }

    pub fn info(&self) -> SwapchainInfo {
        SwapchainInfo {
            extent: RenderSize::new(self.extent.width, self.extent.height),
            format: self.format.as_raw(),
            image_count: self.images.len() as u32,
            samples: sample_count(self.samples),
        }
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        unsafe {
            for &sem in &self.render_finished {
                self.device.destroy_semaphore(sem, None);
            }
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        // depth and msaa images release themselves after this
    }
}

pub(crate) fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Out-of-date can be rebuilt away; a lost surface cannot.
pub(crate) fn surface_error(what: &'static str) -> impl Fn(vk::Result) -> Error {
    move |e| match e {
        vk::Result::ERROR_OUT_OF_DATE_KHR => Error::SurfaceStale(format!("{what}: {e:?}")),
        vk::Result::ERROR_SURFACE_LOST_KHR => Error::Presentation(format!("{what}: {e:?}")),
        other => Error::resource(what, other),
    }
}

fn create_depth(
    allocator: &Allocator,
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
) -> Result<Image> {
    let info = attachment_info(format, extent, samples, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
    allocator.create_image("depth image", &info, vk::ImageAspectFlags::DEPTH)
}

fn create_msaa_target(
    allocator: &Allocator,
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
) -> Result<Image> {
    let info = attachment_info(
        format,
        extent,
        samples,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
    );
    allocator.create_image("msaa colour image", &info, vk::ImageAspectFlags::COLOR)
}

fn attachment_info(
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples,
        tiling: vk::ImageTiling::OPTIMAL,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn present_mode_policy() {
        use vk::PresentModeKHR as P;
        let all = [P::FIFO, P::MAILBOX, P::IMMEDIATE];
        assert_eq!(choose_present_mode(&all, false, VsyncMode::Mailbox), P::IMMEDIATE);
        assert_eq!(choose_present_mode(&all, true, VsyncMode::Mailbox), P::MAILBOX);
        assert_eq!(choose_present_mode(&all, true, VsyncMode::Fifo), P::FIFO);
        assert_eq!(choose_present_mode(&[P::FIFO], true, VsyncMode::Mailbox), P::FIFO);
        assert_eq!(choose_present_mode(&[P::FIFO, P::MAILBOX], false, VsyncMode::Fifo), P::MAILBOX);
    }

    #[test]
    fn surface_format_preference() {
        let f = |format, color_space| vk::SurfaceFormatKHR { format, color_space };
        let srgb = vk::ColorSpaceKHR::SRGB_NONLINEAR;
        let list = [
            f(vk::Format::B8G8R8A8_UNORM, srgb),
            f(vk::Format::R8G8B8A8_SRGB, srgb),
        ];
        assert_eq!(pick_surface_format(&list).unwrap().0.format, vk::Format::R8G8B8A8_SRGB);

        let list = [f(vk::Format::A2B10G10R10_UNORM_PACK32, srgb), f(vk::Format::B8G8R8A8_UNORM, srgb)];
        assert_eq!(pick_surface_format(&list).unwrap().1, "bgra8_unorm_srgbcs");

        let list = [f(vk::Format::R16G16B16A16_SFLOAT, srgb)];
        assert_eq!(pick_surface_format(&list).unwrap().1, "driver_default");
        assert!(pick_surface_format(&[]).is_none());
    }

    #[test]
    fn extent_uses_current_or_clamps_hint() {
        let c = caps((800, 600), 2, 0);
        assert_eq!(surface_extent(&c, RenderSize::new(10, 10)), RenderSize::new(800, 600));

        let c = caps((u32::MAX, u32::MAX), 2, 0);
        assert_eq!(surface_extent(&c, RenderSize::new(9000, 300)), RenderSize::new(4096, 300));
    }

    #[test]
    fn minimized_surface_reports_zero() {
        // current extent wins over a stale non-zero hint
        let c = caps((0, 0), 2, 0);
        assert!(surface_extent(&c, RenderSize::new(800, 600)).is_zero());

        let c = caps((u32::MAX, u32::MAX), 2, 0);
        assert!(surface_extent(&c, RenderSize::new(0, 600)).is_zero());
    }

    #[test]
    fn only_out_of_date_is_recoverable() {
        let stale = surface_error("swapchain")(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(matches!(stale, Error::SurfaceStale(_)));
        assert!(stale.is_recoverable());

        let lost = surface_error("surface capabilities")(vk::Result::ERROR_SURFACE_LOST_KHR);
        assert!(matches!(lost, Error::Presentation(ref m) if m.contains("surface capabilities")));
        assert!(!lost.is_recoverable());

        let oom = surface_error("swapchain")(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(matches!(oom, Error::ResourceCreation { what: "swapchain", .. }));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        assert_eq!(image_count(&caps((1, 1), 2, 0)), 3);
        assert_eq!(image_count(&caps((1, 1), 2, 8)), 3);
        assert_eq!(image_count(&caps((1, 1), 3, 3)), 3);
    }

    #[test]
    fn samples_clamp_to_support() {
        let s = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_2 | vk::SampleCountFlags::TYPE_4;
        assert_eq!(clamp_samples(8, s), vk::SampleCountFlags::TYPE_4);
        assert_eq!(clamp_samples(2, s), vk::SampleCountFlags::TYPE_2);
        assert_eq!(clamp_samples(1, s), vk::SampleCountFlags::TYPE_1);
        assert_eq!(clamp_samples(3, s), vk::SampleCountFlags::TYPE_2);
        assert_eq!(sample_count(vk::SampleCountFlags::TYPE_4), 4);
    }
}

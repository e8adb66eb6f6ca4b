// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, physical device selection and the logical device.
//!
//! Creation order is instance → debug messenger → surface → device; the
//! context tears them down in reverse.
use std::ffi::{c_void, CStr, CString};
use std::fmt;
use std::sync::Arc;

use ash::ext::debug_utils;
use ash::khr::{portability_enumeration, portability_subset, surface, swapchain};
use ash::{vk, Entry, Instance};
use pulsar_core::{Error, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
    Verbose,
}

impl DiagnosticSeverity {
    pub fn from_vk(s: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        if s.contains(S::ERROR) {
            DiagnosticSeverity::Error
        } else if s.contains(S::WARNING) {
            DiagnosticSeverity::Warning
        } else if s.contains(S::INFO) {
            DiagnosticSeverity::Info
        } else {
            DiagnosticSeverity::Verbose
        }
    }
}

/// Receives every validation message in addition to the tracing output.
/// Kept alive by the [`DeviceContext`] for as long as the messenger exists.
pub type DiagnosticCallback = Arc<dyn Fn(DiagnosticSeverity, &str) + Send + Sync>;

#[derive(Clone)]
pub struct DeviceConfig {
    pub app_name: String,
    /// Device extensions that must be present.
    pub required_extensions: Vec<&'static CStr>,
    /// Device extensions enabled when the device offers them. The portability
    /// subset must be enabled whenever a (MoltenVK-style) device exposes it.
    pub optional_extensions: Vec<&'static CStr>,
    pub validation: bool,
    pub diagnostic: Option<DiagnosticCallback>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "pulsar".into(),
            required_extensions: vec![swapchain::NAME],
            optional_extensions: vec![portability_subset::NAME],
            validation: cfg!(debug_assertions),
            diagnostic: None,
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("app_name", &self.app_name)
            .field("required_extensions", &self.required_extensions)
            .field("optional_extensions", &self.optional_extensions)
            .field("validation", &self.validation)
            .field("diagnostic", &self.diagnostic.is_some())
            .finish()
    }
}

/// Minimum capabilities a physical device must offer.
#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    pub min_api_version: u32,
    pub extensions: Vec<&'static CStr>,
}

impl DeviceRequirements {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            min_api_version: vk::API_VERSION_1_3,
            extensions: config.required_extensions.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureSupport {
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    /// Point sizes above 1.0; the particle pass falls back to 1px points without it.
    pub large_points: bool,
    pub timeline_semaphore: bool,
    pub synchronization2: bool,
    pub dynamic_rendering: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub present: bool,
}

/// Everything selection looks at, gathered up front so it can be judged
/// without a live instance.
#[derive(Clone, Debug)]
pub struct CandidateInfo {
    pub name: String,
    pub api_version: u32,
    pub device_type: vk::PhysicalDeviceType,
    pub extensions: Vec<CString>,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub features: FeatureSupport,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Suitability {
    pub queue_family: u32,
    pub score: u32,
}

/// Returns the combined graphics+compute+present queue family and a ranking
/// score, or every reason the device was rejected.
pub fn evaluate_candidate(req: &DeviceRequirements, c: &CandidateInfo) -> std::result::Result<Suitability, Vec<String>> {
    let mut reasons = Vec::new();

    if c.api_version < req.min_api_version {
        reasons.push(format!(
            "API {}.{} < {}.{}",
            vk::api_version_major(c.api_version),
            vk::api_version_minor(c.api_version),
            vk::api_version_major(req.min_api_version),
            vk::api_version_minor(req.min_api_version),
        ));
    }
    for ext in &req.extensions {
        if !c.extensions.iter().any(|e| e.as_c_str() == *ext) {
            reasons.push(format!("missing extension {}", ext.to_string_lossy()));
        }
    }
    let f = &c.features;
    for (ok, name) in [
        (f.sampler_anisotropy, "samplerAnisotropy"),
        (f.dynamic_rendering, "dynamicRendering"),
        (f.synchronization2, "synchronization2"),
        (f.timeline_semaphore, "timelineSemaphore"),
    ] {
        if !ok {
            reasons.push(format!("missing feature {name}"));
        }
    }
    let combined = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
    let family = c
        .queue_families
        .iter()
        .position(|q| q.flags.contains(combined) && q.present);
    if family.is_none() {
        reasons.push("no queue family with graphics, compute and present".into());
    }

    match family {
        Some(i) if reasons.is_empty() => Ok(Suitability {
            queue_family: i as u32,
            score: match c.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
                _ => 0,
            },
        }),
        _ => Err(reasons),
    }
}

/// Picks the best-scoring suitable candidate; on failure the error lists
/// every device and why it was turned down.
pub fn choose_device(req: &DeviceRequirements, candidates: &[CandidateInfo]) -> Result<(usize, Suitability)> {
    let mut best: Option<(usize, Suitability)> = None;
    let mut rejected = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        match evaluate_candidate(req, c) {
            Ok(s) => {
                if best.map_or(true, |(_, b)| s.score > b.score) {
                    best = Some((i, s));
                }
            }
            Err(reasons) => rejected.push(format!("{}: {}", c.name, reasons.join(", "))),
        }
    }
    best.ok_or_else(|| {
        if candidates.is_empty() {
            Error::Initialization("no Vulkan physical devices".into())
        } else {
            Error::Initialization(format!("no suitable GPU ({})", rejected.join("; ")))
        }
    })
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
    // Pointed to by the messenger's user data.
    _sink: Box<Option<DiagnosticCallback>>,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe {
        let p = (*data).p_message;
        if p.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(p).to_string_lossy()
    };
    let level = DiagnosticSeverity::from_vk(severity);
    match level {
        DiagnosticSeverity::Error => error!("[vulkan] {msg}"),
        DiagnosticSeverity::Warning => warn!("[vulkan] {msg}"),
        DiagnosticSeverity::Info | DiagnosticSeverity::Verbose => debug!("[vulkan] {msg}"),
    }
    if !user.is_null() {
        let sink = unsafe { &*(user as *const Option<DiagnosticCallback>) };
        if let Some(cb) = sink {
            cb(level, &msg);
        }
    }
    vk::FALSE
}

/// Process-wide GPU context: one instance, one surface, one device and a
/// single queue that does graphics, compute and present.
pub struct DeviceContext {
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family: u32,
    pub phys: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: FeatureSupport,
    pub swapchain_loader: swapchain::Device,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    debug: Option<DebugMessenger>,
    pub instance: Instance,
    _entry: Entry,
}

impl DeviceContext {
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle, config: &DeviceConfig) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| Error::Initialization(format!("display handle: {e}")))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| Error::Initialization(format!("window handle: {e}")))?
            .as_raw();

        let entry = Entry::linked();
        let validation = config.validation && layer_available(&entry, VALIDATION_LAYER);
        if config.validation && !validation {
            warn!("validation requested but {} is not installed", VALIDATION_LAYER.to_string_lossy());
        }

        let instance = unsafe { create_instance(&entry, dh, &config.app_name, validation)? };

        // From here on every early return must release what was created.
        let debug = if validation {
            match unsafe { create_debug_messenger(&entry, &instance, config.diagnostic.clone()) } {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) } {
            Ok(s) => s,
            Err(e) => {
                unsafe { destroy_instance(&instance, debug) };
                return Err(Error::Initialization(format!("create_surface: {e:?}")));
            }
        };

        let picked = unsafe { pick_physical_device(&instance, &surface_loader, surface, config) };
        let (phys, queue_family, features) = match picked {
            Ok(p) => p,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    destroy_instance(&instance, debug);
                }
                return Err(e);
            }
        };

        let device = match unsafe { create_device(&instance, phys, queue_family, features, config) } {
            Ok(d) => d,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    destroy_instance(&instance, debug);
                }
                return Err(e);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let properties = unsafe { instance.get_physical_device_properties(phys) };
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        info!(
            "vk: device '{}' (queue family {queue_family}, validation {validation})",
            device_name(&properties)
        );

        Ok(Self {
            device,
            queue,
            queue_family,
            phys,
            properties,
            features,
            swapchain_loader,
            surface_loader,
            surface,
            debug,
            instance,
            _entry: entry,
        })
    }

    pub fn device_name(&self) -> String {
        device_name(&self.properties)
    }

    pub fn depth_format(&self) -> vk::Format {
        // Prefer 32f → 24+S8 → 16
        let candidates = [
            vk::Format::D32_SFLOAT,
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D16_UNORM,
        ];
        for fmt in candidates {
            let props = unsafe { self.instance.get_physical_device_format_properties(self.phys, fmt) };
            if props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            {
                return fmt;
            }
        }
        vk::Format::D32_SFLOAT
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| Error::submission("device idle", e))
    }
}

// device → surface → messenger → instance
impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            destroy_instance(&self.instance, self.debug.take());
        }
    }
}

fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    props
        .device_name_as_c_str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".into())
}

fn layer_available(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == name))
}

unsafe fn destroy_instance(instance: &Instance, debug: Option<DebugMessenger>) {
    if let Some(m) = debug {
        unsafe { m.loader.destroy_debug_utils_messenger(m.handle, None) };
    }
    unsafe { instance.destroy_instance(None) };
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: raw_window_handle::RawDisplayHandle,
    app_name: &str,
    validation: bool,
) -> Result<Instance> {
    let app = CString::new(app_name).map_err(|e| Error::Initialization(format!("app name: {e}")))?;
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_3,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .map_err(|e| Error::Initialization(format!("window-system extensions: {e:?}")))?
        .to_vec();
    if validation {
        extensions.push(debug_utils::NAME.as_ptr());
    }
    let available: Vec<CString> = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(|e| Error::Initialization(format!("enumerate_instance_extension_properties: {e:?}")))?
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();
    let (portability, flags) = portability_setup(&available);
    if let Some(ext) = portability {
        debug!("vk: enumerating portability devices");
        extensions.push(ext.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];
    let (layer_count, layer_ptr) = if validation {
        (layers.len() as u32, layers.as_ptr())
    } else {
        (0, std::ptr::null())
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        flags,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layer_count,
        pp_enabled_layer_names: layer_ptr,
        ..Default::default()
    };
    unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| Error::Initialization(format!("create_instance: {e:?}")))
}

/// Without this extension and flag the loader hides non-conformant
/// implementations such as MoltenVK.
fn portability_setup(available: &[CString]) -> (Option<&'static CStr>, vk::InstanceCreateFlags) {
    if available.iter().any(|e| e.as_c_str() == portability_enumeration::NAME) {
        (
            Some(portability_enumeration::NAME),
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR,
        )
    } else {
        (None, vk::InstanceCreateFlags::empty())
    }
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
    diagnostic: Option<DiagnosticCallback>,
) -> Result<DebugMessenger> {
    let loader = debug_utils::Instance::new(entry, instance);
    let sink = Box::new(diagnostic);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        p_user_data: &*sink as *const Option<DiagnosticCallback> as *mut c_void,
        ..Default::default()
    };
    let handle = unsafe { loader.create_debug_utils_messenger(&ci, None) }
        .map_err(|e| Error::Initialization(format!("debug messenger: {e:?}")))?;
    Ok(DebugMessenger {
        loader,
        handle,
        _sink: sink,
    })
}

unsafe fn query_candidate(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Result<CandidateInfo> {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let extensions = unsafe { instance.enumerate_device_extension_properties(phys) }
        .map_err(|e| Error::Initialization(format!("enumerate_device_extension_properties: {e:?}")))?
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();

    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(phys) }
        .iter()
        .enumerate()
        .map(|(i, q)| QueueFamilyInfo {
            flags: q.queue_flags,
            present: unsafe { surface_loader.get_physical_device_surface_support(phys, i as u32, surface) }
                .unwrap_or(false),
        })
        .collect();

    let mut feats12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut feats13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut feats2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut feats12)
        .push_next(&mut feats13);
    unsafe { instance.get_physical_device_features2(phys, &mut feats2) };
    let base = feats2.features;

    Ok(CandidateInfo {
        name: device_name(&props),
        api_version: props.api_version,
        device_type: props.device_type,
        extensions,
        queue_families,
        features: FeatureSupport {
            sampler_anisotropy: base.sampler_anisotropy == vk::TRUE,
            sample_rate_shading: base.sample_rate_shading == vk::TRUE,
            large_points: base.large_points == vk::TRUE,
            timeline_semaphore: feats12.timeline_semaphore == vk::TRUE,
            synchronization2: feats13.synchronization2 == vk::TRUE,
            dynamic_rendering: feats13.dynamic_rendering == vk::TRUE,
        },
    })
}

unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    config: &DeviceConfig,
) -> Result<(vk::PhysicalDevice, u32, FeatureSupport)> {
    let physicals = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| Error::Initialization(format!("enumerate_physical_devices: {e:?}")))?;
    let mut candidates = Vec::with_capacity(physicals.len());
    for &phys in &physicals {
        candidates.push(unsafe { query_candidate(instance, surface_loader, surface, phys)? });
    }
    let req = DeviceRequirements::from_config(config);
    let (i, suit) = choose_device(&req, &candidates)?;
    debug!("vk: picked '{}' out of {} device(s)", candidates[i].name, candidates.len());
    Ok((physicals[i], suit.queue_family, candidates[i].features))
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
    support: FeatureSupport,
    config: &DeviceConfig,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    let available: Vec<CString> = unsafe { instance.enumerate_device_extension_properties(phys) }
        .map_err(|e| Error::Initialization(format!("enumerate_device_extension_properties: {e:?}")))?
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();
    let mut device_exts: Vec<*const std::ffi::c_char> =
        config.required_extensions.iter().map(|e| e.as_ptr()).collect();
    for ext in &config.optional_extensions {
        if available.iter().any(|a| a.as_c_str() == *ext) {
            debug!("vk: enabling optional extension {}", ext.to_string_lossy());
            device_exts.push(ext.as_ptr());
        }
    }

    // Core 1.3 chain: feats2 -> feats12 -> feats13
    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        synchronization2: vk::TRUE,
        dynamic_rendering: vk::TRUE,
        ..Default::default()
    };
    let mut feats12 = vk::PhysicalDeviceVulkan12Features {
        timeline_semaphore: vk::TRUE,
        ..Default::default()
    };
    let mut feats2 = vk::PhysicalDeviceFeatures2 {
        features: vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            sample_rate_shading: support.sample_rate_shading.into(),
            large_points: support.large_points.into(),
            ..Default::default()
        },
        ..Default::default()
    }
    .push_next(&mut feats12)
    .push_next(&mut feats13);

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    }
    .push_next(&mut feats2);

    unsafe { instance.create_device(phys, &dinfo, None) }
        .map_err(|e| Error::Initialization(format!("create_device: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_gpu(name: &str, ty: vk::PhysicalDeviceType) -> CandidateInfo {
        CandidateInfo {
            name: name.into(),
            api_version: vk::make_api_version(0, 1, 3, 250),
            device_type: ty,
            extensions: vec![swapchain::NAME.to_owned()],
            queue_families: vec![
                QueueFamilyInfo {
                    flags: vk::QueueFlags::TRANSFER,
                    present: false,
                },
                QueueFamilyInfo {
                    flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                    present: true,
                },
            ],
            features: FeatureSupport {
                sampler_anisotropy: true,
                sample_rate_shading: true,
                large_points: true,
                timeline_semaphore: true,
                synchronization2: true,
                dynamic_rendering: true,
            },
        }
    }

    fn req() -> DeviceRequirements {
        DeviceRequirements::from_config(&DeviceConfig::default())
    }

    #[test]
    fn suitable_device_reports_combined_family() {
        let s = evaluate_candidate(&req(), &good_gpu("a", vk::PhysicalDeviceType::INTEGRATED_GPU)).unwrap();
        assert_eq!(s.queue_family, 1);
    }

    #[test]
    fn every_rejection_reason_is_listed() {
        let mut c = good_gpu("old", vk::PhysicalDeviceType::DISCRETE_GPU);
        c.api_version = vk::make_api_version(0, 1, 2, 0);
        c.extensions.clear();
        c.features.timeline_semaphore = false;
        c.queue_families[1].present = false;
        let reasons = evaluate_candidate(&req(), &c).unwrap_err();
        assert_eq!(reasons.len(), 4, "{reasons:?}");
        assert!(reasons[0].starts_with("API 1.2"));
        assert!(reasons.iter().any(|r| r.contains("VK_KHR_swapchain")));
        assert!(reasons.iter().any(|r| r.contains("timelineSemaphore")));
    }

    #[test]
    fn discrete_gpu_wins() {
        let list = [
            good_gpu("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            good_gpu("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU),
            good_gpu("cpu", vk::PhysicalDeviceType::CPU),
        ];
        let (i, _) = choose_device(&req(), &list).unwrap();
        assert_eq!(i, 1);
    }

    #[test]
    fn no_suitable_device_is_initialization_error() {
        let mut c = good_gpu("weak", vk::PhysicalDeviceType::INTEGRATED_GPU);
        c.features.dynamic_rendering = false;
        let err = choose_device(&req(), &[c]).unwrap_err();
        assert!(matches!(err, Error::Initialization(ref m) if m.contains("weak") && m.contains("dynamicRendering")));
        assert!(matches!(choose_device(&req(), &[]), Err(Error::Initialization(_))));
    }

    #[test]
    fn large_points_are_optional() {
        let mut c = good_gpu("tiler", vk::PhysicalDeviceType::INTEGRATED_GPU);
        c.features.large_points = false;
        assert!(evaluate_candidate(&req(), &c).is_ok());

        c.features.sampler_anisotropy = false;
        let reasons = evaluate_candidate(&req(), &c).unwrap_err();
        assert_eq!(reasons, vec!["missing feature samplerAnisotropy".to_string()]);
    }

    #[test]
    fn portability_enumeration_sets_flag() {
        let (ext, flags) = portability_setup(&[c"VK_KHR_surface".to_owned()]);
        assert!(ext.is_none());
        assert!(flags.is_empty());

        let (ext, flags) = portability_setup(&[portability_enumeration::NAME.to_owned()]);
        assert_eq!(ext, Some(portability_enumeration::NAME));
        assert!(flags.contains(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR));
        assert!(DeviceConfig::default()
            .optional_extensions
            .contains(&portability_subset::NAME));
    }

    #[test]
    fn severity_mapping() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(DiagnosticSeverity::from_vk(S::ERROR), DiagnosticSeverity::Error);
        assert_eq!(DiagnosticSeverity::from_vk(S::WARNING), DiagnosticSeverity::Warning);
        assert_eq!(DiagnosticSeverity::from_vk(S::INFO), DiagnosticSeverity::Info);
        assert_eq!(DiagnosticSeverity::from_vk(S::VERBOSE), DiagnosticSeverity::Verbose);
    }
}

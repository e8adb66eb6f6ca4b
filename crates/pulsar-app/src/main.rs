// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use portable_atomic::{AtomicU64, Ordering};
use pulsar_core::init_tracing;
use pulsar_platform::{framebuffer_extent, SurfaceWatcher};
use pulsar_render::assets::ShaderBlobs;
use pulsar_render::model::load_model;
use pulsar_render::{
    AssetConfig, FrameOutcome, FrameScheduler, ModelConfig, ModelData, RendererConfig, ResizeFlag, SimConfig,
    SimParams,
};
use pulsar_render_vk::{builtin_shaders, DiagnosticCallback, DiagnosticSeverity, RendererDesc, VkRenderer};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use pulsar_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

const DEFAULT_CONFIG: &str = "pulsar.toml";

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./pulsar.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Exit cleanly after this many presented frames
    #[arg(long)]
    frames: Option<u64>,
    /// Seed for the initial particle distribution
    #[arg(long)]
    seed: Option<u64>,
    /// Particle count (rounded up to a whole workgroup)
    #[arg(long)]
    particles: Option<u32>,
    /// Enable the Khronos validation layer
    #[arg(long)]
    validation: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
struct WindowCfg {
    #[serde(default = "default_title")]
    title: String,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_title() -> String {
    "pulsar".into()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
struct AppCfg {
    #[serde(default)]
    window: WindowCfg,
    #[serde(default)]
    render: RendererConfig,
    #[serde(default)]
    sim: SimConfig,
    #[serde(default)]
    assets: AssetConfig,
    #[serde(default)]
    model: ModelConfig,
}

impl AppCfg {
    fn apply_args(&mut self, args: &Args) {
        if let Some(seed) = args.seed {
            self.sim.seed = Some(seed);
        }
        if let Some(n) = args.particles {
            self.sim.particle_count = n;
        }
        if args.validation {
            self.render.validation = true;
        }
    }
}

fn load_cfg(path: Option<&Path>) -> AppCfg {
    let path = path.unwrap_or(Path::new(DEFAULT_CONFIG));
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            debug!("no config at {}; using defaults", path.display());
            return AppCfg::default();
        }
    };
    toml::from_str::<AppCfg>(&text).unwrap_or_else(|e| {
        warn!("ignoring {}: {e}", path.display());
        AppCfg::default()
    })
}

fn load_model_data(cfg: &ModelConfig) -> Result<Option<ModelData>> {
    let Some((obj, texture)) = cfg.sources() else {
        if cfg.obj.is_some() || cfg.texture.is_some() {
            warn!("model needs both `obj` and `texture`; skipping the model pass");
        }
        return Ok(None);
    };
    let data = load_model(obj, texture).with_context(|| format!("loading model {}", obj.display()))?;
    Ok(Some(data))
}

fn load_shaders(assets: &AssetConfig) -> Result<ShaderBlobs> {
    match &assets.shader_dir {
        Some(dir) => ShaderBlobs::load_dir(dir).with_context(|| format!("loading shaders from {}", dir.display())),
        None => Ok(builtin_shaders()),
    }
}

struct Stats {
    presented: u64,
    dropped: u64,
    fps_frames: u32,
    last_fps: Instant,
    last_frame: Instant,
}

// Field order matters: the renderer must go before the window it draws into.
struct App {
    cfg: AppCfg,
    frame_limit: Option<u64>,
    resize: ResizeFlag,
    validation_errors: Arc<AtomicU64>,
    renderer: Option<VkRenderer>,
    scheduler: Option<FrameScheduler>,
    watcher: Option<SurfaceWatcher>,
    window: Option<Window>,
    stats: Stats,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, frame_limit: Option<u64>) -> Self {
        let now = Instant::now();
        App {
            cfg,
            frame_limit,
            resize: ResizeFlag::new(),
            validation_errors: Arc::new(AtomicU64::new(0)),
            renderer: None,
            scheduler: None,
            watcher: None,
            window: None,
            stats: Stats {
                presented: 0,
                dropped: 0,
                fps_frames: 0,
                last_fps: now,
                last_frame: now,
            },
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(self.cfg.window.width, self.cfg.window.height));
        let window = event_loop.create_window(attrs).context("create_window")?;
        let size = framebuffer_extent(&window);

        let errors = self.validation_errors.clone();
        let diagnostic: DiagnosticCallback = Arc::new(move |severity, _msg| {
            if severity == DiagnosticSeverity::Error {
                errors.fetch_add(1, Ordering::Relaxed);
            }
        });

        let seed = self.cfg.sim.resolve_seed();
        let desc = RendererDesc {
            app_name: self.cfg.window.title.clone(),
            config: self.cfg.render.clone(),
            particle_count: self.cfg.sim.dispatch_particle_count(),
            seed,
            shaders: load_shaders(&self.cfg.assets)?,
            model: load_model_data(&self.cfg.model)?,
            spin_deg_per_sec: self.cfg.model.spin_deg_per_sec,
            diagnostic: Some(diagnostic),
        };
        let (renderer, info) = VkRenderer::new(&window, &window, size, desc).context("vk init")?;
        info!("renderer on '{}', swapchain {:?}", renderer.device_name(), info);

        let mut scheduler = FrameScheduler::new(&self.cfg.render, self.resize.clone());
        scheduler.adopt_swapchain(info);

        self.watcher = Some(SurfaceWatcher::new(self.resize.clone(), size));
        self.scheduler = Some(scheduler);
        self.renderer = Some(renderer);
        self.window = Some(window);
        self.stats.last_frame = Instant::now();
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        let (Some(renderer), Some(scheduler)) = (self.renderer.as_mut(), self.scheduler.as_mut()) else {
            return Ok(());
        };

        let now = Instant::now();
        let frame_ms = now.duration_since(self.stats.last_frame).as_secs_f32() * 1000.0;
        self.stats.last_frame = now;
        let params = SimParams::new(frame_ms, self.cfg.sim.time_scale, renderer.particle_count());

        match scheduler.draw_frame(renderer, &params)? {
            FrameOutcome::Presented { rebuilt, .. } => {
                self.stats.presented += 1;
                self.stats.fps_frames += 1;
                if rebuilt {
                    info!("swapchain generation {}", scheduler.lifecycle().generation());
                }
            }
            FrameOutcome::Dropped(reason) => {
                self.stats.dropped += 1;
                debug!("frame dropped: {reason:?}");
            }
            FrameOutcome::Deferred => {}
        }

        if now.duration_since(self.stats.last_fps).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.stats.fps_frames);
            self.stats.fps_frames = 0;
            self.stats.last_fps = now;
        }
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.frame_limit.is_some_and(|n| self.stats.presented >= n)
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(r) = &self.renderer {
            let s = r.allocator_stats();
            debug!(
                "allocator at shutdown: {} live ({} bytes), {} total",
                s.live_allocations, s.live_bytes, s.total_allocations
            );
        }
        info!(
            "{} frames presented, {} dropped, {} validation errors",
            self.stats.presented,
            self.stats.dropped,
            self.validation_errors.load(Ordering::Relaxed)
        );
        self.scheduler = None;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.start(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() != window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                let Some(watcher) = self.watcher.as_mut() else { return };
                if watcher.on_resized(new_size) {
                    debug!("Resized → {}x{}", new_size.width, new_size.height);
                    if let Some(r) = self.renderer.as_mut() {
                        r.set_window_extent(watcher.extent());
                    }
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.draw() {
                    self.fail(event_loop, e.context("frame"));
                    return;
                }
                if self.limit_reached() {
                    info!("frame limit reached");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if event_loop.exiting() {
            return;
        }
        // Minimized: sleep until a resize event brings the surface back.
        let minimized = self.watcher.as_ref().is_some_and(SurfaceWatcher::is_minimized);
        if minimized {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_cfg(args.config.as_deref());
    cfg.apply_args(&args);
    debug!("config: {cfg:?}");

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, args.frames);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pulsar_render::{PresentSync, VsyncMode};

    #[test]
    fn full_config_parses() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [window]
            title = "demo"
            width = 1280

            [render]
            vsync_mode = "fifo"
            msaa_samples = 1
            present_sync = "render_finished_semaphore"

            [sim]
            particle_count = 1000
            seed = 7
            time_scale = 1.0

            [assets]
            shader_dir = "shaders"

            [model]
            obj = "viking_room.obj"
            texture = "viking_room.png"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Fifo);
        assert_eq!(cfg.render.present_sync, PresentSync::RenderFinishedSemaphore);
        assert_eq!(cfg.sim.seed, Some(7));
        assert_eq!(cfg.sim.dispatch_particle_count(), 1024);
        assert_eq!(cfg.assets.shader_dir, Some(PathBuf::from("shaders")));
        assert_eq!(
            cfg.model.sources(),
            Some((Path::new("viking_room.obj"), Path::new("viking_room.png")))
        );
        assert_eq!(cfg.model.spin_deg_per_sec, 90.0);
    }

    #[test]
    fn half_configured_model_is_skipped() {
        let cfg = ModelConfig {
            obj: Some(PathBuf::from("only.obj")),
            ..Default::default()
        };
        assert!(load_model_data(&cfg).unwrap().is_none());
        assert!(load_model_data(&ModelConfig::default()).unwrap().is_none());
    }

    #[test]
    fn missing_model_files_fail_startup() {
        let cfg = ModelConfig {
            obj: Some(PathBuf::from("does/not/exist.obj")),
            texture: Some(PathBuf::from("does/not/exist.png")),
            ..Default::default()
        };
        assert!(load_model_data(&cfg).is_err());
    }

    #[test]
    fn empty_config_is_default() {
        let cfg: AppCfg = toml::from_str("").unwrap();
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_cfg(Some(Path::new("does/not/exist.toml")));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn cli_overrides_config() {
        let mut cfg = AppCfg::default();
        cfg.sim.seed = Some(1);
        let args = Args {
            seed: Some(99),
            particles: Some(300),
            validation: true,
            ..Default::default()
        };
        cfg.apply_args(&args);
        assert_eq!(cfg.sim.seed, Some(99));
        assert_eq!(cfg.sim.particle_count, 300);
        assert!(cfg.render.validation);
    }

    #[test]
    fn cli_parses_flags() {
        let args = Args::parse_from(["pulsar", "--frames", "10", "--seed", "3", "--validation"]);
        assert_eq!(args.frames, Some(10));
        assert_eq!(args.seed, Some(3));
        assert!(args.validation);
        assert_eq!(args.config, None);
    }
}

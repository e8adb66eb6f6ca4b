// SPDX-License-Identifier: CEPL-1.0
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Compute workgroup width baked into the particle shader.
pub const WORKGROUP_SIZE: u32 = 256;

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    Fifo,
    #[default]
    Mailbox,
}

/// How the graphics submission hands its image to the presentation engine.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentSync {
    /// CPU waits on the graphics timeline value, then presents with no semaphores.
    #[default]
    HostWait,
    /// Graphics also signals a per-image binary semaphore that present waits on.
    RenderFinishedSemaphore,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RendererConfig {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_true")]
    pub vsync: bool,
    #[serde(default)]
    pub vsync_mode: VsyncMode,
    #[serde(default = "default_msaa")]
    pub msaa_samples: u32,
    #[serde(default)]
    pub present_sync: PresentSync,
    #[serde(default = "default_validation")]
    pub validation: bool,
    #[serde(default = "default_true")]
    pub pipeline_cache: bool,
    /// Extent polls per rebuild attempt before the rebuild is deferred.
    #[serde(default = "default_poll_limit")]
    pub extent_poll_limit: u32,
    #[serde(default = "default_poll_interval")]
    pub extent_poll_interval_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            clear_color: default_clear(),
            vsync: true,
            vsync_mode: VsyncMode::Mailbox,
            msaa_samples: default_msaa(),
            present_sync: PresentSync::HostWait,
            validation: default_validation(),
            pipeline_cache: true,
            extent_poll_limit: default_poll_limit(),
            extent_poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimConfig {
    #[serde(default = "default_particles")]
    pub particle_count: u32,
    /// Fixed seed for reproducible runs; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Multiplier applied to the frame time (ms) before it reaches the shader.
    #[serde(default = "default_time_scale")]
    pub time_scale: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            particle_count: default_particles(),
            seed: None,
            time_scale: default_time_scale(),
        }
    }
}

impl SimConfig {
    /// Particle count rounded up so every dispatched invocation has a particle.
    pub fn dispatch_particle_count(&self) -> u32 {
        let n = self.particle_count.max(1);
        n.div_ceil(WORKGROUP_SIZE) * WORKGROUP_SIZE
    }

    /// The configured seed, or a fresh random one.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct AssetConfig {
    /// Directory holding precompiled `particles.{comp,vert,frag}.spv` and
    /// `model.{vert,frag}.spv`.
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
}

/// Optional textured mesh drawn underneath the particles.
///
/// The model pass is on only when both files are given.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Wavefront OBJ; faces are triangulated on load.
    #[serde(default)]
    pub obj: Option<PathBuf>,
    /// PNG or JPEG, expanded to RGBA8.
    #[serde(default)]
    pub texture: Option<PathBuf>,
    /// Spin around +Z in degrees per second.
    #[serde(default = "default_spin")]
    pub spin_deg_per_sec: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            obj: None,
            texture: None,
            spin_deg_per_sec: default_spin(),
        }
    }
}

impl ModelConfig {
    pub fn sources(&self) -> Option<(&Path, &Path)> {
        Some((self.obj.as_deref()?, self.texture.as_deref()?))
    }
}

fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_true() -> bool {
    true
}
fn default_msaa() -> u32 {
    1
}
fn default_validation() -> bool {
    cfg!(debug_assertions)
}
fn default_poll_limit() -> u32 {
    4
}
fn default_poll_interval() -> u64 {
    16
}
fn default_particles() -> u32 {
    8192
}
fn default_time_scale() -> f32 {
    2.0
}
fn default_spin() -> f32 {
    90.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_tables_take_defaults() {
        let r: RendererConfig = toml::from_str("").unwrap();
        assert_eq!(r, RendererConfig::default());
        let s: SimConfig = toml::from_str("").unwrap();
        assert_eq!(s, SimConfig::default());
    }

    #[test]
    fn snake_case_enums() {
        let r: RendererConfig = toml::from_str(
            r#"
            vsync_mode = "fifo"
            present_sync = "render_finished_semaphore"
            msaa_samples = 4
            "#,
        )
        .unwrap();
        assert_eq!(r.vsync_mode, VsyncMode::Fifo);
        assert_eq!(r.present_sync, PresentSync::RenderFinishedSemaphore);
        assert_eq!(r.msaa_samples, 4);
        assert!(r.vsync);
    }

    #[test]
    fn particle_count_rounds_to_workgroups() {
        let mut s = SimConfig::default();
        assert_eq!(s.dispatch_particle_count(), 8192);

        s.particle_count = 1000;
        assert_eq!(s.dispatch_particle_count(), 1024);
        assert_eq!(s.dispatch_particle_count() % WORKGROUP_SIZE, 0);

        s.particle_count = 0;
        assert_eq!(s.dispatch_particle_count(), 256);
    }

    #[test]
    fn model_needs_both_sources() {
        let m: ModelConfig = toml::from_str(r#"obj = "room.obj""#).unwrap();
        assert!(m.sources().is_none());
        assert_eq!(m.spin_deg_per_sec, 90.0);

        let m: ModelConfig = toml::from_str(
            r#"
            obj = "room.obj"
            texture = "room.png"
            "#,
        )
        .unwrap();
        let (obj, tex) = m.sources().unwrap();
        assert_eq!(obj, Path::new("room.obj"));
        assert_eq!(tex, Path::new("room.png"));
    }

    #[test]
    fn fixed_seed_is_kept() {
        let s: SimConfig = toml::from_str("seed = 1234").unwrap();
        assert_eq!(s.resolve_seed(), 1234);
        assert_eq!(s.resolve_seed(), 1234);
    }
}

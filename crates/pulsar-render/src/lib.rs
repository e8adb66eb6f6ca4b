// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic core of the particle frame pipeline.
//!
//! The [`scheduler::FrameScheduler`] sequences compute and graphics work for
//! each frame slot against any [`scheduler::FrameBackend`]; the
//! [`lifecycle::SwapchainLifecycle`] owns swapchain rebuilds. Neither knows
//! about Vulkan: the ash backend lives in `pulsar-render-vk`.
pub mod assets;
pub mod config;
pub mod frame;
pub mod lifecycle;
pub mod mesh;
pub mod model;
pub mod particles;
pub mod scheduler;
pub mod timeline;

pub use config::{AssetConfig, ModelConfig, PresentSync, RendererConfig, SimConfig, VsyncMode};
pub use frame::{FrameSlot, SlotState, FRAMES_IN_FLIGHT};
pub use lifecycle::{RebuildOutcome, SwapchainHost, SwapchainInfo, SwapchainLifecycle};
pub use mesh::{MeshData, MeshVertex};
pub use model::{ModelData, ModelUniform, TextureData};
pub use particles::{Particle, SimParams};
pub use scheduler::{
    AcquireOutcome, DropReason, FrameBackend, FrameOutcome, FrameScheduler, PresentStatus, ResizeFlag,
};
pub use timeline::{DependencyCounter, FrameTimeline};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-sized framebuffer.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

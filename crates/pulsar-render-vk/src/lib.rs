// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend for the particle frame pipeline, built on `ash` with
//! dynamic rendering and synchronization2.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod backend;
pub mod device;
pub mod memory;
pub mod model;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
pub mod sync;

pub use backend::{RendererDesc, VkRenderer};
pub use device::{DeviceConfig, DiagnosticCallback, DiagnosticSeverity};
pub use memory::AllocatorStats;
pub use pipelines::builtin_shaders;

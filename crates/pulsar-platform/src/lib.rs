// SPDX-License-Identifier: CEPL-1.0
//! Window-system side of the frame pipeline. winit is re-exported so the
//! binary does not pin its own version.
#![deny(unsafe_op_in_unsafe_fn)]
pub use winit;

use pulsar_render::{RenderSize, ResizeFlag};
use tracing::info;
use winit::dpi::PhysicalSize;
use winit::window::Window;

pub fn framebuffer_extent(window: &Window) -> RenderSize {
    let size = window.inner_size();
    RenderSize::new(size.width, size.height)
}

/// Tracks the framebuffer size reported by window events and raises the
/// scheduler's resize flag when it changes.
#[derive(Debug)]
pub struct SurfaceWatcher {
    flag: ResizeFlag,
    extent: RenderSize,
}

impl SurfaceWatcher {
    pub fn new(flag: ResizeFlag, extent: RenderSize) -> Self {
        Self { flag, extent }
    }

    pub fn extent(&self) -> RenderSize {
        self.extent
    }

    /// Minimized windows report zero here.
    pub fn is_minimized(&self) -> bool {
        self.extent.is_zero()
    }

    /// Returns whether the size actually changed.
    pub fn on_resized(&mut self, size: PhysicalSize<u32>) -> bool {
        let next = RenderSize::new(size.width, size.height);
        if next == self.extent {
            return false;
        }
        if next.is_zero() != self.extent.is_zero() {
            info!("window {}", if next.is_zero() { "minimized" } else { "restored" });
        }
        self.extent = next;
        self.flag.set();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_raises_flag_once_per_change() {
        let flag = ResizeFlag::new();
        let mut w = SurfaceWatcher::new(flag.clone(), RenderSize::new(800, 600));

        assert!(!w.on_resized(PhysicalSize::new(800, 600)));
        assert!(!flag.is_set());

        assert!(w.on_resized(PhysicalSize::new(1024, 768)));
        assert!(flag.take());
        assert_eq!(w.extent(), RenderSize::new(1024, 768));
    }

    #[test]
    fn minimize_is_tracked() {
        let flag = ResizeFlag::new();
        let mut w = SurfaceWatcher::new(flag.clone(), RenderSize::new(800, 600));
        w.on_resized(PhysicalSize::new(0, 0));
        assert!(w.is_minimized());
        assert!(flag.is_set());
    }
}

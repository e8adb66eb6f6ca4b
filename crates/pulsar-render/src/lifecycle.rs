// SPDX-License-Identifier: CEPL-1.0
//! Wholesale swapchain rebuilds.
//!
//! A rebuild is deliberately coarse: wait for the device to go idle, drop
//! every extent-dependent resource, create them again. Simulation buffers,
//! pipelines and descriptor sets are never part of it.
use pulsar_core::Result;
use tracing::{debug, info, warn};

use crate::RenderSize;

/// What a rebuild produced; compared across rebuilds for idempotence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub extent: RenderSize,
    /// Raw colour format code of the backend.
    pub format: i32,
    pub image_count: u32,
    pub samples: u32,
}

/// The side of the backend that owns swapchain-derived resources.
pub trait SwapchainHost {
    /// Current drawable extent; zero while the window is minimized.
    fn surface_extent(&mut self) -> Result<RenderSize>;

    /// Give the windowing system a chance to change the extent between polls.
    fn wait_for_surface_events(&mut self);

    fn wait_device_idle(&mut self) -> Result<()>;

    /// Release views, attachments, per-image semaphores and the swapchain.
    fn destroy_swapchain_resources(&mut self);

    /// Create the full swapchain resource set for `extent` (never zero).
    ///
    /// Returns a recoverable error when the surface went stale or reports a
    /// zero extent again by the time of creation.
    fn create_swapchain_resources(&mut self, extent: RenderSize) -> Result<SwapchainInfo>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    Rebuilt(SwapchainInfo),
    /// No swapchain came out of this attempt. Either the surface kept a zero
    /// extent (nothing was touched) or it went stale during creation (the old
    /// resources are already gone).
    Deferred,
}

#[derive(Debug)]
pub struct SwapchainLifecycle {
    poll_limit: u32,
    generation: u64,
    current: Option<SwapchainInfo>,
}

impl SwapchainLifecycle {
    pub fn new(poll_limit: u32) -> Self {
        Self {
            poll_limit: poll_limit.max(1),
            generation: 0,
            current: None,
        }
    }

    /// Record the resources created at startup as generation 0.
    pub fn adopt(&mut self, info: SwapchainInfo) {
        self.current = Some(info);
    }

    pub fn current(&self) -> Option<SwapchainInfo> {
        self.current
    }

    /// Number of completed rebuilds.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rebuild<H: SwapchainHost + ?Sized>(&mut self, host: &mut H) -> Result<RebuildOutcome> {
        let Some(extent) = self.poll_extent(host)? else {
            debug!("surface extent is zero; swapchain rebuild deferred");
            return Ok(RebuildOutcome::Deferred);
        };

        host.wait_device_idle()?;
        host.destroy_swapchain_resources();
        self.current = None;

        let info = match host.create_swapchain_resources(extent) {
            Ok(info) => info,
            Err(e) if e.is_recoverable() => {
                warn!("swapchain creation deferred: {e}");
                return Ok(RebuildOutcome::Deferred);
            }
            Err(e) => return Err(e),
        };
        self.generation += 1;
        self.current = Some(info);
        info!(
            "swapchain rebuilt (gen {}): {}x{}, {} images, {}x msaa",
            self.generation, info.extent.width, info.extent.height, info.image_count, info.samples
        );
        Ok(RebuildOutcome::Rebuilt(info))
    }

    fn poll_extent<H: SwapchainHost + ?Sized>(&self, host: &mut H) -> Result<Option<RenderSize>> {
        for attempt in 0..self.poll_limit {
            let extent = host.surface_extent()?;
            if !extent.is_zero() {
                return Ok(Some(extent));
            }
            if attempt + 1 < self.poll_limit {
                host.wait_for_surface_events();
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsar_core::Error;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Host {
        extents: VecDeque<RenderSize>,
        fallback: RenderSize,
        stale_creates: u32,
        live: u32,
        created: u32,
        idles: u32,
        waits: u32,
    }

    impl SwapchainHost for Host {
        fn surface_extent(&mut self) -> Result<RenderSize> {
            Ok(self.extents.pop_front().unwrap_or(self.fallback))
        }
        fn wait_for_surface_events(&mut self) {
            self.waits += 1;
        }
        fn wait_device_idle(&mut self) -> Result<()> {
            self.idles += 1;
            Ok(())
        }
        fn destroy_swapchain_resources(&mut self) {
            self.live = 0;
        }
        fn create_swapchain_resources(&mut self, extent: RenderSize) -> Result<SwapchainInfo> {
            assert!(!extent.is_zero());
            if self.stale_creates > 0 {
                self.stale_creates -= 1;
                return Err(Error::SurfaceStale("extent is zero at creation".into()));
            }
            self.live = 3;
            self.created += 1;
            Ok(SwapchainInfo {
                extent,
                format: 50,
                image_count: 3,
                samples: 1,
            })
        }
    }

    #[test]
    fn polls_through_zero_extent() {
        let mut host = Host {
            extents: [RenderSize::new(0, 0), RenderSize::new(0, 0)].into(),
            fallback: RenderSize::new(640, 480),
            ..Default::default()
        };
        let mut lc = SwapchainLifecycle::new(4);
        let out = lc.rebuild(&mut host).unwrap();
        assert!(matches!(out, RebuildOutcome::Rebuilt(i) if i.extent == RenderSize::new(640, 480)));
        assert_eq!(host.waits, 2);
        assert_eq!(host.idles, 1);
        assert_eq!(lc.generation(), 1);
    }

    #[test]
    fn defers_without_touching_resources() {
        let mut host = Host {
            fallback: RenderSize::new(0, 0),
            live: 3,
            ..Default::default()
        };
        let mut lc = SwapchainLifecycle::new(2);
        assert_eq!(lc.rebuild(&mut host).unwrap(), RebuildOutcome::Deferred);
        assert_eq!(host.live, 3);
        assert_eq!(host.idles, 0);
        assert_eq!(host.created, 0);
        assert_eq!(lc.generation(), 0);
    }

    #[test]
    fn stale_creation_defers_and_retries() {
        let mut host = Host {
            fallback: RenderSize::new(800, 600),
            live: 3,
            stale_creates: 1,
            ..Default::default()
        };
        let mut lc = SwapchainLifecycle::new(2);
        assert_eq!(lc.rebuild(&mut host).unwrap(), RebuildOutcome::Deferred);
        assert_eq!(host.live, 0);
        assert_eq!(lc.current(), None);
        assert_eq!(lc.generation(), 0);

        assert!(matches!(lc.rebuild(&mut host).unwrap(), RebuildOutcome::Rebuilt(_)));
        assert_eq!(host.live, 3);
        assert_eq!(lc.generation(), 1);
    }
}

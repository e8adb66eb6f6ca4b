// SPDX-License-Identifier: CEPL-1.0
//! Per-frame sequencing of acquire, compute, graphics and present.
//!
//! Each call to [`FrameScheduler::draw_frame`] walks the current slot through
//! `Idle → WaitPrevious → ComputeSubmitted → GraphicsSubmitted → Presenting →
//! Idle`. Ordering between the two submissions of a frame, and between
//! consecutive frames, comes entirely from [`DependencyCounter`] values.
use std::sync::Arc;

use portable_atomic::{AtomicBool, Ordering};
use pulsar_core::Result;
use tracing::{debug, warn};

use crate::config::{PresentSync, RendererConfig};
use crate::frame::{FrameSlot, SlotState, FRAMES_IN_FLIGHT};
use crate::lifecycle::{RebuildOutcome, SwapchainHost, SwapchainInfo, SwapchainLifecycle};
use crate::particles::SimParams;
use crate::timeline::{DependencyCounter, FrameTimeline};

/// Polled "the window was resized" flag.
///
/// The windowing side calls [`ResizeFlag::set`]; the scheduler consumes it at
/// most once per frame.
#[derive(Clone, Debug, Default)]
pub struct ResizeFlag(Arc<AtomicBool>);

impl ResizeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns whether the flag was set, clearing it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Why a frame produced no image on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Acquire reported a stale surface; nothing was submitted.
    StaleOnAcquire,
    /// Work was submitted but present reported a stale surface.
    StaleOnPresent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32, rebuilt: bool },
    Dropped(DropReason),
    /// A rebuild is waiting for a non-zero surface extent.
    Deferred,
}

/// Everything the scheduler needs from a GPU backend.
///
/// Implementations map "out of date" to [`AcquireOutcome::OutOfDate`] /
/// [`PresentStatus::OutOfDate`] and every other non-success code to an error.
/// A recoverable error from acquire or present is treated as out of date; a
/// lost surface or device must come back as a fatal one.
pub trait FrameBackend: SwapchainHost {
    fn acquire_image(&mut self, slot: FrameSlot) -> Result<AcquireOutcome>;

    /// Blocks until the slot's previous submission retired.
    fn wait_slot_fence(&mut self, slot: FrameSlot) -> Result<()>;

    fn reset_slot_fence(&mut self, slot: FrameSlot) -> Result<()>;

    fn write_uniforms(&mut self, slot: FrameSlot, params: &SimParams) -> Result<()>;

    /// Records and submits the compute pass: waits `compute_wait`, signals
    /// `compute_signal`.
    fn submit_compute(&mut self, slot: FrameSlot, timeline: &FrameTimeline) -> Result<()>;

    /// Records and submits the draw: waits `graphics_wait`, signals
    /// `graphics_signal` and the slot fence, plus the image's render-finished
    /// semaphore when `signal_render_finished` is set.
    fn submit_graphics(
        &mut self,
        slot: FrameSlot,
        image_index: u32,
        timeline: &FrameTimeline,
        signal_render_finished: bool,
    ) -> Result<()>;

    /// Host wait on the timeline counter.
    fn wait_timeline(&mut self, value: u64) -> Result<()>;

    fn present(&mut self, image_index: u32, wait_render_finished: bool) -> Result<PresentStatus>;
}

#[derive(Debug)]
pub struct FrameScheduler {
    present_sync: PresentSync,
    slot: FrameSlot,
    states: [SlotState; FRAMES_IN_FLIGHT],
    counter: DependencyCounter,
    lifecycle: SwapchainLifecycle,
    resize: ResizeFlag,
    rebuild_pending: bool,
    frames_submitted: u64,
    frames_presented: u64,
    last_timeline: Option<FrameTimeline>,
}

impl FrameScheduler {
    pub fn new(config: &RendererConfig, resize: ResizeFlag) -> Self {
        Self {
            present_sync: config.present_sync,
            slot: FrameSlot::new(0),
            states: [SlotState::Idle; FRAMES_IN_FLIGHT],
            counter: DependencyCounter::new(),
            lifecycle: SwapchainLifecycle::new(config.extent_poll_limit),
            resize,
            rebuild_pending: false,
            frames_submitted: 0,
            frames_presented: 0,
            last_timeline: None,
        }
    }

    /// Registers the swapchain created alongside the backend.
    pub fn adopt_swapchain(&mut self, info: SwapchainInfo) {
        self.lifecycle.adopt(info);
    }

    pub fn resize_flag(&self) -> ResizeFlag {
        self.resize.clone()
    }

    pub fn current_slot(&self) -> FrameSlot {
        self.slot
    }

    pub fn slot_states(&self) -> [SlotState; FRAMES_IN_FLIGHT] {
        self.states
    }

    pub fn counter_value(&self) -> u64 {
        self.counter.value()
    }

    pub fn last_timeline(&self) -> Option<FrameTimeline> {
        self.last_timeline
    }

    /// Frames whose compute and graphics work reached the queue.
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    pub fn lifecycle(&self) -> &SwapchainLifecycle {
        &self.lifecycle
    }

    pub fn draw_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        params: &SimParams,
    ) -> Result<FrameOutcome> {
        if self.rebuild_pending && !self.rebuild(backend)? {
            return Ok(FrameOutcome::Deferred);
        }

        let slot = self.slot;
        let (image_index, acquire_suboptimal) = match acquire(backend, slot)? {
            AcquireOutcome::Image { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("acquire reported out-of-date; dropping frame");
                // this rebuild already picks up any pending resize
                self.resize.take();
                self.rebuild(backend)?;
                return Ok(FrameOutcome::Dropped(DropReason::StaleOnAcquire));
            }
        };

        self.states[slot.index] = SlotState::WaitPrevious;
        backend.wait_slot_fence(slot)?;
        backend.reset_slot_fence(slot)?;

        let timeline = self.counter.advance();
        self.last_timeline = Some(timeline);

        backend.write_uniforms(slot, params)?;

        backend.submit_compute(slot, &timeline)?;
        self.states[slot.index] = SlotState::ComputeSubmitted;

        let semaphore_handoff = self.present_sync == PresentSync::RenderFinishedSemaphore;
        backend.submit_graphics(slot, image_index, &timeline, semaphore_handoff)?;
        self.states[slot.index] = SlotState::GraphicsSubmitted;
        self.frames_submitted += 1;

        if !semaphore_handoff {
            backend.wait_timeline(timeline.graphics_signal)?;
        }
        self.states[slot.index] = SlotState::Presenting;
        let status = present(backend, image_index, semaphore_handoff)?;
        self.states[slot.index] = SlotState::Idle;
        self.slot = slot.next();

        let resized = self.resize.take();
        let stale = status != PresentStatus::Presented || acquire_suboptimal;
        let mut rebuilt = false;
        if stale || resized {
            debug!("rebuilding swapchain after present (status {status:?}, resized {resized})");
            rebuilt = self.rebuild(backend)?;
        }

        if status == PresentStatus::OutOfDate {
            return Ok(FrameOutcome::Dropped(DropReason::StaleOnPresent));
        }
        self.frames_presented += 1;
        Ok(FrameOutcome::Presented { image_index, rebuilt })
    }

    /// Returns `false` when the rebuild was deferred and is still pending.
    fn rebuild<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<bool> {
        match self.lifecycle.rebuild(backend)? {
            RebuildOutcome::Rebuilt(_) => {
                self.rebuild_pending = false;
                Ok(true)
            }
            RebuildOutcome::Deferred => {
                if !self.rebuild_pending {
                    warn!("surface has zero extent; pausing frames until it is restored");
                }
                self.rebuild_pending = true;
                Ok(false)
            }
        }
    }
}

fn acquire<B: FrameBackend + ?Sized>(backend: &mut B, slot: FrameSlot) -> Result<AcquireOutcome> {
    match backend.acquire_image(slot) {
        Err(e) if e.is_recoverable() => Ok(AcquireOutcome::OutOfDate),
        other => other,
    }
}

fn present<B: FrameBackend + ?Sized>(
    backend: &mut B,
    image_index: u32,
    wait_render_finished: bool,
) -> Result<PresentStatus> {
    match backend.present(image_index, wait_render_finished) {
        Err(e) if e.is_recoverable() => Ok(PresentStatus::OutOfDate),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_flag_is_consumed_once() {
        let flag = ResizeFlag::new();
        let window_side = flag.clone();
        assert!(!flag.take());
        window_side.set();
        assert!(flag.is_set());
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn fresh_scheduler_is_idle_at_slot_zero() {
        let s = FrameScheduler::new(&RendererConfig::default(), ResizeFlag::new());
        assert_eq!(s.current_slot(), FrameSlot::new(0));
        assert_eq!(s.slot_states(), [SlotState::Idle; FRAMES_IN_FLIGHT]);
        assert_eq!(s.counter_value(), 0);
        assert!(!s.rebuild_pending());
    }
}

// SPDX-License-Identifier: CEPL-1.0
//! In-memory `FrameBackend` that records every call and keeps allocation and
//! in-flight bookkeeping, so scheduler invariants can be checked without a GPU.
#![allow(dead_code)]

use std::collections::VecDeque;

use pulsar_core::{Error, Result};
use pulsar_render::{
    AcquireOutcome, FrameBackend, FrameSlot, FrameTimeline, PresentStatus, RenderSize, SimParams,
    SwapchainHost, SwapchainInfo, FRAMES_IN_FLIGHT,
};

pub const FORMAT_BGRA8_SRGB: i32 = 50;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    Acquire(usize),
    WaitFence(usize),
    ResetFence(usize),
    WriteUniforms(usize, f32),
    Compute(usize, FrameTimeline),
    Graphics {
        slot: usize,
        image: u32,
        timeline: FrameTimeline,
        render_finished: bool,
    },
    WaitTimeline(u64),
    Present(u32, bool),
    QueryExtent,
    WaitSurface,
    DeviceIdle,
    Destroy,
    Create(RenderSize),
    /// Creation found the surface minimized again.
    CreateStale,
}

#[derive(Clone, Copy, Debug)]
pub enum AcquireScript {
    OutOfDate,
    Suboptimal,
    Fail,
    SurfaceLost,
}

#[derive(Clone, Copy, Debug)]
pub enum PresentScript {
    Status(PresentStatus),
    Fail,
}

pub struct MockBackend {
    pub events: Vec<Event>,
    pub extents: VecDeque<RenderSize>,
    pub surface: RenderSize,
    pub acquire_script: VecDeque<AcquireScript>,
    pub present_script: VecDeque<PresentScript>,
    pub fail_compute_on_frame: Option<u64>,
    pub image_count: u32,
    /// Upcoming creations that see a zero extent although polling did not.
    pub minimized_at_create: u32,

    /// Swapchain-derived objects currently alive.
    pub live_allocations: i64,
    pub total_allocations: u64,
    pub swapchain_alive: bool,

    /// Slots whose graphics work has not been observed complete.
    in_flight: [bool; FRAMES_IN_FLIGHT],
    pending: Vec<(usize, u64)>,
    pub max_in_flight: usize,
    completed_value: u64,
    highest_signal: u64,
    next_image: u32,
    computes: u64,
}

impl MockBackend {
    pub fn new(surface: RenderSize) -> Self {
        Self {
            events: Vec::new(),
            extents: VecDeque::new(),
            surface,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_compute_on_frame: None,
            image_count: 3,
            minimized_at_create: 0,
            live_allocations: 0,
            total_allocations: 0,
            swapchain_alive: false,
            in_flight: [false; FRAMES_IN_FLIGHT],
            pending: Vec::new(),
            max_in_flight: 0,
            completed_value: 0,
            highest_signal: 0,
            next_image: 0,
            computes: 0,
        }
    }

    /// Backend with its startup swapchain already created.
    pub fn started(surface: RenderSize) -> (Self, SwapchainInfo) {
        let mut b = Self::new(surface);
        let info = b
            .create_swapchain_resources(surface)
            .expect("initial swapchain");
        b.events.clear();
        (b, info)
    }

    pub fn computes(&self) -> Vec<(usize, FrameTimeline)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                Event::Compute(slot, t) => Some((slot, t)),
                _ => None,
            })
            .collect()
    }

    pub fn graphics(&self) -> Vec<(usize, FrameTimeline)> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                Event::Graphics { slot, timeline, .. } => Some((slot, timeline)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    fn retire_up_to(&mut self, value: u64) {
        self.completed_value = self.completed_value.max(value);
        let done = self.completed_value;
        for &(slot, signal) in &self.pending {
            if signal <= done {
                self.in_flight[slot] = false;
            }
        }
        self.pending.retain(|&(_, signal)| signal > done);
    }

    fn per_image_objects(&self) -> i64 {
        // image view + render-finished semaphore per image, plus depth image
        // and its view, plus the swapchain itself
        self.image_count as i64 * 2 + 2 + 1
    }
}

impl SwapchainHost for MockBackend {
    fn surface_extent(&mut self) -> Result<RenderSize> {
        self.events.push(Event::QueryExtent);
        Ok(self.extents.pop_front().unwrap_or(self.surface))
    }

    fn wait_for_surface_events(&mut self) {
        self.events.push(Event::WaitSurface);
    }

    fn wait_device_idle(&mut self) -> Result<()> {
        self.events.push(Event::DeviceIdle);
        let top = self.highest_signal;
        self.retire_up_to(top);
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        assert!(
            self.in_flight.iter().all(|f| !f),
            "swapchain destroyed while GPU work is in flight"
        );
        self.events.push(Event::Destroy);
        if self.swapchain_alive {
            self.live_allocations -= self.per_image_objects();
            self.swapchain_alive = false;
        }
    }

    fn create_swapchain_resources(&mut self, extent: RenderSize) -> Result<SwapchainInfo> {
        assert!(!extent.is_zero(), "zero-sized swapchain requested");
        assert!(!self.swapchain_alive, "swapchain created over a live one");
        if self.minimized_at_create > 0 {
            self.minimized_at_create -= 1;
            self.events.push(Event::CreateStale);
            return Err(Error::SurfaceStale("surface extent is zero at creation".into()));
        }
        self.events.push(Event::Create(extent));
        let n = self.per_image_objects();
        self.live_allocations += n;
        self.total_allocations += n as u64;
        self.swapchain_alive = true;
        self.next_image = 0;
        Ok(SwapchainInfo {
            extent,
            format: FORMAT_BGRA8_SRGB,
            image_count: self.image_count,
            samples: 1,
        })
    }
}

impl FrameBackend for MockBackend {
    fn acquire_image(&mut self, slot: FrameSlot) -> Result<AcquireOutcome> {
        assert!(self.swapchain_alive, "acquire without a swapchain");
        self.events.push(Event::Acquire(slot.index));
        let index = self.next_image;
        match self.acquire_script.pop_front() {
            Some(AcquireScript::OutOfDate) => return Ok(AcquireOutcome::OutOfDate),
            Some(AcquireScript::Fail) => {
                return Err(Error::Presentation("acquire: ERROR_DEVICE_LOST".into()))
            }
            Some(AcquireScript::SurfaceLost) => {
                return Err(Error::submission("acquire", "ERROR_SURFACE_LOST_KHR"))
            }
            Some(AcquireScript::Suboptimal) => {
                self.next_image = (index + 1) % self.image_count;
                return Ok(AcquireOutcome::Image {
                    index,
                    suboptimal: true,
                });
            }
            None => {}
        }
        self.next_image = (index + 1) % self.image_count;
        Ok(AcquireOutcome::Image {
            index,
            suboptimal: false,
        })
    }

    fn wait_slot_fence(&mut self, slot: FrameSlot) -> Result<()> {
        self.events.push(Event::WaitFence(slot.index));
        let signal = self
            .pending
            .iter()
            .filter(|(s, _)| *s == slot.index)
            .map(|&(_, v)| v)
            .max();
        if let Some(v) = signal {
            self.retire_up_to(v);
        }
        Ok(())
    }

    fn reset_slot_fence(&mut self, slot: FrameSlot) -> Result<()> {
        assert!(!self.in_flight[slot.index], "fence reset while slot is busy");
        self.events.push(Event::ResetFence(slot.index));
        Ok(())
    }

    fn write_uniforms(&mut self, slot: FrameSlot, params: &SimParams) -> Result<()> {
        assert!(!self.in_flight[slot.index], "uniforms written while GPU reads them");
        self.events.push(Event::WriteUniforms(slot.index, params.delta_time));
        Ok(())
    }

    fn submit_compute(&mut self, slot: FrameSlot, timeline: &FrameTimeline) -> Result<()> {
        self.computes += 1;
        if self.fail_compute_on_frame == Some(self.computes) {
            return Err(Error::submission("compute", "ERROR_DEVICE_LOST"));
        }
        assert!(
            timeline.compute_wait <= self.highest_signal,
            "compute waits on a value nobody will signal"
        );
        self.events.push(Event::Compute(slot.index, *timeline));
        self.highest_signal = self.highest_signal.max(timeline.compute_signal);
        Ok(())
    }

    fn submit_graphics(
        &mut self,
        slot: FrameSlot,
        image_index: u32,
        timeline: &FrameTimeline,
        signal_render_finished: bool,
    ) -> Result<()> {
        assert!(!self.in_flight[slot.index], "slot reused before its fence");
        self.events.push(Event::Graphics {
            slot: slot.index,
            image: image_index,
            timeline: *timeline,
            render_finished: signal_render_finished,
        });
        self.highest_signal = self.highest_signal.max(timeline.graphics_signal);
        self.in_flight[slot.index] = true;
        self.pending.push((slot.index, timeline.graphics_signal));
        let busy = self.in_flight.iter().filter(|f| **f).count();
        self.max_in_flight = self.max_in_flight.max(busy);
        Ok(())
    }

    fn wait_timeline(&mut self, value: u64) -> Result<()> {
        assert!(value <= self.highest_signal, "host wait would never return");
        self.events.push(Event::WaitTimeline(value));
        self.retire_up_to(value);
        Ok(())
    }

    fn present(&mut self, image_index: u32, wait_render_finished: bool) -> Result<PresentStatus> {
        self.events.push(Event::Present(image_index, wait_render_finished));
        match self.present_script.pop_front() {
            Some(PresentScript::Status(s)) => Ok(s),
            Some(PresentScript::Fail) => Err(Error::Presentation("ERROR_SURFACE_LOST_KHR".into())),
            None => Ok(PresentStatus::Presented),
        }
    }
}

pub fn params() -> SimParams {
    SimParams::new(16.0, 2.0, 8192)
}

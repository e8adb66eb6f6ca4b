// SPDX-License-Identifier: CEPL-1.0
//! The single monotonically increasing counter that orders compute before
//! graphics within a frame, and frame *k* before frame *k+1*.

/// Wait/signal values for one frame's two submissions.
///
/// `graphics_wait == compute_signal` always holds; that equality is what
/// keeps graphics behind compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTimeline {
    pub compute_wait: u64,
    pub compute_signal: u64,
    pub graphics_wait: u64,
    pub graphics_signal: u64,
}

#[derive(Debug, Default, Clone)]
pub struct DependencyCounter {
    value: u64,
}

impl DependencyCounter {
    pub const STEP: u64 = 2;

    pub fn new() -> Self {
        Self { value: 0 }
    }

    /// Last value handed out; matches the timeline semaphore's initial value
    /// before the first frame.
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn advance(&mut self) -> FrameTimeline {
        let compute_wait = self.value;
        let compute_signal = compute_wait + 1;
        let graphics_signal = compute_wait + Self::STEP;
        self.value = graphics_signal;
        FrameTimeline {
            compute_wait,
            compute_signal,
            graphics_wait: compute_signal,
            graphics_signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_waits_on_initial_value() {
        let mut c = DependencyCounter::new();
        let t = c.advance();
        assert_eq!(
            t,
            FrameTimeline {
                compute_wait: 0,
                compute_signal: 1,
                graphics_wait: 1,
                graphics_signal: 2,
            }
        );
        assert_eq!(c.value(), 2);
    }

    #[test]
    fn values_strictly_increase_and_chain() {
        let mut c = DependencyCounter::new();
        let mut prev = c.advance();
        for _ in 0..64 {
            let t = c.advance();
            assert_eq!(t.graphics_wait, t.compute_signal);
            assert_eq!(t.compute_wait, prev.graphics_signal);
            assert!(t.compute_signal > prev.graphics_signal);
            assert!(t.graphics_signal > t.compute_signal);
            prev = t;
        }
    }
}

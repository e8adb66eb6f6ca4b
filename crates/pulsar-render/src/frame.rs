// SPDX-License-Identifier: CEPL-1.0
/// Frame slots that may have outstanding GPU work at the same time.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Where a slot is in the per-frame sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Idle,
    WaitPrevious,
    ComputeSubmitted,
    GraphicsSubmitted,
    Presenting,
}

/// One frame slot and the simulation buffers it touches.
///
/// The compute pass of slot `i` reads the buffer written by slot `i-1` and
/// writes buffer `i`; the graphics pass draws buffer `i`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    pub index: usize,
}

impl FrameSlot {
    pub fn new(index: usize) -> Self {
        debug_assert!(index < FRAMES_IN_FLIGHT);
        Self { index }
    }

    pub fn read_buffer(&self) -> usize {
        (self.index + FRAMES_IN_FLIGHT - 1) % FRAMES_IN_FLIGHT
    }

    pub fn write_buffer(&self) -> usize {
        self.index
    }

    pub fn next(&self) -> Self {
        Self::new((self.index + 1) % FRAMES_IN_FLIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_never_equals_write() {
        for i in 0..FRAMES_IN_FLIGHT {
            let s = FrameSlot::new(i);
            assert_ne!(s.read_buffer(), s.write_buffer());
        }
    }

    #[test]
    fn read_follows_previous_write() {
        let mut slot = FrameSlot::new(0);
        for _ in 0..10 {
            let next = slot.next();
            assert_eq!(next.read_buffer(), slot.write_buffer());
            slot = next;
        }
    }
}

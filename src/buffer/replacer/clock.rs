//! CLOCK (second-chance) replacement policy.

use crate::common::FrameId;

use super::Replacer;

/// Second-chance approximation of LRU.
///
/// Candidate frames sit on a fixed ring indexed by frame id. Each entry
/// carries a reference bit, set when the frame joins the eviction set. The
/// sweeping hand clears reference bits and takes the first frame found with
/// its bit already clear.
pub struct ClockReplacer {
    /// Slot is in the eviction set.
    present: Vec<bool>,
    /// Second-chance bit per slot.
    referenced: Vec<bool>,
    hand: usize,
    len: usize,
}

impl ClockReplacer {
    /// Create a CLOCK replacer covering `num_frames` frame slots.
    pub fn new(num_frames: usize) -> Self {
        assert!(num_frames > 0, "replacer needs at least one frame slot");
        Self {
            present: vec![false; num_frames],
            referenced: vec![false; num_frames],
            hand: 0,
            len: 0,
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        if self.len == 0 {
            return None;
        }
        // len > 0 guarantees termination: the first sweep clears reference
        // bits, the second takes a frame.
        loop {
            let slot = self.hand;
            self.hand = (self.hand + 1) % self.present.len();

            if !self.present[slot] {
                continue;
            }
            if self.referenced[slot] {
                self.referenced[slot] = false;
            } else {
                self.present[slot] = false;
                self.len -= 1;
                return Some(FrameId::new(slot));
            }
        }
    }

    fn pin(&mut self, frame_id: FrameId) {
        if self.present[frame_id.0] {
            self.present[frame_id.0] = false;
            self.len -= 1;
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if !self.present[frame_id.0] {
            self.present[frame_id.0] = true;
            self.referenced[frame_id.0] = true;
            self.len += 1;
        }
    }

    fn size(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_sweeps_in_slot_order() {
        let mut replacer = ClockReplacer::new(4);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        // All reference bits are set; the hand clears 0..2, wraps, and takes
        // slot 0 first.
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_second_chance() {
        let mut replacer = ClockReplacer::new(3);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));

        // First victim costs a full sweep clearing bits; slot 0 goes first.
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));

        // Re-adding slot 0 sets its bit again, so slot 1 (bit already
        // cleared) is taken before it.
        replacer.unpin(FrameId::new(0));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_clock_pin_removes_candidate() {
        let mut replacer = ClockReplacer::new(3);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.pin(FrameId::new(0));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_unpin_idempotent() {
        let mut replacer = ClockReplacer::new(2);

        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(1));
        assert_eq!(replacer.size(), 1);
    }
}

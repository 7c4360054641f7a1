//! Eviction policies.
//!
//! The pool consults a [`Replacer`] to pick which unpinned frame to reuse
//! when it runs out of free frames. Policies are interchangeable behind the
//! trait; [`LruReplacer`] is the default, [`ClockReplacer`] an alternative.

mod clock;
mod lru;

pub use clock::ClockReplacer;
pub use lru::LruReplacer;

use crate::common::FrameId;

/// The eviction-policy capability the pool relies on.
///
/// A replacer tracks the set of frames currently eligible for eviction. The
/// pool keeps that set in lockstep with pin counts: a frame enters on the
/// unpin that drops its pin count to zero and leaves whenever it is pinned,
/// victimized, or freed. The pool serializes all calls behind its own mutex,
/// so implementations are plain mutable state.
pub trait Replacer: Send {
    /// Pick a frame to evict and remove it from the eviction set.
    /// Returns None iff the set is empty.
    fn victim(&mut self) -> Option<FrameId>;

    /// Remove the frame from the eviction set if present. Idempotent.
    fn pin(&mut self, frame_id: FrameId);

    /// Add the frame to the eviction set, iff not already present.
    /// A frame that is already present keeps its position. Idempotent.
    fn unpin(&mut self, frame_id: FrameId);

    /// Number of frames currently eligible for eviction.
    fn size(&self) -> usize;
}

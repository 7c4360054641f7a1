//! Error types for framepool.

use thiserror::Error;

/// Convenient Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the buffer pool and its disk managers.
///
/// Expected outcomes of pool operations (a page that is not resident, a
/// delete refused because of outstanding pins, an unbalanced unpin) are
/// reported as `bool`/`Option` return values, not as errors. Only conditions
/// the caller cannot recover from locally end up here.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the backing store. Fatal at this layer; retry and
    /// partial-failure semantics belong to the disk manager.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Every frame is pinned; no page can be brought in or created.
    #[error("no free frames available in buffer pool")]
    NoFreeFrames,

    /// The invalid sentinel page id was passed to an operation that needs a
    /// real page.
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),
}

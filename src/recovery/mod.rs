//! Write-ahead logging.
//!
//! Only the [`LogManager`] hook lives here so far; the buffer pool holds one
//! but does not drive it yet.

mod log_manager;

pub use log_manager::LogManager;

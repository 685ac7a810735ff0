//! Shared utility functions.
//!
//! - `format`: Human-readable byte sizes
//! - `duration`: Duration strings like "30s" or "1h15m"

mod duration;
mod format;

pub use duration::parse_duration;
pub use format::pretty_size;

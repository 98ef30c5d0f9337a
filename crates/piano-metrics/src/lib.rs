pub mod aggregator;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod format;
pub mod metrics;
pub mod registry;
pub mod sampler;
pub mod session;

pub use error::{Error, Result};

/// Pauses shorter than this (seconds) do not split a playing interval
pub const DEFAULT_MAX_SHORT_PAUSE_SECS: f64 = 5.0;

/// Width of the recent-notes sliding window (seconds)
pub const DEFAULT_RECENT_NOTES_WINDOW_SECS: f64 = 1.0;

/// Stats fields polled into the sampler by default
pub const DEFAULT_SAMPLE_FIELDS: [&str; 2] = ["notes_playing", "recent_notes"];

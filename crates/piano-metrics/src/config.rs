/// Static configuration of the metrics engine and the sampler.
///
/// All fields have serde defaults so an empty (or missing) TOML section
/// yields the stock setup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sampler::Granularity;
use crate::{DEFAULT_MAX_SHORT_PAUSE_SECS, DEFAULT_RECENT_NOTES_WINDOW_SECS, DEFAULT_SAMPLE_FIELDS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    /// Registry keys shown during the session, in display order
    #[serde(default = "default_live")]
    pub live: Vec<String>,
    /// Registry keys reported at session end
    #[serde(default = "default_final", rename = "final")]
    pub final_metrics: Vec<String>,
    #[serde(default = "default_max_short_pause")]
    pub max_short_pause_secs: f64,
    #[serde(default = "default_recent_notes_window")]
    pub recent_notes_window_secs: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            live: default_live(),
            final_metrics: default_final(),
            max_short_pause_secs: default_max_short_pause(),
            recent_notes_window_secs: default_recent_notes_window(),
        }
    }
}

impl MetricsConfig {
    pub fn max_short_pause(&self) -> Duration {
        secs_or(self.max_short_pause_secs, DEFAULT_MAX_SHORT_PAUSE_SECS)
    }

    pub fn recent_notes_window(&self) -> Duration {
        secs_or(self.recent_notes_window_secs, DEFAULT_RECENT_NOTES_WINDOW_SECS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplerConfig {
    /// Numeric stats fields summed into the intensity
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Fixed bucket width; auto-selected from `thresholds` when unset
    #[serde(default)]
    pub granularity: Option<Granularity>,
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<GranularityThreshold>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            interval_ms: default_interval_ms(),
            granularity: None,
            thresholds: default_thresholds(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Sessions lasting at most `up_to_secs` are bucketed by `granularity`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GranularityThreshold {
    pub up_to_secs: u64,
    pub granularity: Granularity,
}

fn secs_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

// Default value functions
fn default_live() -> Vec<String> {
    [
        "total_duration",
        "playing_duration",
        "message_count",
        "note_count",
        "notes_per_minute",
        "notes_per_playing_minute",
        "notes_playing",
        "recent_notes",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_final() -> Vec<String> {
    let mut names = default_live();
    names.push("note_count_per_pitch".to_string());
    names
}
fn default_max_short_pause() -> f64 { DEFAULT_MAX_SHORT_PAUSE_SECS }
fn default_recent_notes_window() -> f64 { DEFAULT_RECENT_NOTES_WINDOW_SECS }
fn default_fields() -> Vec<String> { DEFAULT_SAMPLE_FIELDS.iter().map(|s| s.to_string()).collect() }
fn default_interval_ms() -> u64 { 250 }
fn default_thresholds() -> Vec<GranularityThreshold> {
    vec![
        GranularityThreshold { up_to_secs: 300, granularity: Granularity::Second },
        GranularityThreshold { up_to_secs: 3_000, granularity: Granularity::TenSeconds },
        GranularityThreshold { up_to_secs: 18_000, granularity: Granularity::Minute },
        GranularityThreshold { up_to_secs: 180_000, granularity: Granularity::TenMinutes },
    ]
}

mod demo;
mod display;
mod midi_input;
mod report;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use piano_metrics::aggregator::Aggregator;
use piano_metrics::clock::{Clock, SystemClock};
use piano_metrics::config::{MetricsConfig, SamplerConfig};
use piano_metrics::sampler::{Granularity, TimeBucketedSampler};
use piano_metrics::session;

use crate::report::SessionReport;

#[derive(Parser, Debug)]
#[command(name = "piano-tracker", about = "Practice session statistics for MIDI keyboards")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tracker.toml")]
    config: PathBuf,

    /// Play a synthetic performance instead of reading the MIDI device
    #[arg(long)]
    demo: bool,

    /// Session report path (overrides [export] path)
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Intensity bucket width: second, ten_seconds, minute, ten_minutes or hour
    #[arg(short, long)]
    granularity: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub export: ExportSection,
    #[serde(default)]
    pub demo: DemoSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputSection {
    /// ALSA rawmidi device, e.g. "hw:1,0,0"
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            device: default_device(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySection {
    #[serde(default = "default_display_interval")]
    pub interval_secs: u64,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            interval_secs: default_display_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSection {
    #[serde(default = "default_export_path")]
    pub path: PathBuf,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            path: default_export_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoSection {
    /// Length of the synthetic performance (0 = until Ctrl-C)
    #[serde(default = "default_demo_duration")]
    pub duration_secs: u64,
}

impl Default for DemoSection {
    fn default() -> Self {
        Self {
            duration_secs: default_demo_duration(),
        }
    }
}

// Default value functions
fn default_device() -> String { "hw:1,0,0".to_string() }
fn default_display_interval() -> u64 { 3 }
fn default_export_path() -> PathBuf { PathBuf::from("session.json") }
fn default_demo_duration() -> u64 { 60 }

async fn load_config(path: &Path) -> anyhow::Result<TrackerConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No config file found, using defaults");
        return Ok(TrackerConfig::default());
    }

    let config_str = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: TrackerConfig = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    info!(path = %path.display(), "Loaded configuration from disk");
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config).await?;
    if let Some(key) = &args.granularity {
        let granularity: Granularity = key.parse().context("Invalid --granularity")?;
        config.sampler.granularity = Some(granularity);
    }
    let export_path = args.export.clone().unwrap_or_else(|| config.export.path.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let aggregator = Arc::new(
        Aggregator::with_standard_metrics(&config.metrics, Arc::clone(&clock))
            .context("Failed to build metrics")?,
    );
    let sampler = Arc::new(TimeBucketedSampler::new(&config.sampler, clock));

    info!(
        live = ?config.metrics.live,
        sample_fields = ?config.sampler.fields,
        granularity = ?config.sampler.granularity,
        demo = args.demo,
        "Piano tracker starting"
    );

    let cancel = CancellationToken::new();
    let (handoff_tx, handoff_rx) = oneshot::channel();

    // Spawn event source
    let input_handle = if args.demo {
        let aggregator = Arc::clone(&aggregator);
        let demo_config = config.demo.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = demo::run(aggregator, demo_config, cancel.clone()).await {
                error!("Demo performance error: {:#}", e);
            }
            cancel.cancel();
        })
    } else {
        let aggregator = Arc::clone(&aggregator);
        let device = config.input.device.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = midi_input::platform::run_midi_reader(&device, aggregator, cancel.clone()).await {
                error!("MIDI reader error: {:#}", e);
                cancel.cancel();
            }
        })
    };

    // Spawn live display
    let display_handle = {
        let aggregator = Arc::clone(&aggregator);
        let interval = Duration::from_secs(config.display.interval_secs.max(1));
        let cancel = cancel.clone();
        tokio::spawn(async move {
            display::run(aggregator, interval, cancel).await;
        })
    };

    // Spawn sampler
    let sampler_handle = tokio::spawn(session::run_sampler(
        Arc::clone(&aggregator),
        Arc::clone(&sampler),
        config.sampler.interval(),
        config.sampler.granularity,
        cancel.clone(),
        handoff_tx,
    ));

    info!("Session running, press Ctrl-C to finish");

    // Wait for shutdown signal or the event source ending the session
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Finishing session...");
        }
        _ = cancel.cancelled() => {
            info!("Event source finished, closing session");
        }
    }
    cancel.cancel();

    let series = handoff_rx
        .await
        .context("Sampler stopped without delivering the intensity series")?;
    if let Err(e) = sampler_handle.await {
        error!("Sampler task failed: {}", e);
    }

    let final_stats = aggregator.final_stats();
    display::print_summary(&final_stats, &series);

    let report = SessionReport::new(final_stats, series);
    report::write(&export_path, &report)?;

    // The blocking reader may be parked in a device read; don't wait for it
    input_handle.abort();
    display_handle.abort();

    Ok(())
}

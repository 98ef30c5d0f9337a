/// JSON session report written when the tracker exits.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use piano_metrics::metrics::Stats;
use piano_metrics::sampler::IntensitySeries;

/// `{"stats": {...}, "intensity": [...]}`
#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub stats: Stats,
    #[serde(flatten)]
    pub series: IntensitySeries,
}

impl SessionReport {
    pub fn new(stats: Stats, series: IntensitySeries) -> Self {
        Self { stats, series }
    }
}

pub fn write(path: &Path, report: &SessionReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize session report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write session report to {}", path.display()))?;

    info!(path = %path.display(), buckets = report.series.len(), "Session report saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use piano_metrics::metrics::StatValue;

    #[test]
    fn test_report_layout() {
        let mut stats = Stats::new();
        stats.insert("notes".into(), StatValue::Count(4));
        stats.insert("duration".into(), StatValue::Text("00:12".into()));
        let report = SessionReport::new(stats, IntensitySeries::from_buckets(vec![1.0, 2.5]));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["notes"], 4);
        assert_eq!(json["stats"]["duration"], "00:12");
        assert_eq!(json["intensity"], serde_json::json!([1.0, 2.5]));
    }

    #[test]
    fn test_write_creates_file() {
        let path = std::env::temp_dir().join(format!("piano-tracker-report-{}.json", std::process::id()));
        let report = SessionReport::new(Stats::new(), IntensitySeries::from_buckets(Vec::new()));

        write(&path, &report).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(written["intensity"], serde_json::json!([0.0]));
        assert!(written["stats"].as_object().unwrap().is_empty());
    }
}

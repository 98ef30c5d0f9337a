/// Console output: a periodic live status line and the end-of-session
/// summary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use piano_metrics::aggregator::Aggregator;
use piano_metrics::metrics::{StatValue, Stats};
use piano_metrics::sampler::IntensitySeries;

/// Print the live stats every `interval` until cancelled.
pub async fn run(aggregator: Arc<Aggregator>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; skip the all-zero line
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let stats = aggregator.stats();
                println!("{}", status_line(aggregator.live_names(), &stats));
            }
        }
    }
    debug!("Live display stopped");
}

/// `name=value` pairs in the configured order.
pub fn status_line(names: &[&str], stats: &Stats) -> String {
    names
        .iter()
        .filter_map(|name| stats.get(*name).map(|value| format!("{}={}", name, value)))
        .collect::<Vec<_>>()
        .join("  ")
}

fn describe_keys(keys: &BTreeMap<u8, u64>) -> String {
    match keys.iter().max_by_key(|(key, count)| (**count, std::cmp::Reverse(**key))) {
        Some((key, count)) => format!(
            "{} distinct, most played {} ({}x)",
            keys.len(),
            key,
            count
        ),
        None => "none".to_string(),
    }
}

pub fn print_summary(stats: &Stats, series: &IntensitySeries) {
    println!();
    println!("Session summary");
    println!("══════════════════════════════");
    for (name, value) in stats {
        match value {
            StatValue::Histogram(keys) => println!("  {:<16} {}", name, describe_keys(keys)),
            other => println!("  {:<16} {}", name, other),
        }
    }

    let peak = series.values().iter().copied().fold(0.0_f64, f64::max);
    println!("  {:<16} {} buckets, peak {:.2}", "intensity", series.len(), peak);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_follows_name_order() {
        let mut stats = Stats::new();
        stats.insert("notes".into(), StatValue::Count(12));
        stats.insert("duration".into(), StatValue::Text("01:05".into()));

        let line = status_line(&["duration", "notes", "missing"], &stats);
        assert_eq!(line, "duration=01:05  notes=12");
    }

    #[test]
    fn test_describe_keys_prefers_lowest_key_on_tie() {
        let keys = BTreeMap::from([(64, 3), (60, 3), (72, 1)]);
        assert_eq!(describe_keys(&keys), "3 distinct, most played 60 (3x)");
        assert_eq!(describe_keys(&BTreeMap::new()), "none");
    }
}

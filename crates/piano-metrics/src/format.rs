/// Display formatting shared by the metrics.

/// Seconds rendered as `MM:SS`. Minutes keep counting past 59.
pub fn format_duration(secs: f64) -> String {
    let whole = if secs.is_finite() && secs > 0.0 { secs as u64 } else { 0 };
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

/// Float rendered with two decimals.
pub fn format_float(value: f64) -> String {
    format!("{:.2}", value)
}

/// Time-bucketed sampling store.
///
/// Architecture:
///   - `push()` appends the selected numeric stats fields, stamped with
///     the clock, to an in-memory row store
///   - `results()` groups rows into fixed-width time buckets, averages
///     each field per bucket and sums the averages into one intensity
///     value per bucket
///   - the bucket width is picked from the session length unless fixed,
///     so long sessions still yield a series of bounded length
///   - leading and trailing silence is trimmed from the series

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::config::{GranularityThreshold, SamplerConfig};
use crate::error::{Error, Result};
use crate::metrics::Stats;

/// Bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    Second,
    TenSeconds,
    Minute,
    TenMinutes,
    Hour,
}

impl Granularity {
    pub const ALL: [Granularity; 5] = [
        Granularity::Second,
        Granularity::TenSeconds,
        Granularity::Minute,
        Granularity::TenMinutes,
        Granularity::Hour,
    ];

    pub fn width(self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::TenSeconds => Duration::from_secs(10),
            Self::Minute => Duration::from_secs(60),
            Self::TenMinutes => Duration::from_secs(600),
            Self::Hour => Duration::from_secs(3600),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::TenSeconds => "ten_seconds",
            Self::Minute => "minute",
            Self::TenMinutes => "ten_minutes",
            Self::Hour => "hour",
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| Error::InvalidGranularity(s.to_string()))
    }
}

impl TryFrom<String> for Granularity {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Granularity> for String {
    fn from(g: Granularity) -> Self {
        g.as_str().to_string()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polled sample: field values in configured order.
#[derive(Debug, Clone)]
pub struct SampleRow {
    pub at: Instant,
    pub values: Vec<f64>,
}

/// Per-bucket intensity, silence trimmed from both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensitySeries {
    pub intensity: Vec<f64>,
}

impl IntensitySeries {
    /// Trim raw bucket values into a series. An empty input becomes a
    /// single zero.
    pub fn from_buckets(mut buckets: Vec<f64>) -> Self {
        if buckets.is_empty() {
            buckets.push(0.0);
        }
        trim_silence(&mut buckets);
        Self { intensity: buckets }
    }

    pub fn values(&self) -> &[f64] {
        &self.intensity
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }
}

/// Drop a leading run of two or more exact zeros, then a trailing one.
/// Never trims below two elements; a lone zero at either end stays.
pub fn trim_silence(series: &mut Vec<f64>) {
    let leading = series.iter().take_while(|v| **v == 0.0).count();
    if leading >= 2 {
        let cut = leading.min(series.len().saturating_sub(2));
        series.drain(..cut);
    }

    let trailing = series.iter().rev().take_while(|v| **v == 0.0).count();
    if trailing >= 2 {
        let cut = trailing.min(series.len().saturating_sub(2));
        series.truncate(series.len() - cut);
    }
}

pub struct TimeBucketedSampler {
    clock: Arc<dyn Clock>,
    fields: Vec<String>,
    /// Ascending by `up_to_secs`
    thresholds: Vec<GranularityThreshold>,
    rows: Mutex<Vec<SampleRow>>,
}

impl TimeBucketedSampler {
    pub fn new(config: &SamplerConfig, clock: Arc<dyn Clock>) -> Self {
        let mut thresholds = config.thresholds.clone();
        thresholds.sort_by_key(|t| t.up_to_secs);

        Self {
            clock,
            fields: config.fields.clone(),
            thresholds,
            rows: Mutex::new(Vec::new()),
        }
    }

    fn rows(&self) -> MutexGuard<'_, Vec<SampleRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append the configured fields of a stats snapshot.
    pub fn push(&self, stats: &Stats) -> Result<()> {
        let values = self
            .fields
            .iter()
            .map(|field| {
                stats
                    .get(field)
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| Error::SampleField(field.clone()))
            })
            .collect::<Result<Vec<f64>>>()?;

        let mut rows = self.rows();
        let at = self.clock.now();
        rows.push(SampleRow { at, values });
        Ok(())
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Bucket width for a session that lasted `elapsed`.
    pub fn select_granularity(&self, elapsed: Duration) -> Granularity {
        let secs = elapsed.as_secs_f64();
        self.thresholds
            .iter()
            .find(|t| secs <= t.up_to_secs as f64)
            .map(|t| t.granularity)
            .unwrap_or(Granularity::Hour)
    }

    /// Intensity series, bucketed by `granularity` or by the auto-selected
    /// width when `None`.
    pub fn results(&self, granularity: Option<Granularity>) -> IntensitySeries {
        let rows = self.rows();

        let (first, last) = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => (first.at, last.at),
            _ => return IntensitySeries::from_buckets(Vec::new()),
        };

        let granularity = granularity
            .unwrap_or_else(|| self.select_granularity(last.saturating_duration_since(first)));
        let buckets = bucket_intensity(&rows, first, granularity.width());

        debug!(
            rows = rows.len(),
            buckets = buckets.len(),
            granularity = %granularity,
            "sampler aggregated"
        );

        IntensitySeries::from_buckets(buckets)
    }

    /// Intensity series for an explicit granularity key.
    pub fn results_for(&self, key: &str) -> Result<IntensitySeries> {
        let granularity: Granularity = key.parse()?;
        Ok(self.results(Some(granularity)))
    }
}

/// Average each field over consecutive rows falling in the same bucket and
/// sum the averages. Buckets without rows are not emitted.
fn bucket_intensity(rows: &[SampleRow], origin: Instant, width: Duration) -> Vec<f64> {
    let width_nanos = width.as_nanos().max(1);
    let mut out = Vec::new();

    let mut current: Option<u128> = None;
    let mut sums: Vec<f64> = Vec::new();
    let mut count = 0usize;

    for row in rows {
        let bucket = row.at.saturating_duration_since(origin).as_nanos() / width_nanos;

        if current != Some(bucket) {
            if count > 0 {
                out.push(sums.iter().map(|s| s / count as f64).sum());
            }
            current = Some(bucket);
            sums = vec![0.0; row.values.len()];
            count = 0;
        }

        for (sum, value) in sums.iter_mut().zip(&row.values) {
            *sum += value;
        }
        count += 1;
    }

    if count > 0 {
        out.push(sums.iter().map(|s| s / count as f64).sum());
    }

    out
}

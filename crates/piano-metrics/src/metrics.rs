/// Stateful metrics derived from the note event stream.
///
/// Each metric reacts to the event kinds it is subscribed to (see
/// `catalog`) and exposes its current value. Derived metrics have no
/// subscriptions; they read the values of their dependencies through the
/// `ValueContext` handed to them at read time.
///
/// Metrics are not thread-safe on their own. The aggregator serializes
/// every push and read behind a single lock.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use crate::format::{format_duration, format_float};

/// Raw metric value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Count(u64),
    /// Seconds for durations, plain number otherwise
    Real(f64),
    /// Key number -> hits
    Histogram(BTreeMap<u8, u64>),
}

impl MetricValue {
    /// Scalar view of the value. A histogram reads as its total.
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Count(n) => *n as f64,
            MetricValue::Real(x) => *x,
            MetricValue::Histogram(h) => h.values().sum::<u64>() as f64,
        }
    }
}

/// Value formatted for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Count(u64),
    Real(f64),
    Text(String),
    Histogram(BTreeMap<u8, u64>),
}

impl StatValue {
    /// Numeric view, for fields polled by the sampler.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Count(n) => Some(*n as f64),
            StatValue::Real(x) => Some(*x),
            StatValue::Text(_) | StatValue::Histogram(_) => None,
        }
    }
}

impl From<MetricValue> for StatValue {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Count(n) => StatValue::Count(n),
            MetricValue::Real(x) => StatValue::Real(x),
            MetricValue::Histogram(h) => StatValue::Histogram(h),
        }
    }
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Count(n) => write!(f, "{}", n),
            StatValue::Real(x) => write!(f, "{}", x),
            StatValue::Text(s) => f.write_str(s),
            StatValue::Histogram(h) => {
                let parts: Vec<String> = h.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

/// Snapshot of formatted metrics, keyed by display name.
pub type Stats = BTreeMap<String, StatValue>;

/// Read-time inputs of a metric: the current time and the values of its
/// dependencies, in declaration order.
pub struct ValueContext<'a> {
    now: Instant,
    dependencies: &'a [MetricValue],
}

impl<'a> ValueContext<'a> {
    pub fn new(now: Instant, dependencies: &'a [MetricValue]) -> Self {
        Self { now, dependencies }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn dependency(&self, index: usize) -> Option<&MetricValue> {
        self.dependencies.get(index)
    }

    /// Scalar value of dependency `index` (0 if absent).
    pub fn dependency_f64(&self, index: usize) -> f64 {
        self.dependency(index).map_or(0.0, MetricValue::as_f64)
    }
}

pub trait Metric: Send {
    /// Apply one event. Only called with events the metric subscribed to.
    fn push(&mut self, _event: &Event) -> Result<()> {
        Ok(())
    }

    /// Whether `push` handles events of `kind`. Checked once against the
    /// subscriptions when the metric is registered.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    fn value(&self, ctx: &ValueContext<'_>) -> MetricValue;

    /// Display form of `value()`. Must not mutate state.
    fn format(&self, ctx: &ValueContext<'_>) -> StatValue {
        self.value(ctx).into()
    }
}

fn secs_between(later: Instant, earlier: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64()
}

/// Wall time from the first note-on to the most recent note-off.
#[derive(Debug, Default)]
pub struct TotalDuration {
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
}

impl TotalDuration {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for TotalDuration {
    fn push(&mut self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::NoteOn if self.started_at.is_none() => {
                self.started_at = Some(event.timestamp);
            }
            EventKind::NoteOff => self.ended_at = Some(event.timestamp),
            _ => {}
        }
        Ok(())
    }

    fn value(&self, ctx: &ValueContext<'_>) -> MetricValue {
        let secs = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => secs_between(end, start),
            (Some(start), None) => secs_between(ctx.now(), start),
            _ => 0.0,
        };
        MetricValue::Real(secs)
    }

    fn format(&self, ctx: &ValueContext<'_>) -> StatValue {
        StatValue::Text(format_duration(self.value(ctx).as_f64()))
    }
}

/// Notes currently held down.
#[derive(Debug, Default)]
pub struct NotesPlaying {
    count: u64,
}

impl NotesPlaying {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for NotesPlaying {
    fn push(&mut self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::NoteOn => self.count += 1,
            // An unmatched note-off must not drive the count negative
            EventKind::NoteOff => self.count = self.count.saturating_sub(1),
            EventKind::Other => {}
        }
        Ok(())
    }

    fn value(&self, _ctx: &ValueContext<'_>) -> MetricValue {
        MetricValue::Count(self.count)
    }
}

/// Time during which at least one note sounds.
///
/// A silence shorter than `max_short_pause` between two runs is counted
/// as playing time, so breathing between phrases does not split the
/// interval.
#[derive(Debug)]
pub struct PlayingDuration {
    buffer: Duration,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    notes_playing: u64,
    max_short_pause: Duration,
}

impl PlayingDuration {
    pub const NAME: &'static str = "playing_duration";

    pub fn new(max_short_pause: Duration) -> Self {
        Self {
            buffer: Duration::ZERO,
            started_at: None,
            ended_at: None,
            notes_playing: 0,
            max_short_pause,
        }
    }

    fn playing(&self) -> bool {
        self.notes_playing > 0
    }
}

impl Metric for PlayingDuration {
    fn push(&mut self, event: &Event) -> Result<()> {
        let now = event.timestamp;

        match event.kind {
            EventKind::NoteOn => {
                if !self.playing() {
                    match self.ended_at {
                        Some(ended) if now.saturating_duration_since(ended) < self.max_short_pause => {
                            // Short pause: resume the previous run
                            self.started_at = Some(ended);
                            self.ended_at = None;
                        }
                        _ => self.started_at = Some(now),
                    }
                }
                self.notes_playing = self.notes_playing.saturating_add(1);
            }
            EventKind::NoteOff => {
                if self.playing() {
                    self.notes_playing -= 1;
                    if !self.playing() {
                        if let Some(started) = self.started_at.take() {
                            self.buffer += now.saturating_duration_since(started);
                        }
                        self.ended_at = Some(now);
                    }
                }
            }
            kind => {
                return Err(Error::UnexpectedEventType {
                    metric: Self::NAME,
                    kind,
                })
            }
        }
        Ok(())
    }

    fn accepts(&self, kind: EventKind) -> bool {
        matches!(kind, EventKind::NoteOn | EventKind::NoteOff)
    }

    fn value(&self, ctx: &ValueContext<'_>) -> MetricValue {
        let running = match self.started_at {
            Some(started) if self.playing() => ctx.now().saturating_duration_since(started),
            _ => Duration::ZERO,
        };
        MetricValue::Real((self.buffer + running).as_secs_f64())
    }

    fn format(&self, ctx: &ValueContext<'_>) -> StatValue {
        StatValue::Text(format_duration(self.value(ctx).as_f64()))
    }
}

/// Dependency 0 (seconds) expressed in minutes.
#[derive(Debug, Default)]
pub struct Minutes;

impl Metric for Minutes {
    fn value(&self, ctx: &ValueContext<'_>) -> MetricValue {
        MetricValue::Real(ctx.dependency_f64(0) / 60.0)
    }
}

/// Counts every event it is subscribed to.
#[derive(Debug, Default)]
pub struct EventCounter {
    counter: u64,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for EventCounter {
    fn push(&mut self, _event: &Event) -> Result<()> {
        self.counter += 1;
        Ok(())
    }

    fn value(&self, _ctx: &ValueContext<'_>) -> MetricValue {
        MetricValue::Count(self.counter)
    }
}

/// Dependency 0 (a count) divided by dependency 1 (minutes).
/// Zero minutes yields a rate of zero.
#[derive(Debug, Default)]
pub struct PerMinute;

impl Metric for PerMinute {
    fn value(&self, ctx: &ValueContext<'_>) -> MetricValue {
        let minutes = ctx.dependency_f64(1);
        if minutes == 0.0 {
            return MetricValue::Real(0.0);
        }
        MetricValue::Real(ctx.dependency_f64(0) / minutes)
    }

    fn format(&self, ctx: &ValueContext<'_>) -> StatValue {
        StatValue::Text(format_float(self.value(ctx).as_f64()))
    }
}

/// Note-on count per key number.
#[derive(Debug, Default)]
pub struct NoteCountPerPitch {
    keys: BTreeMap<u8, u64>,
}

impl NoteCountPerPitch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for NoteCountPerPitch {
    fn push(&mut self, event: &Event) -> Result<()> {
        *self.keys.entry(event.key).or_insert(0) += 1;
        Ok(())
    }

    fn value(&self, _ctx: &ValueContext<'_>) -> MetricValue {
        MetricValue::Histogram(self.keys.clone())
    }
}

/// Note-ons within the last `window` (instantaneous notes per second for
/// the default 1s window).
#[derive(Debug)]
pub struct RecentNotes {
    window: Duration,
    hits: VecDeque<Instant>,
}

impl RecentNotes {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: VecDeque::new(),
        }
    }

    fn is_recent(&self, hit: Instant, now: Instant) -> bool {
        now.saturating_duration_since(hit) <= self.window
    }
}

impl Metric for RecentNotes {
    fn push(&mut self, event: &Event) -> Result<()> {
        let now = event.timestamp;
        self.hits.push_back(now);
        while let Some(&front) = self.hits.front() {
            if self.is_recent(front, now) {
                break;
            }
            self.hits.pop_front();
        }
        Ok(())
    }

    fn value(&self, ctx: &ValueContext<'_>) -> MetricValue {
        let now = ctx.now();
        let recent = self.hits.iter().filter(|&&hit| self.is_recent(hit, now)).count();
        MetricValue::Count(recent as u64)
    }
}

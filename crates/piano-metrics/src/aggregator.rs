/// Thread-safe event aggregator.
///
/// Owns the metric graph behind a single mutex. Every push dispatches the
/// event to all subscribed metrics while holding the lock, and every
/// snapshot formats its metric set under the same lock, so a snapshot
/// never observes a half-applied push.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::MetricsConfig;
use crate::error::Result;
use crate::event::{Event, EventKind};
use crate::metrics::Stats;
use crate::registry::{MetricGraph, MetricId, MetricRegistry};

struct AggregatorState {
    graph: MetricGraph,
    live: Vec<MetricId>,
    finals: Vec<MetricId>,
}

pub struct Aggregator {
    clock: Arc<dyn Clock>,
    state: Mutex<AggregatorState>,
    live_names: Vec<&'static str>,
}

impl Aggregator {
    /// Build every live and final metric from `catalog`. Fails without
    /// building anything if a key (or one of its dependencies) cannot be
    /// resolved.
    pub fn new(catalog: &Catalog, config: &MetricsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut registry = MetricRegistry::new(catalog, config);

        let live = config
            .live
            .iter()
            .map(|key| registry.provide(key))
            .collect::<Result<Vec<_>>>()?;
        let finals = config
            .final_metrics
            .iter()
            .map(|key| registry.provide(key))
            .collect::<Result<Vec<_>>>()?;

        let graph = registry.into_graph();
        let live_names = live.iter().map(|id| graph.name_of(*id)).collect();

        info!(
            live = live.len(),
            finals = finals.len(),
            instances = graph.len(),
            "Metrics registered"
        );

        Ok(Self {
            clock,
            state: Mutex::new(AggregatorState { graph, live, finals }),
            live_names,
        })
    }

    /// Aggregator over the standard metric catalog.
    pub fn with_standard_metrics(config: &MetricsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(&Catalog::standard(), config, clock)
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        // Metric state is consistent between events, so a panic elsewhere
        // does not invalidate it
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch a timestamped event to its subscribers.
    pub fn push(&self, event: &Event) -> Result<()> {
        let mut state = self.lock();
        state.graph.dispatch(event)
    }

    /// Stamp an event with the aggregator's clock and dispatch it.
    ///
    /// The timestamp is taken under the lock, so concurrent producers
    /// never hand metrics events that go back in time.
    pub fn ingest(&self, kind: EventKind, key: u8) -> Result<()> {
        let mut state = self.lock();
        let event = Event::new(kind, key, self.clock.now());
        debug!(kind = ?kind, key = key, "event");
        state.graph.dispatch(&event)
    }

    /// Formatted live metrics.
    pub fn stats(&self) -> Stats {
        let state = self.lock();
        Self::snapshot(&state.graph, &state.live, self.clock.as_ref())
    }

    /// Formatted final metrics.
    pub fn final_stats(&self) -> Stats {
        let state = self.lock();
        Self::snapshot(&state.graph, &state.finals, self.clock.as_ref())
    }

    fn snapshot(graph: &MetricGraph, ids: &[MetricId], clock: &dyn Clock) -> Stats {
        let now = clock.now();
        ids.iter()
            .map(|id| (graph.name_of(*id).to_string(), graph.format_of(*id, now)))
            .collect()
    }

    /// Display names of the live metrics, in configured order.
    pub fn live_names(&self) -> &[&'static str] {
        &self.live_names
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Error;
    use crate::metrics::StatValue;

    fn aggregator(clock: &Arc<ManualClock>) -> Aggregator {
        Aggregator::with_standard_metrics(&MetricsConfig::default(), clock.clone()).unwrap()
    }

    #[test]
    fn test_live_and_final_sets() {
        let clock = Arc::new(ManualClock::new());
        let agg = aggregator(&clock);

        let stats = agg.stats();
        assert!(stats.contains_key("messages"));
        assert!(!stats.contains_key("keys"));
        assert!(agg.final_stats().contains_key("keys"));
        assert_eq!(agg.live_names()[0], "duration");
    }

    #[test]
    fn test_push_updates_stats() {
        let clock = Arc::new(ManualClock::new());
        let agg = aggregator(&clock);

        agg.ingest(EventKind::NoteOn, 60).unwrap();
        agg.ingest(EventKind::Other, 0).unwrap();
        clock.advance_secs(30.0);
        agg.ingest(EventKind::NoteOff, 60).unwrap();

        let stats = agg.stats();
        assert_eq!(stats["messages"], StatValue::Count(3));
        assert_eq!(stats["notes"], StatValue::Count(1));
        assert_eq!(stats["notes_playing"], StatValue::Count(0));
        assert_eq!(stats["duration"], StatValue::Text("00:30".to_string()));
        assert_eq!(stats["npm"], StatValue::Text("2.00".to_string()));
        assert_eq!(stats["nppm"], StatValue::Text("2.00".to_string()));
    }

    #[test]
    fn test_rates_zero_before_any_time_passes() {
        let clock = Arc::new(ManualClock::new());
        let agg = aggregator(&clock);
        agg.ingest(EventKind::NoteOn, 60).unwrap();

        let stats = agg.stats();
        assert_eq!(stats["npm"], StatValue::Text("0.00".to_string()));
        assert_eq!(stats["nppm"], StatValue::Text("0.00".to_string()));
    }

    #[test]
    fn test_unknown_live_metric_fails() {
        let config = MetricsConfig {
            live: vec!["note_count".into(), "bogus".into()],
            ..MetricsConfig::default()
        };
        let err = Aggregator::with_standard_metrics(&config, Arc::new(ManualClock::new()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnresolvableDependency { .. }));
    }
}

/// Metric registry: builds metric instances by key from a `Catalog`.
///
/// Dependencies are resolved depth-first and every key is built at most
/// once, so metrics sharing a dependency share the same instance. Each
/// new instance is registered in the fan-out table for the event kinds
/// its catalog entry subscribes to.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::catalog::Catalog;
use crate::config::MetricsConfig;
use crate::error::{Error, Result};
use crate::event::{Event, Subscription};
use crate::metrics::{Metric, MetricValue, StatValue, ValueContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(usize);

struct Slot {
    name: &'static str,
    metric: Box<dyn Metric>,
    dependencies: Vec<MetricId>,
}

/// Arena of metric instances plus the event fan-out table.
#[derive(Default)]
pub struct MetricGraph {
    slots: Vec<Slot>,
    listeners: HashMap<Subscription, Vec<MetricId>>,
}

impl MetricGraph {
    fn insert(&mut self, name: &'static str, metric: Box<dyn Metric>, dependencies: Vec<MetricId>) -> MetricId {
        let id = MetricId(self.slots.len());
        self.slots.push(Slot {
            name,
            metric,
            dependencies,
        });
        id
    }

    fn listen(&mut self, subscription: Subscription, id: MetricId) {
        self.listeners.entry(subscription).or_default().push(id);
    }

    /// Deliver an event to every listener of its exact kind, then to the
    /// wildcard listeners, in registration order.
    ///
    /// Registration rejects metrics subscribed to kinds they do not
    /// accept. If a metric still fails, the listeners before it have
    /// already applied the event and the ones after it never see it.
    pub fn dispatch(&mut self, event: &Event) -> Result<()> {
        let Self { slots, listeners } = self;

        for subscription in [Subscription::Kind(event.kind), Subscription::All] {
            if let Some(ids) = listeners.get(&subscription) {
                for id in ids {
                    slots[id.0].metric.push(event)?;
                }
            }
        }
        Ok(())
    }

    fn dependency_values(&self, id: MetricId, now: Instant) -> Vec<MetricValue> {
        self.slots[id.0]
            .dependencies
            .iter()
            .map(|dep| self.value_of(*dep, now))
            .collect()
    }

    pub fn value_of(&self, id: MetricId, now: Instant) -> MetricValue {
        let deps = self.dependency_values(id, now);
        self.slots[id.0].metric.value(&ValueContext::new(now, &deps))
    }

    pub fn format_of(&self, id: MetricId, now: Instant) -> StatValue {
        let deps = self.dependency_values(id, now);
        self.slots[id.0].metric.format(&ValueContext::new(now, &deps))
    }

    pub fn name_of(&self, id: MetricId) -> &'static str {
        self.slots[id.0].name
    }

    /// Listeners registered for `subscription`, in dispatch order.
    pub fn listeners(&self, subscription: Subscription) -> &[MetricId] {
        self.listeners.get(&subscription).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub struct MetricRegistry<'c> {
    catalog: &'c Catalog,
    config: MetricsConfig,
    graph: MetricGraph,
    cache: HashMap<String, MetricId>,
    /// Keys currently being resolved, outermost first
    resolving: Vec<String>,
}

impl<'c> MetricRegistry<'c> {
    pub fn new(catalog: &'c Catalog, config: &MetricsConfig) -> Self {
        Self {
            catalog,
            config: config.clone(),
            graph: MetricGraph::default(),
            cache: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    /// Return the instance for `key`, building it and its dependencies on
    /// first request.
    pub fn provide(&mut self, key: &str) -> Result<MetricId> {
        if let Some(&id) = self.cache.get(key) {
            return Ok(id);
        }

        if let Some(pos) = self.resolving.iter().position(|k| k == key) {
            let mut cycle: Vec<&str> = self.resolving[pos..].iter().map(String::as_str).collect();
            cycle.push(key);
            return Err(Error::unresolvable(
                key,
                format!("cyclic dependency {}", cycle.join(" -> ")),
            ));
        }

        let catalog = self.catalog;
        let spec = catalog
            .get(key)
            .ok_or_else(|| Error::unresolvable(key, "no such metric"))?;

        self.resolving.push(key.to_string());
        let dependencies: Result<Vec<MetricId>> =
            spec.dependencies.iter().map(|dep| self.provide(dep)).collect();
        self.resolving.pop();
        let dependencies = dependencies?;

        let metric = (spec.build)(&self.config);
        // A metric must handle everything it listens to, so dispatch
        // never fails halfway through the listener list
        let rejected = spec
            .subscriptions
            .iter()
            .flat_map(|subscription| subscription.kinds())
            .find(|kind| !metric.accepts(**kind));
        if let Some(&kind) = rejected {
            return Err(Error::UnexpectedEventType {
                metric: spec.name,
                kind,
            });
        }

        let id = self.graph.insert(spec.name, metric, dependencies);
        for subscription in spec.subscriptions {
            self.graph.listen(*subscription, id);
        }
        self.cache.insert(key.to_string(), id);

        debug!(
            key = key,
            name = spec.name,
            dependencies = ?spec.dependencies,
            "metric registered"
        );

        Ok(id)
    }

    pub fn graph(&self) -> &MetricGraph {
        &self.graph
    }

    pub fn into_graph(self) -> MetricGraph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MetricSpec;
    use crate::event::EventKind;
    use crate::metrics::{EventCounter, Minutes};

    fn counter(_: &MetricsConfig) -> Box<dyn Metric> {
        Box::new(EventCounter::new())
    }

    fn minutes(_: &MetricsConfig) -> Box<dyn Metric> {
        Box::new(Minutes)
    }

    fn spec(key: &'static str, dependencies: &'static [&'static str]) -> MetricSpec {
        MetricSpec {
            key,
            name: key,
            dependencies,
            subscriptions: &[],
            build: minutes,
        }
    }

    #[test]
    fn test_provide_is_memoized() {
        let catalog = Catalog::standard();
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());

        let a = registry.provide("note_count").unwrap();
        let b = registry.provide("note_count").unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.graph().len(), 1);
    }

    #[test]
    fn test_shared_dependency_built_once() {
        let catalog = Catalog::standard();
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());

        registry.provide("notes_per_minute").unwrap();
        registry.provide("notes_per_playing_minute").unwrap();

        // note_count, total_duration, duration_minutes, npm,
        // playing_duration, playing_duration_minutes, nppm
        assert_eq!(registry.graph().len(), 7);
        let note_count = registry.provide("note_count").unwrap();
        let note_on = registry.graph().listeners(Subscription::Kind(EventKind::NoteOn));
        assert_eq!(note_on.iter().filter(|&&id| id == note_count).count(), 1);
    }

    #[test]
    fn test_unknown_metric() {
        let catalog = Catalog::standard();
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());

        let err = registry.provide("nonexistent").unwrap_err();
        assert!(matches!(err, Error::UnresolvableDependency { ref name, .. } if name == "nonexistent"));
    }

    #[test]
    fn test_missing_dependency() {
        let catalog = Catalog::new(vec![spec("rate", &["missing"])]);
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());

        let err = registry.provide("rate").unwrap_err();
        assert!(matches!(err, Error::UnresolvableDependency { ref name, .. } if name == "missing"));
        assert!(registry.graph().is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let catalog = Catalog::new(vec![
            spec("a", &["b"]),
            spec("b", &["c"]),
            spec("c", &["a"]),
        ]);
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());

        match registry.provide("a") {
            Err(Error::UnresolvableDependency { name, reason }) => {
                assert_eq!(name, "a");
                assert!(reason.contains("a -> b -> c -> a"), "reason: {}", reason);
            }
            other => panic!("expected cycle error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_self_dependency_detected() {
        let catalog = Catalog::new(vec![spec("loop", &["loop"])]);
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());
        assert!(registry.provide("loop").is_err());
    }

    #[test]
    fn test_dispatch_exact_then_wildcard() {
        let catalog = Catalog::new(vec![
            MetricSpec {
                key: "ons",
                name: "ons",
                dependencies: &[],
                subscriptions: &[Subscription::Kind(EventKind::NoteOn)],
                build: counter,
            },
            MetricSpec {
                key: "everything",
                name: "everything",
                dependencies: &[],
                subscriptions: &[Subscription::All],
                build: counter,
            },
        ]);
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());
        let ons = registry.provide("ons").unwrap();
        let everything = registry.provide("everything").unwrap();
        let mut graph = registry.into_graph();

        let now = Instant::now();
        graph.dispatch(&Event::note_on(60, now)).unwrap();
        graph.dispatch(&Event::note_off(60, now)).unwrap();
        graph.dispatch(&Event::new(EventKind::Other, 0, now)).unwrap();

        assert_eq!(graph.value_of(ons, now), MetricValue::Count(1));
        assert_eq!(graph.value_of(everything, now), MetricValue::Count(3));
    }

    #[test]
    fn test_subscription_outside_accepted_kinds_rejected() {
        fn playing(config: &MetricsConfig) -> Box<dyn Metric> {
            Box::new(crate::metrics::PlayingDuration::new(config.max_short_pause()))
        }

        let catalog = Catalog::new(vec![MetricSpec {
            key: "playing",
            name: "playing",
            dependencies: &[],
            subscriptions: &[Subscription::Kind(EventKind::NoteOn), Subscription::All],
            build: playing,
        }]);
        let mut registry = MetricRegistry::new(&catalog, &MetricsConfig::default());

        assert_eq!(
            registry.provide("playing"),
            Err(Error::UnexpectedEventType {
                metric: "playing",
                kind: EventKind::Other,
            })
        );
        assert!(registry.graph().is_empty());
        assert!(registry.graph().listeners(Subscription::All).is_empty());
    }
}

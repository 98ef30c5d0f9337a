/// Static table of every metric the registry can build.
///
/// Each entry declares, as plain data, the key the registry resolves, the
/// name the metric appears under in stats snapshots, the keys of its
/// dependencies (handed to the metric in this order at read time) and the
/// event kinds it listens to.

use crate::config::MetricsConfig;
use crate::event::{EventKind, Subscription};
use crate::metrics::{
    EventCounter, Metric, Minutes, NoteCountPerPitch, NotesPlaying, PerMinute, PlayingDuration,
    RecentNotes, TotalDuration,
};

pub type Constructor = fn(&MetricsConfig) -> Box<dyn Metric>;

#[derive(Clone, Copy)]
pub struct MetricSpec {
    /// Registry key (snake_case)
    pub key: &'static str,
    /// Key in stats snapshots
    pub name: &'static str,
    pub dependencies: &'static [&'static str],
    pub subscriptions: &'static [Subscription],
    pub build: Constructor,
}

impl std::fmt::Debug for MetricSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSpec")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

const NOTES: &[Subscription] = &[
    Subscription::Kind(EventKind::NoteOn),
    Subscription::Kind(EventKind::NoteOff),
];
const NOTE_ON: &[Subscription] = &[Subscription::Kind(EventKind::NoteOn)];
const ALL: &[Subscription] = &[Subscription::All];
const NONE: &[Subscription] = &[];

pub const STANDARD_METRICS: &[MetricSpec] = &[
    MetricSpec {
        key: "total_duration",
        name: "duration",
        dependencies: &[],
        subscriptions: NOTES,
        build: |_| Box::new(TotalDuration::new()),
    },
    MetricSpec {
        key: "playing_duration",
        name: "playing_duration",
        dependencies: &[],
        subscriptions: NOTES,
        build: |config| Box::new(PlayingDuration::new(config.max_short_pause())),
    },
    MetricSpec {
        key: "duration_minutes",
        name: "minutes",
        dependencies: &["total_duration"],
        subscriptions: NONE,
        build: |_| Box::new(Minutes),
    },
    MetricSpec {
        key: "playing_duration_minutes",
        name: "playing_minutes",
        dependencies: &["playing_duration"],
        subscriptions: NONE,
        build: |_| Box::new(Minutes),
    },
    MetricSpec {
        key: "message_count",
        name: "messages",
        dependencies: &[],
        subscriptions: ALL,
        build: |_| Box::new(EventCounter::new()),
    },
    MetricSpec {
        key: "note_count",
        name: "notes",
        dependencies: &[],
        subscriptions: NOTE_ON,
        build: |_| Box::new(EventCounter::new()),
    },
    MetricSpec {
        key: "notes_per_minute",
        name: "npm",
        dependencies: &["note_count", "duration_minutes"],
        subscriptions: NONE,
        build: |_| Box::new(PerMinute),
    },
    MetricSpec {
        key: "notes_per_playing_minute",
        name: "nppm",
        dependencies: &["note_count", "playing_duration_minutes"],
        subscriptions: NONE,
        build: |_| Box::new(PerMinute),
    },
    MetricSpec {
        key: "note_count_per_pitch",
        name: "keys",
        dependencies: &[],
        subscriptions: NOTE_ON,
        build: |_| Box::new(NoteCountPerPitch::new()),
    },
    MetricSpec {
        key: "notes_playing",
        name: "notes_playing",
        dependencies: &[],
        subscriptions: NOTES,
        build: |_| Box::new(NotesPlaying::new()),
    },
    MetricSpec {
        key: "recent_notes",
        name: "recent_notes",
        dependencies: &[],
        subscriptions: NOTE_ON,
        build: |config| Box::new(RecentNotes::new(config.recent_notes_window())),
    },
];

/// Set of metric specs the registry resolves keys against.
#[derive(Debug, Clone)]
pub struct Catalog {
    specs: Vec<MetricSpec>,
}

impl Catalog {
    pub fn new(specs: Vec<MetricSpec>) -> Self {
        Self { specs }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_METRICS.to_vec())
    }

    pub fn get(&self, key: &str) -> Option<&MetricSpec> {
        self.specs.iter().find(|s| s.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().map(|s| s.key)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

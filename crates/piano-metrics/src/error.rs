use thiserror::Error;

use crate::event::EventKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The registry could not map a key to a metric, or one of its
    /// dependencies could not be built.
    #[error("cannot resolve metric '{name}': {reason}")]
    UnresolvableDependency { name: String, reason: String },

    /// A metric was wired to an event kind it does not understand.
    #[error("metric '{metric}' received unexpected {kind:?} event")]
    UnexpectedEventType { metric: &'static str, kind: EventKind },

    #[error("invalid granularity '{0}' (expected second, ten_seconds, minute, ten_minutes or hour)")]
    InvalidGranularity(String),

    #[error("sample field '{0}' is missing from the stats snapshot or not numeric")]
    SampleField(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unresolvable(name: &str, reason: impl Into<String>) -> Self {
        Error::UnresolvableDependency {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

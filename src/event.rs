use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved source of the invalid-event sentinel. Producers must not
/// publish under it.
pub const INVALID_SOURCE: &str = "invalid";

/// Identity of an event stream: a producer source plus an event name.
///
/// A key maps deterministically to the store channel carrying its live
/// publications, so distinct keys never share a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub source: String,
    pub name: String,
}

impl EventKey {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Store channel for live publications of this key. Dots inside the
    /// source or name are escaped, so distinct keys never share a channel
    /// even when a source itself contains the separator.
    pub fn channel(&self) -> String {
        format!(
            "keybus.event.{}.{}",
            escape_segment(&self.source),
            escape_segment(&self.name)
        )
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('\\', "\\\\").replace('.', "\\.")
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source, self.name)
    }
}

/// An immutable published value. Equality is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub key: EventKey,
    pub time: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(key: EventKey, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            time: Utc::now(),
            payload,
        }
    }

    /// Sentinel yielded as a subscription's initial element when nothing has
    /// ever been published for a key. Synthesized by the subscriber only.
    pub fn invalid() -> Self {
        Self {
            id: Uuid::nil(),
            key: EventKey::new(INVALID_SOURCE, INVALID_SOURCE),
            time: DateTime::<Utc>::UNIX_EPOCH,
            payload: serde_json::Value::Null,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.key.source == INVALID_SOURCE
    }
}

//! Presence events consumed by session reconstruction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// A single presence signal observed on the shared resource.
///
/// Timestamps are naive wall-clock instants as written by the resource's own
/// log; calendar dates derived from them are the resource's local dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When the event occurred.
    pub timestamp: NaiveDateTime,
    /// What happened.
    pub kind: EventKind,
}

/// The type of presence change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The entity became present.
    Join { entity: EntityId },
    /// The entity stopped being present.
    Leave { entity: EntityId },
    /// The resource went down; everyone present is gone at this instant.
    Crash,
}

impl Event {
    pub const fn join(timestamp: NaiveDateTime, entity: EntityId) -> Self {
        Self {
            timestamp,
            kind: EventKind::Join { entity },
        }
    }

    pub const fn leave(timestamp: NaiveDateTime, entity: EntityId) -> Self {
        Self {
            timestamp,
            kind: EventKind::Leave { entity },
        }
    }

    pub const fn crash(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            kind: EventKind::Crash,
        }
    }

    /// Returns the entity this event is about, or `None` for a crash.
    pub const fn entity(&self) -> Option<&EntityId> {
        match &self.kind {
            EventKind::Join { entity } | EventKind::Leave { entity } => Some(entity),
            EventKind::Crash => None,
        }
    }
}

/// Merges independently produced event lists into one globally ordered stream.
///
/// Substreams are concatenated in the order given and then stable-sorted by
/// timestamp, so events sharing an instant keep their input order.
pub fn merge_streams<I>(substreams: I) -> Vec<Event>
where
    I: IntoIterator<Item = Vec<Event>>,
{
    let mut merged: Vec<Event> = substreams.into_iter().flatten().collect();
    merged.sort_by_key(|e| e.timestamp);
    merged
}

//! Reconstructed presence sessions and per-entity records.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::query::Window;
use crate::types::EntityId;

/// A closed presence interval.
///
/// Sessions only leave the builder once closed, so `end >= start` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Session {
    pub(crate) fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(end >= start, "session ends before it starts");
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Duration in fractional minutes.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_minutes(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 60_000.0
    }

    /// True when the closed interval `[start, end]` touches the window.
    pub fn overlaps(&self, window: &Window) -> bool {
        !window.is_empty() && self.start <= window.end && self.end >= window.start
    }

    /// Truncates the session to the window, or `None` if they do not overlap.
    pub fn clip(&self, window: &Window) -> Option<Self> {
        self.overlaps(window).then(|| Self {
            start: self.start.max(window.start),
            end: self.end.min(window.end),
        })
    }
}

/// Which calendar dates a closed session marks as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayCoverage {
    /// Only the start date and the end date.
    #[default]
    Endpoints,
    /// Every date from the start date through the end date.
    Spanned,
}

impl DayCoverage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Endpoints => "endpoints",
            Self::Spanned => "spanned",
        }
    }

    pub(crate) fn mark(self, session: &Session, days: &mut BTreeSet<NaiveDate>) {
        let first = session.start.date();
        let last = session.end.date();
        match self {
            Self::Endpoints => {
                days.insert(first);
                days.insert(last);
            }
            Self::Spanned => {
                days.extend(first.iter_days().take_while(|d| *d <= last));
            }
        }
    }
}

impl std::fmt::Display for DayCoverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DayCoverage {
    type Err = crate::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "endpoints" => Ok(Self::Endpoints),
            "spanned" => Ok(Self::Spanned),
            _ => Err(crate::ValidationError::InvalidDayCoverage {
                value: s.to_string(),
            }),
        }
    }
}

/// Everything reconstructed for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    /// Closed sessions, ascending by start, non-overlapping.
    pub sessions: Vec<Session>,
    /// Dates touched by any session.
    pub days_active: BTreeSet<NaiveDate>,
    /// Opaque caller data carried through to query results (colors, avatars).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

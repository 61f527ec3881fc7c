//! Temporal queries over a reconstructed [`Timeline`].
//!
//! A query clips every entity's sessions to a window, optionally filters
//! entities on a numeric metric, and optionally sorts them. The timeline is
//! never mutated; every query builds fresh views.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::reconstruct::Timeline;
use crate::session::{EntityRecord, Session};
use crate::types::{EntityId, ValidationError};

/// Inclusive instant range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub const fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Whole days: midnight of `first` through the last instant of `last`.
    pub fn from_dates(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first.and_time(NaiveTime::MIN),
            end: last.and_time(end_of_day()),
        }
    }

    /// An inverted window contains nothing.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        !self.is_empty() && self.start.date() <= date && date <= self.end.date()
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN)
}

/// The window a fresh view opens on: from the first of the month four weeks
/// before the last event (but not before the first event) to the last event,
/// widened to whole days.
pub fn default_window(span: &Window) -> Window {
    let back = (span.end - Duration::days(28)).date();
    let month_start = back.with_day(1).unwrap_or(back);
    let first = month_start.max(span.start.date());
    Window::from_dates(first, span.end.date())
}

/// Which metric a [`Filter`] bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Total clipped time, in hours.
    #[default]
    TotalTime,
    /// Number of active days in the window.
    DaysPlayed,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TotalTime => "time",
            Self::DaysPlayed => "days",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FilterKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" | "total_time" => Ok(Self::TotalTime),
            "days" | "days_played" => Ok(Self::DaysPlayed),
            _ => Err(ValidationError::InvalidFilterKind {
                value: s.to_string(),
            }),
        }
    }
}

/// Numeric bounds on one metric. A bound `<= 0` is inactive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    pub kind: FilterKind,
    pub min: f64,
    pub max: f64,
}

impl Filter {
    pub fn is_active(&self) -> bool {
        self.min > 0.0 || self.max > 0.0
    }

    #[allow(clippy::cast_precision_loss)]
    fn accepts(&self, view: &EntityView) -> bool {
        let value = match self.kind {
            FilterKind::TotalTime => view.total_played_minutes / 60.0,
            FilterKind::DaysPlayed => view.days_active.len() as f64,
        };
        (self.min <= 0.0 || value >= self.min) && (self.max <= 0.0 || value <= self.max)
    }
}

/// What entities are ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Entity id, case-insensitive.
    #[default]
    Name,
    /// Clipped start of the first session.
    #[serde(alias = "first")]
    FirstSeen,
    /// Clipped end of the last session.
    #[serde(alias = "last")]
    LastSeen,
    #[serde(alias = "time")]
    TotalTime,
    #[serde(alias = "days")]
    DaysPlayed,
}

impl SortKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::FirstSeen => "first",
            Self::LastSeen => "last",
            Self::TotalTime => "time",
            Self::DaysPlayed => "days",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "first" | "first_seen" => Ok(Self::FirstSeen),
            "last" | "last_seen" => Ok(Self::LastSeen),
            "time" | "total_time" => Ok(Self::TotalTime),
            "days" | "days_played" => Ok(Self::DaysPlayed),
            _ => Err(ValidationError::InvalidSortKey {
                value: s.to_string(),
            }),
        }
    }
}

/// Sort order. Stable: equal keys keep their prior relative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    #[serde(default)]
    pub descending: bool,
}

/// A complete query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Query {
    pub window: Window,
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
}

impl Query {
    pub const fn new(window: Window) -> Self {
        Self {
            window,
            filter: None,
            sort: None,
        }
    }

    #[must_use]
    pub const fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// One entity as seen through a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityView {
    pub id: EntityId,
    /// Clipped sessions, ascending by start.
    pub sessions: Vec<Session>,
    /// Sum of clipped session durations.
    pub total_played_minutes: f64,
    /// Active dates inside the window.
    pub days_active: BTreeSet<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl EntityView {
    fn clip(record: &EntityRecord, window: &Window) -> Self {
        let sessions: Vec<Session> = record
            .sessions
            .iter()
            .filter_map(|s| s.clip(window))
            .collect();
        let total_played_minutes = sessions.iter().map(Session::duration_minutes).sum();
        let days_active = record
            .days_active
            .iter()
            .copied()
            .filter(|d| window.contains_date(*d))
            .collect();
        Self {
            id: record.id.clone(),
            sessions,
            total_played_minutes,
            days_active,
            metadata: record.metadata.clone(),
        }
    }

    pub fn first_seen(&self) -> Option<NaiveDateTime> {
        self.sessions.first().map(|s| s.start)
    }

    pub fn last_seen(&self) -> Option<NaiveDateTime> {
        self.sessions.last().map(|s| s.end)
    }

    pub fn has_sessions(&self) -> bool {
        !self.sessions.is_empty()
    }
}

/// Query output: the window, the full data span, and the entity views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredView {
    pub window: Window,
    /// Earliest and latest event of the whole timeline, `None` when empty.
    pub span: Option<Window>,
    pub entities: Vec<EntityView>,
}

impl FilteredView {
    pub fn is_empty(&self) -> bool {
        self.entities.iter().all(|e| !e.has_sessions())
    }
}

/// Runs a query against a frozen timeline.
pub fn query(timeline: &Timeline, query: &Query) -> FilteredView {
    let window = query.window;
    let mut entities: Vec<EntityView> = timeline
        .entities()
        .par_iter()
        .map(|record| EntityView::clip(record, &window))
        .collect();

    if let Some(filter) = query.filter.filter(Filter::is_active) {
        entities.retain(|view| filter.accepts(view));
    }

    if let Some(sort) = query.sort {
        sort_views(&mut entities, sort);
    }

    tracing::debug!(
        entities = entities.len(),
        start = %window.start,
        end = %window.end,
        "query complete"
    );

    FilteredView {
        window,
        span: timeline.span(),
        entities,
    }
}

fn sort_views(entities: &mut Vec<EntityView>, sort: Sort) {
    let directed = |ord: Ordering| if sort.descending { ord.reverse() } else { ord };
    match sort.key {
        SortKey::Name => {
            entities.sort_by(|a, b| {
                directed(a.id.as_str().to_uppercase().cmp(&b.id.as_str().to_uppercase()))
            });
        }
        SortKey::FirstSeen => {
            entities.retain(EntityView::has_sessions);
            entities.sort_by(|a, b| directed(a.first_seen().cmp(&b.first_seen())));
        }
        SortKey::LastSeen => {
            entities.retain(EntityView::has_sessions);
            entities.sort_by(|a, b| directed(a.last_seen().cmp(&b.last_seen())));
        }
        SortKey::TotalTime => {
            entities.sort_by(|a, b| {
                directed(a.total_played_minutes.total_cmp(&b.total_played_minutes))
            });
        }
        SortKey::DaysPlayed => {
            entities.sort_by(|a, b| directed(a.days_active.len().cmp(&b.days_active.len())));
        }
    }
}

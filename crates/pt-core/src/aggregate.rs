//! Chart-ready projections over a [`FilteredView`].
//!
//! Every function here is a pure read of its input and returns plain keyed or
//! ordered data. An empty timeline (no span) or a view without sessions yields
//! empty collections.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::query::{EntityView, FilteredView};
use crate::session::Session;
use crate::types::{EntityId, ValidationError};

/// How a session's time is assigned to calendar days in stacked charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayAttribution {
    /// The whole session counts toward the day it started on.
    #[default]
    StartDay,
    /// Sessions crossing midnight are split between the days they cover.
    SplitAtMidnight,
}

impl DayAttribution {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StartDay => "start_day",
            Self::SplitAtMidnight => "split_at_midnight",
        }
    }
}

impl std::fmt::Display for DayAttribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DayAttribution {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_day" => Ok(Self::StartDay),
            "split_at_midnight" => Ok(Self::SplitAtMidnight),
            _ => Err(ValidationError::InvalidDayAttribution {
                value: s.to_string(),
            }),
        }
    }
}

/// Hours per entity per day.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StackedHours {
    /// Every calendar day in the range, ascending.
    pub days: Vec<NaiveDate>,
    /// One row per entity; `hours[i]` belongs to `days[i]`.
    pub rows: Vec<StackedRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedRow {
    pub entity: EntityId,
    pub hours: Vec<f64>,
}

/// Session intervals for one entity, for timeline rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GanttRow {
    pub entity: EntityId,
    pub intervals: Vec<Session>,
}

/// Active days for one entity, for day-granularity timelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayGanttRow {
    pub entity: EntityId,
    pub days: Vec<NaiveDate>,
}

fn floor_hour(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(t.hour()))
}

/// Distinct active entities per hour across the data span.
///
/// An entity counts toward every hour its clipped session touches.
pub fn hourly_active(view: &FilteredView) -> Vec<(NaiveDateTime, usize)> {
    let Some(span) = view.span else {
        return Vec::new();
    };
    let first = floor_hour(span.start);
    let last = floor_hour(span.end);
    let Ok(len) = usize::try_from((last - first).num_hours() + 1) else {
        return Vec::new();
    };

    let mut buckets: Vec<HashSet<&EntityId>> = vec![HashSet::new(); len];
    for entity in &view.entities {
        for session in &entity.sessions {
            let start = floor_hour(session.start.max(span.start));
            let end = floor_hour(session.end.min(span.end));
            let mut hour = start;
            while hour <= end {
                if let Ok(i) = usize::try_from((hour - first).num_hours()) {
                    if let Some(bucket) = buckets.get_mut(i) {
                        bucket.insert(&entity.id);
                    }
                }
                hour += Duration::hours(1);
            }
        }
    }

    (0..len)
        .zip(buckets)
        .map(|(i, set)| {
            let offset = i64::try_from(i).unwrap_or(i64::MAX);
            (first + Duration::hours(offset), set.len())
        })
        .collect()
}

/// Number of entities active on each date of the data span.
pub fn daily_active(view: &FilteredView) -> Vec<(NaiveDate, usize)> {
    let Some(span) = view.span else {
        return Vec::new();
    };
    let last = span.end.date();
    span.start
        .date()
        .iter_days()
        .take_while(|d| *d <= last)
        .map(|day| {
            let count = view
                .entities
                .iter()
                .filter(|e| e.days_active.contains(&day))
                .count();
            (day, count)
        })
        .collect()
}

/// Strips leading and trailing entries equal to `empty`.
///
/// A series with no other value trims to nothing. Trimming twice changes nothing.
pub fn trim<K: Clone, V: Clone + PartialEq>(series: &[(K, V)], empty: &V) -> Vec<(K, V)> {
    let first = series.iter().position(|(_, v)| v != empty);
    let last = series.iter().rposition(|(_, v)| v != empty);
    match (first, last) {
        (Some(first), Some(last)) => series[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

/// Total hours per entity, skipping entities with no time.
pub fn total_hours(view: &FilteredView) -> Vec<(EntityId, f64)> {
    view.entities
        .iter()
        .filter(|e| e.total_played_minutes > 0.0)
        .map(|e| (e.id.clone(), e.total_played_minutes / 60.0))
        .collect()
}

/// Active day count per entity, skipping entities with none.
pub fn day_counts(view: &FilteredView) -> Vec<(EntityId, usize)> {
    view.entities
        .iter()
        .filter(|e| !e.days_active.is_empty())
        .map(|e| (e.id.clone(), e.days_active.len()))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

/// Adds `session` into `row`, where `row[i]` is `first + i` days.
fn attribute(row: &mut [f64], first: NaiveDate, session: &Session, mode: DayAttribution) {
    let slot = |day: NaiveDate| usize::try_from((day - first).num_days()).ok();
    match mode {
        DayAttribution::StartDay => {
            if let Some(cell) = slot(session.start.date()).and_then(|i| row.get_mut(i)) {
                *cell += hours(session.duration());
            }
        }
        DayAttribution::SplitAtMidnight => {
            let mut cursor = session.start;
            while cursor < session.end {
                let next_midnight = (cursor.date() + Duration::days(1)).and_time(NaiveTime::MIN);
                let piece_end = next_midnight.min(session.end);
                if let Some(cell) = slot(cursor.date()).and_then(|i| row.get_mut(i)) {
                    *cell += hours(piece_end - cursor);
                }
                cursor = piece_end;
            }
        }
    }
}

/// Hours per entity per day over the dates covered by the view's sessions.
///
/// With [`DayAttribution::StartDay`] a session crossing midnight is counted
/// entirely on its start day.
pub fn daily_stacked_hours(view: &FilteredView, mode: DayAttribution) -> StackedHours {
    let with_sessions: Vec<&EntityView> =
        view.entities.iter().filter(|e| e.has_sessions()).collect();

    let sessions = || with_sessions.iter().flat_map(|e| e.sessions.iter());
    let (Some(first), Some(last)) = (
        sessions().map(|s| s.start.date()).min(),
        sessions().map(|s| s.end.date()).max(),
    ) else {
        return StackedHours::default();
    };

    let days: Vec<NaiveDate> = first.iter_days().take_while(|d| *d <= last).collect();
    let rows = with_sessions
        .iter()
        .map(|entity| {
            let mut hours = vec![0.0; days.len()];
            for session in &entity.sessions {
                attribute(&mut hours, first, session, mode);
            }
            StackedRow {
                entity: entity.id.clone(),
                hours,
            }
        })
        .collect();

    StackedHours { days, rows }
}

/// Clipped session intervals per entity.
pub fn session_gantt(view: &FilteredView) -> Vec<GanttRow> {
    view.entities
        .iter()
        .filter(|e| e.has_sessions())
        .map(|e| GanttRow {
            entity: e.id.clone(),
            intervals: e.sessions.clone(),
        })
        .collect()
}

/// Active days per entity.
pub fn day_gantt(view: &FilteredView) -> Vec<DayGanttRow> {
    view.entities
        .iter()
        .filter(|e| !e.days_active.is_empty())
        .map(|e| DayGanttRow {
            entity: e.id.clone(),
            days: e.days_active.iter().copied().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::query::{Query, Window, query};
    use crate::reconstruct::{ReconstructionConfig, reconstruct};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, day).unwrap()
    }

    fn id(name: &str) -> EntityId {
        EntityId::new(name).unwrap()
    }

    fn view_of(events: Vec<Event>) -> FilteredView {
        let timeline = reconstruct(events, ReconstructionConfig::default());
        query(&timeline, &Query::new(Window::from_dates(date(1), date(30))))
    }

    /// A: 10:20-12:10 on the 3rd; B: 11:05-11:30 on the 3rd and 23:00 on the 4th
    /// through 01:00 on the 5th.
    fn sample() -> FilteredView {
        view_of(vec![
            Event::join(at(3, 10, 20), id("A")),
            Event::join(at(3, 11, 5), id("B")),
            Event::leave(at(3, 11, 30), id("B")),
            Event::leave(at(3, 12, 10), id("A")),
            Event::join(at(4, 23, 0), id("B")),
            Event::leave(at(5, 1, 0), id("B")),
            Event::leave(at(5, 2, 0), id("ghost")),
        ])
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn hourly_counts_distinct_entities() {
        let series = hourly_active(&sample());

        assert_eq!(series.first().unwrap().0, at(3, 10, 0));
        assert_eq!(series.last().unwrap().0, at(5, 2, 0));
        let counts: Vec<usize> = series.iter().take(4).map(|(_, c)| *c).collect();
        assert_eq!(counts, vec![1, 2, 1, 0]);

        let overnight: Vec<usize> = series
            .iter()
            .filter(|(h, _)| *h >= at(4, 22, 0) && *h <= at(5, 2, 0))
            .map(|(_, c)| *c)
            .collect();
        assert_eq!(overnight, vec![0, 1, 1, 1, 0]);
    }

    #[test]
    fn daily_counts_use_active_days() {
        let series = daily_active(&sample());
        assert_eq!(series, vec![(date(3), 2), (date(4), 1), (date(5), 1)]);
    }

    #[test]
    fn trim_strips_sentinel_edges() {
        let series = vec![(1, 0), (2, 0), (3, 4), (4, 0), (5, 2), (6, 0)];
        assert_eq!(trim(&series, &0), vec![(3, 4), (4, 0), (5, 2)]);
    }

    #[test]
    fn trim_all_sentinel_is_empty() {
        assert!(trim(&[(1, 0), (2, 0)], &0).is_empty());
        assert!(trim::<i32, i32>(&[], &0).is_empty());
    }

    #[test]
    fn trim_is_idempotent() {
        let series = hourly_active(&sample());
        let once = trim(&series, &0);
        assert_eq!(trim(&once, &0), once);
    }

    #[test]
    fn totals_skip_zero_entities() {
        let totals = total_hours(&sample());
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].0.as_str(), "A");
        assert!(approx(totals[0].1, 110.0 / 60.0));
        assert!(approx(totals[1].1, 25.0 / 60.0 + 2.0));
    }

    #[test]
    fn day_counts_skip_empty() {
        let counts = day_counts(&sample());
        let counts: Vec<_> = counts.iter().map(|(e, c)| (e.as_str(), *c)).collect();
        assert_eq!(counts, vec![("A", 1), ("B", 3)]);
    }

    #[test]
    fn stacked_hours_attribute_to_start_day() {
        let stacked = daily_stacked_hours(&sample(), DayAttribution::StartDay);

        assert_eq!(stacked.days, vec![date(3), date(4), date(5)]);
        assert_eq!(stacked.rows.len(), 2);
        let b = &stacked.rows[1];
        assert_eq!(b.entity.as_str(), "B");
        assert!(approx(b.hours[0], 25.0 / 60.0));
        assert!(approx(b.hours[1], 2.0));
        assert!(approx(b.hours[2], 0.0));
    }

    #[test]
    fn stacked_hours_can_split_at_midnight() {
        let stacked = daily_stacked_hours(&sample(), DayAttribution::SplitAtMidnight);
        let b = &stacked.rows[1];
        assert!(approx(b.hours[1], 1.0));
        assert!(approx(b.hours[2], 1.0));
    }

    #[test]
    fn gantt_rows_omit_entities_without_sessions() {
        let view = sample();
        let rows = session_gantt(&view);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].intervals.len(), 2);

        let day_rows = day_gantt(&view);
        assert_eq!(day_rows[1].days, vec![date(3), date(4), date(5)]);
    }

    #[test]
    fn empty_stream_projects_to_empty_collections() {
        let view = view_of(Vec::new());

        assert!(hourly_active(&view).is_empty());
        assert!(daily_active(&view).is_empty());
        assert!(total_hours(&view).is_empty());
        assert!(day_counts(&view).is_empty());
        assert_eq!(
            daily_stacked_hours(&view, DayAttribution::StartDay),
            StackedHours::default()
        );
        assert!(session_gantt(&view).is_empty());
        assert!(day_gantt(&view).is_empty());
    }

    #[test]
    fn attribution_parses() {
        assert_eq!(
            "split_at_midnight".parse::<DayAttribution>().unwrap(),
            DayAttribution::SplitAtMidnight
        );
        assert!("evenly".parse::<DayAttribution>().is_err());
    }
}

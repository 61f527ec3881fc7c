//! Session reconstruction.
//!
//! Turns a globally ordered stream of join/leave/crash events into closed,
//! non-overlapping sessions per entity.
//!
//! # Algorithm Summary
//!
//! 1. Order all events by timestamp (stable, so ties keep input order)
//! 2. Feed each event to the per-entity [`SessionBuilder`]; a crash closes every
//!    open builder at the same instant
//! 3. Force-close whatever is still open at the terminal instant
//! 4. Freeze the result into a read-only [`Timeline`]

use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventKind};
use crate::query::Window;
use crate::session::{DayCoverage, EntityRecord, Session};
use crate::types::EntityId;

/// Where sessions still open at the end of the stream are closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "at")]
pub enum TerminalPolicy {
    /// Close at the latest observed event. Reproducible across runs.
    #[default]
    LastEvent,
    /// Close at a caller-supplied instant, e.g. "now" for a live view.
    At(NaiveDateTime),
}

/// Configuration for session reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructionConfig {
    /// Where leftover open sessions are closed.
    /// Default: the latest event timestamp.
    pub terminal: TerminalPolicy,

    /// Which dates a closed session marks active.
    /// Default: start and end dates only.
    pub day_coverage: DayCoverage,
}

/// Per-entity state machine.
///
/// The current open session is held explicitly rather than inferred from the
/// tail of the completed list.
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    current_open: Option<NaiveDateTime>,
    sessions: Vec<Session>,
    days_active: BTreeSet<NaiveDate>,
}

impl SessionBuilder {
    pub const fn is_open(&self) -> bool {
        self.current_open.is_some()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// `Closed + Join` opens; `Open + Join` closes the current session at `at`
    /// first (the missing leave is implied) and then opens a new one.
    pub fn join(&mut self, at: NaiveDateTime, coverage: DayCoverage) {
        if self.close_at(at, coverage) {
            tracing::trace!(%at, "implicit close on repeated join");
        }
        self.current_open = Some(at);
    }

    /// Closes the open session. Returns false for an orphan leave.
    pub fn leave(&mut self, at: NaiveDateTime, coverage: DayCoverage) -> bool {
        self.close_at(at, coverage)
    }

    /// Closes the open session at `at`, if there is one.
    ///
    /// An `at` earlier than the open session's start is clamped to the start so
    /// no session ends before it begins.
    pub fn close_at(&mut self, at: NaiveDateTime, coverage: DayCoverage) -> bool {
        let Some(start) = self.current_open.take() else {
            return false;
        };
        if at < start {
            tracing::warn!(%start, %at, "close before open; clamping to zero length");
        }
        let session = Session::new(start, at.max(start));
        coverage.mark(&session, &mut self.days_active);
        self.sessions.push(session);
        true
    }

    fn into_record(self, id: EntityId, metadata: Option<serde_json::Value>) -> EntityRecord {
        debug_assert!(self.current_open.is_none(), "open session at freeze");
        EntityRecord {
            id,
            sessions: self.sessions,
            days_active: self.days_active,
            metadata,
        }
    }
}

/// Owns all builders during ingestion and applies crash semantics across them.
#[derive(Debug, Default)]
pub struct Coordinator {
    config: ReconstructionConfig,
    /// Entity ids in first-appearance order.
    order: Vec<EntityId>,
    builders: HashMap<EntityId, SessionBuilder>,
    metadata: HashMap<EntityId, serde_json::Value>,
    first_event: Option<NaiveDateTime>,
    last_event: Option<NaiveDateTime>,
}

impl Coordinator {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Processes one event.
    ///
    /// Events should arrive in non-decreasing timestamp order; use
    /// [`Coordinator::ingest_all`] for unordered input. A late event is
    /// applied at the latest instant already seen.
    pub fn ingest(&mut self, event: &Event) {
        let at = match self.last_event {
            Some(last) if event.timestamp < last => {
                tracing::warn!(
                    timestamp = %event.timestamp,
                    %last,
                    "event out of order; clamping"
                );
                last
            }
            _ => event.timestamp,
        };
        self.first_event = Some(self.first_event.map_or(at, |first| first.min(at)));
        self.last_event = Some(self.last_event.map_or(at, |last| last.max(at)));

        let coverage = self.config.day_coverage;
        match &event.kind {
            EventKind::Join { entity } => {
                self.builder(entity).join(at, coverage);
            }
            EventKind::Leave { entity } => {
                if !self.builder(entity).leave(at, coverage) {
                    tracing::trace!(%entity, %at, "orphan leave discarded");
                }
            }
            EventKind::Crash => {
                let closed = self.close_all(at);
                tracing::debug!(%at, closed, "crash closed open sessions");
            }
        }
    }

    /// Orders `events` globally and processes them.
    pub fn ingest_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Event>,
    {
        let mut events: Vec<Event> = events.into_iter().collect();
        events.sort_by_key(|e| e.timestamp);
        for event in &events {
            self.ingest(event);
        }
    }

    /// Attaches opaque data to an entity, registering it if unseen.
    pub fn set_metadata(&mut self, entity: &EntityId, value: serde_json::Value) {
        self.builder(entity);
        self.metadata.insert(entity.clone(), value);
    }

    /// Finalizes every open session and freezes the result.
    pub fn finish(mut self) -> Timeline {
        let terminal = match self.config.terminal {
            TerminalPolicy::LastEvent => self.last_event,
            TerminalPolicy::At(at) => Some(at),
        };
        if let Some(at) = terminal {
            let closed = self.close_all(at);
            if closed > 0 {
                tracing::debug!(%at, closed, "force-closed sessions at end of stream");
            }
        }

        let span = self
            .first_event
            .zip(self.last_event)
            .map(|(start, end)| Window::new(start, end));

        let mut builders = self.builders;
        let mut metadata = self.metadata;
        let entities = self
            .order
            .into_iter()
            .map(|id| {
                let builder = builders.remove(&id).unwrap_or_default();
                let meta = metadata.remove(&id);
                builder.into_record(id, meta)
            })
            .collect();

        Timeline { entities, span }
    }

    fn builder(&mut self, entity: &EntityId) -> &mut SessionBuilder {
        if !self.builders.contains_key(entity) {
            self.order.push(entity.clone());
        }
        self.builders.entry(entity.clone()).or_default()
    }

    /// Closes every open session at one instant. Returns how many were closed.
    fn close_all(&mut self, at: NaiveDateTime) -> usize {
        let coverage = self.config.day_coverage;
        self.builders
            .values_mut()
            .filter(|b| b.is_open())
            .map(|b| b.close_at(at, coverage))
            .filter(|closed| *closed)
            .count()
    }
}

/// Frozen reconstruction result. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    entities: Vec<EntityRecord>,
    span: Option<Window>,
}

impl Timeline {
    /// Entities in first-appearance order.
    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.entities.iter().find(|e| &e.id == id)
    }

    /// Earliest and latest observed event, or `None` for an empty stream.
    pub const fn span(&self) -> Option<Window> {
        self.span
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Reconstructs sessions from an unordered collection of events.
pub fn reconstruct<I>(events: I, config: ReconstructionConfig) -> Timeline
where
    I: IntoIterator<Item = Event>,
{
    let mut coordinator = Coordinator::new(config);
    coordinator.ingest_all(events);
    coordinator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn id(name: &str) -> EntityId {
        EntityId::new(name).unwrap()
    }

    fn spans(timeline: &Timeline, name: &str) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        timeline
            .get(&id(name))
            .unwrap()
            .sessions
            .iter()
            .map(|s| (s.start, s.end))
            .collect()
    }

    fn assert_well_formed(timeline: &Timeline) {
        for entity in timeline.entities() {
            for s in &entity.sessions {
                assert!(s.end >= s.start, "{}: session ends before start", entity.id);
            }
            for pair in entity.sessions.windows(2) {
                assert!(pair[0].start <= pair[1].start, "{}: unsorted", entity.id);
                assert!(pair[0].end <= pair[1].start, "{}: overlap", entity.id);
            }
        }
    }

    #[test]
    fn leave_then_crash_closes_both_sessions() {
        let events = vec![
            Event::join(at(10, 0), id("A")),
            Event::leave(at(10, 30), id("A")),
            Event::join(at(11, 0), id("A")),
            Event::crash(at(11, 15)),
        ];

        let timeline = reconstruct(events, ReconstructionConfig::default());

        assert_eq!(
            spans(&timeline, "A"),
            vec![(at(10, 0), at(10, 30)), (at(11, 0), at(11, 15))]
        );
        let sessions = &timeline.get(&id("A")).unwrap().sessions;
        assert!((sessions[0].duration_minutes() - 30.0).abs() < f64::EPSILON);
        assert!((sessions[1].duration_minutes() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn repeated_join_closes_previous_session() {
        let events = vec![
            Event::join(at(9, 0), id("B")),
            Event::join(at(9, 10), id("B")),
        ];

        let config = ReconstructionConfig {
            terminal: TerminalPolicy::At(at(9, 40)),
            ..ReconstructionConfig::default()
        };
        let timeline = reconstruct(events, config);

        assert_eq!(
            spans(&timeline, "B"),
            vec![(at(9, 0), at(9, 10)), (at(9, 10), at(9, 40))]
        );
    }

    #[test]
    fn repeated_join_closed_at_last_event_by_default() {
        let events = vec![
            Event::join(at(9, 0), id("B")),
            Event::join(at(9, 10), id("B")),
        ];

        let timeline = reconstruct(events, ReconstructionConfig::default());

        assert_eq!(
            spans(&timeline, "B"),
            vec![(at(9, 0), at(9, 10)), (at(9, 10), at(9, 10))]
        );
    }

    #[test]
    fn orphan_leave_creates_no_session() {
        let timeline = reconstruct(
            vec![Event::leave(at(8, 0), id("C"))],
            ReconstructionConfig::default(),
        );

        let c = timeline.get(&id("C")).unwrap();
        assert!(c.sessions.is_empty());
        assert!(c.days_active.is_empty());
    }

    #[test]
    fn empty_stream_produces_empty_timeline() {
        let timeline = reconstruct(Vec::new(), ReconstructionConfig::default());
        assert!(timeline.is_empty());
        assert!(timeline.span().is_none());
    }

    #[test]
    fn crash_closes_everyone_at_same_instant() {
        let events = vec![
            Event::join(at(10, 0), id("A")),
            Event::join(at(10, 5), id("B")),
            Event::join(at(10, 7), id("C")),
            Event::leave(at(10, 8), id("C")),
            Event::crash(at(10, 20)),
            Event::join(at(10, 30), id("B")),
            Event::leave(at(10, 45), id("B")),
        ];

        let timeline = reconstruct(events, ReconstructionConfig::default());

        assert_eq!(spans(&timeline, "A"), vec![(at(10, 0), at(10, 20))]);
        assert_eq!(
            spans(&timeline, "B"),
            vec![(at(10, 5), at(10, 20)), (at(10, 30), at(10, 45))]
        );
        assert_eq!(spans(&timeline, "C"), vec![(at(10, 7), at(10, 8))]);
    }

    #[test]
    fn crash_with_nobody_open_is_noop() {
        let events = vec![
            Event::crash(at(7, 0)),
            Event::join(at(8, 0), id("A")),
            Event::leave(at(9, 0), id("A")),
        ];

        let timeline = reconstruct(events, ReconstructionConfig::default());
        assert_eq!(spans(&timeline, "A"), vec![(at(8, 0), at(9, 0))]);
        assert_eq!(timeline.span().unwrap().start, at(7, 0));
    }

    #[test]
    fn unordered_input_is_sorted_before_processing() {
        let events = vec![
            Event::leave(at(10, 30), id("A")),
            Event::crash(at(11, 15)),
            Event::join(at(10, 0), id("A")),
            Event::join(at(11, 0), id("A")),
        ];

        let timeline = reconstruct(events, ReconstructionConfig::default());
        assert_eq!(
            spans(&timeline, "A"),
            vec![(at(10, 0), at(10, 30)), (at(11, 0), at(11, 15))]
        );
    }

    #[test]
    fn no_session_left_open() {
        let events = vec![
            Event::join(at(1, 0), id("A")),
            Event::join(at(2, 0), id("B")),
            Event::join(at(3, 0), id("A")),
            Event::leave(at(4, 0), id("C")),
        ];

        let mut coordinator = Coordinator::new(ReconstructionConfig::default());
        coordinator.ingest_all(events);
        assert!(coordinator.builders.values().any(SessionBuilder::is_open));

        let timeline = coordinator.finish();
        let total: usize = timeline.entities().iter().map(|e| e.sessions.len()).sum();
        assert_eq!(total, 3);
        for entity in timeline.entities() {
            for s in &entity.sessions {
                assert!(s.end <= at(4, 0));
            }
        }
        assert_well_formed(&timeline);
    }

    #[test]
    fn degenerate_sequences_stay_well_formed() {
        let mut events = Vec::new();
        for i in 0..20u32 {
            let name = ["A", "B", "C"][(i % 3) as usize];
            let t = at(10, i * 2);
            events.push(match i % 5 {
                0 | 3 => Event::join(t, id(name)),
                1 | 4 => Event::leave(t, id(name)),
                _ => Event::crash(t),
            });
        }

        let timeline = reconstruct(events, ReconstructionConfig::default());
        assert_well_formed(&timeline);
    }

    #[test]
    fn entities_keep_first_appearance_order() {
        let events = vec![
            Event::leave(at(1, 0), id("zed")),
            Event::join(at(2, 0), id("amy")),
            Event::join(at(3, 0), id("Bob")),
        ];

        let timeline = reconstruct(events, ReconstructionConfig::default());
        let names: Vec<_> = timeline.entities().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(names, vec!["zed", "amy", "Bob"]);
    }

    #[test]
    fn cross_midnight_session_marks_both_dates() {
        let late = NaiveDate::from_ymd_opt(2024, 11, 3)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        let early = NaiveDate::from_ymd_opt(2024, 11, 4)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();

        let timeline = reconstruct(
            vec![Event::join(late, id("A")), Event::leave(early, id("A"))],
            ReconstructionConfig::default(),
        );

        let days: Vec<_> = timeline.get(&id("A")).unwrap().days_active.iter().copied().collect();
        assert_eq!(days, vec![late.date(), early.date()]);
    }

    #[test]
    fn metadata_passes_through() {
        let mut coordinator = Coordinator::new(ReconstructionConfig::default());
        coordinator.ingest(&Event::join(at(1, 0), id("A")));
        coordinator.set_metadata(&id("A"), serde_json::json!({"color": "#aabbcc"}));

        let timeline = coordinator.finish();
        assert_eq!(
            timeline.get(&id("A")).unwrap().metadata,
            Some(serde_json::json!({"color": "#aabbcc"}))
        );
    }

    #[test]
    fn builder_close_before_open_is_clamped() {
        let mut builder = SessionBuilder::default();
        builder.join(at(10, 0), DayCoverage::Endpoints);
        assert!(builder.close_at(at(9, 0), DayCoverage::Endpoints));
        assert_eq!(builder.sessions(), &[Session::new(at(10, 0), at(10, 0))]);
        assert!(!builder.is_open());
    }

    #[test]
    fn late_event_is_applied_at_latest_seen_instant() {
        let mut coordinator = Coordinator::new(ReconstructionConfig::default());
        coordinator.ingest(&Event::join(at(10, 0), id("A")));
        coordinator.ingest(&Event::join(at(9, 0), id("A")));
        coordinator.ingest(&Event::leave(at(11, 0), id("A")));

        let timeline = coordinator.finish();
        assert_well_formed(&timeline);
        assert_eq!(
            spans(&timeline, "A"),
            vec![(at(10, 0), at(10, 0)), (at(10, 0), at(11, 0))]
        );
        assert_eq!(timeline.span(), Some(Window::new(at(10, 0), at(11, 0))));
    }
}

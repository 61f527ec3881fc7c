//! Per-entity detail summaries.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::query::{EntityView, FilteredView};
use crate::session::Session;
use crate::types::EntityId;

/// Headline numbers for one entity inside a query window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub total_played_minutes: f64,
    pub days_played: usize,
    pub session_count: usize,
    pub average_session_minutes: f64,
}

impl EntitySummary {
    /// Summarizes a view, or `None` if it has no sessions in the window.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_view(view: &EntityView) -> Option<Self> {
        let first_seen = view.first_seen()?;
        let last_seen = view.last_seen()?;
        let session_count = view.sessions.len();
        let session_minutes: f64 = view.sessions.iter().map(Session::duration_minutes).sum();
        Some(Self {
            id: view.id.clone(),
            first_seen,
            last_seen,
            total_played_minutes: view.total_played_minutes,
            days_played: view.days_active.len(),
            session_count,
            average_session_minutes: session_minutes / session_count as f64,
        })
    }
}

/// Summaries for every entity with at least one session, in view order.
pub fn summarize(view: &FilteredView) -> Vec<EntitySummary> {
    view.entities
        .iter()
        .filter_map(EntitySummary::from_view)
        .collect()
}

/// Formats minutes as `{hours}H{minutes:02}`, e.g. `2H05`.
///
/// Hours are floored and the remainder rounded, so 59.6 minutes reads `0H60`.
pub fn format_played(minutes: f64) -> String {
    let minutes = minutes.max(0.0);
    let hours = (minutes / 60.0).floor();
    let rest = minutes % 60.0;
    format!("{hours:.0}H{rest:02.0}")
}

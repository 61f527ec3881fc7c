//! Core domain logic for the presence tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Reconstruction: turning join/leave/crash events into closed sessions per entity
//! - Queries: clipping, filtering and sorting sessions inside a time window
//! - Aggregation: chart-ready series and tables derived from a query result

pub mod aggregate;
pub mod event;
pub mod query;
pub mod reconstruct;
pub mod session;
pub mod summary;
mod types;

pub use aggregate::{DayAttribution, DayGanttRow, GanttRow, StackedHours, StackedRow};
pub use event::{Event, EventKind, merge_streams};
pub use query::{
    EntityView, Filter, FilterKind, FilteredView, Query, Sort, SortKey, Window, default_window,
    query,
};
pub use reconstruct::{
    Coordinator, ReconstructionConfig, SessionBuilder, TerminalPolicy, Timeline, reconstruct,
};
pub use session::{DayCoverage, EntityRecord, Session};
pub use summary::{EntitySummary, format_played, summarize};
pub use types::{EntityId, ValidationError};

//! Shared utilities for CLI commands.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use pt_core::{
    Event, Filter, FilteredView, Query, ReconstructionConfig, Sort, TerminalPolicy, Window,
    default_window, merge_streams, query, reconstruct,
};

use crate::cli::QueryArgs;
use crate::config::{Config, Terminal};

/// Parse a calendar date as ISO (2024-11-03) or day-first (03/11/2024).
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .map_err(|_| format!("invalid date: {s}. Use YYYY-MM-DD or DD/MM/YYYY"))
}

/// Parse JSONL events, one per line. Blank lines are skipped.
pub fn parse_events<R: BufRead>(reader: R, origin: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("{origin}: failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(trimmed)
            .with_context(|| format!("{origin}: invalid event on line {}", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn read_event_file(path: &Path) -> Result<Vec<Event>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    parse_events(BufReader::new(file), &path.display().to_string())
}

/// Load every event file as its own substream, or stdin when there are none.
pub fn load_substreams(files: &[PathBuf]) -> Result<Vec<Vec<Event>>> {
    if files.is_empty() {
        tracing::debug!("reading events from stdin");
        let stdin = io::stdin();
        return Ok(vec![parse_events(stdin.lock(), "stdin")?]);
    }
    files.iter().map(|p| read_event_file(p)).collect()
}

/// Resolve the reconstruction settings from flags and config.
pub fn reconstruction_config(args: &QueryArgs, config: &Config) -> ReconstructionConfig {
    let terminal = if args.now || config.terminal == Terminal::Now {
        TerminalPolicy::At(Local::now().naive_local())
    } else {
        TerminalPolicy::LastEvent
    };
    ReconstructionConfig {
        terminal,
        day_coverage: config.day_coverage,
    }
}

/// Resolve the query window. Missing ends fall back to the default view of the data.
pub fn resolve_window(args: &QueryArgs, span: Option<&Window>) -> Window {
    let today = Local::now().date_naive();
    let fallback = span.map_or_else(|| Window::from_dates(today, today), default_window);
    Window::from_dates(
        args.from.unwrap_or_else(|| fallback.start.date()),
        args.to.unwrap_or_else(|| fallback.end.date()),
    )
}

/// Build the query from flags and config.
pub fn build_query(args: &QueryArgs, config: &Config, window: Window) -> Query {
    let filter = Filter {
        kind: args.filter,
        min: args.min.unwrap_or(0.0),
        max: args.max.unwrap_or(0.0),
    };
    let sort = Sort {
        key: args.sort.unwrap_or(config.default_sort),
        descending: args.reverse,
    };
    Query::new(window).with_filter(filter).with_sort(sort)
}

/// Load events, reconstruct sessions and run the query.
pub fn load_view(args: &QueryArgs, config: &Config) -> Result<FilteredView> {
    let files = if args.events.is_empty() {
        config.events.as_slice()
    } else {
        args.events.as_slice()
    };
    let events = merge_streams(load_substreams(files)?);
    tracing::debug!(events = events.len(), "loaded events");

    let timeline = reconstruct(events, reconstruction_config(args, config));
    let window = resolve_window(args, timeline.span().as_ref());
    Ok(query(&timeline, &build_query(args, config, window)))
}

//! Server log extraction.
//!
//! Recognizes player join/leave lines and crash-report lines in game server
//! logs and turns them into [`Event`]s. Everything else in the log is ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use flate2::read::MultiGzDecoder;
use pt_core::{EntityId, Event};
use regex::Regex;

/// `[03Nov2024 10:00:00.123] [Server thread/INFO]: Steve joined the game`
static PRESENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(\d{2}[A-Za-z]{3}\d{4} \d{2}:\d{2}:\d{2}\.\d{3})\] ?(?:\[.*\])?:? ?([a-zA-Z0-9_]{1,20}) (joined|left) the game",
    )
    .unwrap()
});

/// `[03Nov2024 11:15:00.000] [Server thread/ERROR]: This crash report has been saved to: ...`
static CRASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(\d{2}[A-Za-z]{3}\d{4} \d{2}:\d{2}:\d{2}\.\d{3})\] ?(?:\[.*\])?:? ?This crash report has been saved to",
    )
    .unwrap()
});

const TIMESTAMP_FORMAT: &str = "%d%b%Y %H:%M:%S%.3f";

/// Archive formats that are not log files.
const SKIPPED_EXTENSIONS: &[&str] = &["zip", "tar", "rar"];

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Parses one log line into an event, if it is a presence or crash line.
pub fn parse_line(line: &str) -> Option<Event> {
    let line = line.trim();
    if let Some(caps) = PRESENCE_RE.captures(line) {
        let timestamp = parse_timestamp(&caps[1])?;
        let entity = EntityId::new(&caps[2]).ok()?;
        return Some(match &caps[3] {
            "joined" => Event::join(timestamp, entity),
            _ => Event::leave(timestamp, entity),
        });
    }
    let caps = CRASH_RE.captures(line)?;
    parse_timestamp(&caps[1]).map(Event::crash)
}

/// Reads every event from a log, decompressing `.gz` files.
pub fn read_log(path: &Path) -> Result<Vec<Event>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader: Box<dyn Read> = if has_extension(path, "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    parse_reader(BufReader::new(reader))
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Parses events from any line-oriented reader. Invalid UTF-8 is replaced.
pub fn parse_reader<R: BufRead>(mut reader: R) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut buf = Vec::new();
    let mut skipped = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        match parse_line(&line) {
            Some(event) => events.push(event),
            None => skipped += 1,
        }
    }
    tracing::trace!(events = events.len(), skipped, "parsed log");
    Ok(events)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Expands directories (non-recursively) and drops archive formats.
///
/// Directory entries are sorted by name so extraction order is stable.
pub fn collect_log_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("failed to list {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            out.extend(entries);
        } else {
            out.push(path.clone());
        }
    }
    out.retain(|p| {
        let skip = SKIPPED_EXTENSIONS.iter().any(|ext| has_extension(p, ext));
        if skip {
            tracing::debug!(path = %p.display(), "skipping archive");
        }
        !skip
    });
    Ok(out)
}

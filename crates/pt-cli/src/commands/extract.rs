//! Extract command: server logs in, ordered JSONL events out.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pt_core::{Event, merge_streams};

use crate::extract::{collect_log_paths, read_log};

/// Reads every log under `paths` and returns one globally ordered event list.
pub fn extract_events(paths: &[PathBuf]) -> Result<Vec<Event>> {
    let files = collect_log_paths(paths)?;
    let substreams = files
        .iter()
        .map(|path| read_log(path))
        .collect::<Result<Vec<_>>>()?;
    let events = merge_streams(substreams);
    tracing::info!(files = files.len(), events = events.len(), "extracted events");
    Ok(events)
}

/// Writes events as JSON lines.
pub fn write_events<W: Write>(mut writer: W, events: &[Event]) -> Result<()> {
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Runs the extract command.
pub fn run(paths: &[PathBuf], output: Option<&Path>) -> Result<usize> {
    let events = extract_events(paths)?;
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_events(BufWriter::new(file), &events)?;
        }
        None => write_events(io::stdout().lock(), &events)?,
    }
    Ok(events.len())
}

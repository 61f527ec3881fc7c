//! Report command for per-entity session summaries.
//!
//! This module implements `pt report` with human-readable and JSON output.

use std::fmt::Write;

use anyhow::Result;
use pt_core::{EntitySummary, FilteredView, Window, format_played, summarize};
use serde::Serialize;

use crate::cli::QueryArgs;
use crate::commands::util::load_view;
use crate::config::Config;

/// Computed report data.
#[derive(Debug, Serialize)]
pub struct ReportData {
    pub window: Window,
    pub entities: Vec<EntitySummary>,
}

impl ReportData {
    pub fn from_view(view: &FilteredView) -> Self {
        Self {
            window: view.window,
            entities: summarize(view),
        }
    }
}

/// Formats the human-readable report output.
pub fn format_report(data: &ReportData) -> String {
    let mut output = String::new();

    writeln!(
        output,
        "PRESENCE REPORT: {} to {}",
        data.window.start.date(),
        data.window.end.date()
    )
    .unwrap();

    if data.entities.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "No sessions in this window.").unwrap();
        return output;
    }

    for entity in &data.entities {
        writeln!(output).unwrap();
        writeln!(output, "{}", entity.id).unwrap();
        writeln!(output, "  First seen:       {}", entity.first_seen).unwrap();
        writeln!(output, "  Last seen:        {}", entity.last_seen).unwrap();
        writeln!(
            output,
            "  Total played:     {}",
            format_played(entity.total_played_minutes)
        )
        .unwrap();
        writeln!(output, "  Days played:      {}", entity.days_played).unwrap();
        writeln!(output, "  Sessions:         {}", entity.session_count).unwrap();
        writeln!(
            output,
            "  Average session:  {}",
            format_played(entity.average_session_minutes)
        )
        .unwrap();
    }

    let total: f64 = data.entities.iter().map(|e| e.total_played_minutes).sum();
    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(output, "  Entities:         {}", data.entities.len()).unwrap();
    writeln!(output, "  Total played:     {}", format_played(total)).unwrap();

    output
}

/// Formats report data as JSON.
pub fn format_report_json(data: &ReportData) -> Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Runs the report command.
pub fn run(args: &QueryArgs, config: &Config, json: bool) -> Result<()> {
    let view = load_view(args, config)?;
    let data = ReportData::from_view(&view);

    if json {
        let output = format_report_json(&data)?;
        println!("{output}");
    } else {
        let output = format_report(&data);
        print!("{output}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use insta::assert_snapshot;
    use pt_core::{EntityId, Event, Query, ReconstructionConfig, query, reconstruct};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn id(name: &str) -> EntityId {
        EntityId::new(name).unwrap()
    }

    fn november() -> Window {
        Window::from_dates(
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 30).unwrap(),
        )
    }

    #[test]
    fn test_report_empty_window() {
        let timeline = reconstruct(Vec::new(), ReconstructionConfig::default());
        let data = ReportData::from_view(&query(&timeline, &Query::new(november())));

        assert_snapshot!(format_report(&data), @r"
        PRESENCE REPORT: 2024-11-01 to 2024-11-30

        No sessions in this window.
        ");
    }

    #[test]
    fn test_report_two_entities() {
        let timeline = reconstruct(
            vec![
                Event::join(at(3, 10, 0), id("Steve")),
                Event::leave(at(3, 10, 30), id("Steve")),
                Event::join(at(4, 11, 0), id("Steve")),
                Event::join(at(4, 11, 5), id("alex")),
                Event::crash(at(4, 12, 0)),
            ],
            ReconstructionConfig::default(),
        );
        let data = ReportData::from_view(&query(&timeline, &Query::new(november())));

        assert_snapshot!(format_report(&data), @r"
        PRESENCE REPORT: 2024-11-01 to 2024-11-30

        Steve
          First seen:       2024-11-03 10:00:00
          Last seen:        2024-11-04 12:00:00
          Total played:     1H30
          Days played:      2
          Sessions:         2
          Average session:  0H45

        alex
          First seen:       2024-11-04 11:05:00
          Last seen:        2024-11-04 12:00:00
          Total played:     0H55
          Days played:      1
          Sessions:         1
          Average session:  0H55

        SUMMARY
          Entities:         2
          Total played:     2H25
        ");
    }

    #[test]
    fn test_report_json_lists_summaries() {
        let timeline = reconstruct(
            vec![
                Event::join(at(3, 10, 0), id("Steve")),
                Event::leave(at(3, 11, 0), id("Steve")),
            ],
            ReconstructionConfig::default(),
        );
        let data = ReportData::from_view(&query(&timeline, &Query::new(november())));

        let json: serde_json::Value =
            serde_json::from_str(&format_report_json(&data).unwrap()).unwrap();
        assert_eq!(json["entities"][0]["id"], "Steve");
        assert_eq!(json["entities"][0]["session_count"], 1);
        assert_eq!(json["entities"][0]["total_played_minutes"], 60.0);
        assert_eq!(json["window"]["start"], "2024-11-01T00:00:00");
    }
}

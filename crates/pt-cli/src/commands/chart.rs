//! Chart command: emits projection data as JSON for an external renderer.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use pt_core::aggregate::{
    daily_active, daily_stacked_hours, day_counts, day_gantt, hourly_active, session_gantt,
    total_hours, trim,
};
use pt_core::{DayAttribution, EntityId, FilteredView};
use serde::Serialize;

use crate::cli::{ChartKind, QueryArgs};
use crate::commands::util::load_view;
use crate::config::Config;

#[derive(Debug, Serialize)]
struct HourBucket {
    hour: NaiveDateTime,
    active: usize,
}

#[derive(Debug, Serialize)]
struct DayBucket {
    day: NaiveDate,
    active: usize,
}

#[derive(Debug, Serialize)]
struct EntityHours {
    entity: EntityId,
    hours: f64,
}

#[derive(Debug, Serialize)]
struct EntityDays {
    entity: EntityId,
    days: usize,
}

/// Computes one chart's data as a JSON value.
pub fn chart_data(
    view: &FilteredView,
    kind: ChartKind,
    attribution: DayAttribution,
    trim_edges: bool,
) -> Result<serde_json::Value> {
    let value = match kind {
        ChartKind::Sessions => serde_json::to_value(session_gantt(view))?,
        ChartKind::Days => serde_json::to_value(day_gantt(view))?,
        ChartKind::Hourly => {
            let mut series = hourly_active(view);
            if trim_edges {
                series = trim(&series, &0);
            }
            let buckets: Vec<HourBucket> = series
                .into_iter()
                .map(|(hour, active)| HourBucket { hour, active })
                .collect();
            serde_json::to_value(buckets)?
        }
        ChartKind::Daily => {
            let mut series = daily_active(view);
            if trim_edges {
                series = trim(&series, &0);
            }
            let buckets: Vec<DayBucket> = series
                .into_iter()
                .map(|(day, active)| DayBucket { day, active })
                .collect();
            serde_json::to_value(buckets)?
        }
        ChartKind::Stacked => serde_json::to_value(daily_stacked_hours(view, attribution))?,
        ChartKind::Totals => {
            let rows: Vec<EntityHours> = total_hours(view)
                .into_iter()
                .map(|(entity, hours)| EntityHours { entity, hours })
                .collect();
            serde_json::to_value(rows)?
        }
        ChartKind::DayCounts => {
            let rows: Vec<EntityDays> = day_counts(view)
                .into_iter()
                .map(|(entity, days)| EntityDays { entity, days })
                .collect();
            serde_json::to_value(rows)?
        }
    };
    Ok(value)
}

/// Runs the chart command.
pub fn run(args: &QueryArgs, config: &Config, kind: ChartKind, no_trim: bool) -> Result<()> {
    let view = load_view(args, config)?;
    let data = chart_data(&view, kind, config.day_attribution, !no_trim)?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

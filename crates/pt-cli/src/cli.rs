//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pt_core::{FilterKind, SortKey};

use crate::commands::util::parse_date;

/// Presence tracker.
///
/// Rebuilds who-was-online sessions from server join/leave logs and reports
/// play time, active days and activity over time.
#[derive(Debug, Parser)]
#[command(name = "pt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract join/leave/crash events from server logs as JSONL.
    Extract {
        /// Log files or directories (plain text or .gz).
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Write events here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show per-entity session summaries for a window.
    Report {
        #[command(flatten)]
        query: QueryArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Emit chart data as JSON.
    Chart {
        /// Which projection to compute.
        #[arg(value_enum)]
        kind: ChartKind,

        #[command(flatten)]
        query: QueryArgs,

        /// Keep empty buckets at the edges of hourly/daily series.
        #[arg(long)]
        no_trim: bool,
    },
}

/// Chart projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChartKind {
    /// Session intervals per entity.
    Sessions,
    /// Active days per entity.
    Days,
    /// Distinct active entities per hour.
    Hourly,
    /// Distinct active entities per day.
    Daily,
    /// Hours per entity per day.
    Stacked,
    /// Total hours per entity.
    Totals,
    /// Active day count per entity.
    DayCounts,
}

/// Window, filter and sort options shared by report and chart.
#[derive(Debug, Clone, Default, Args)]
pub struct QueryArgs {
    /// JSONL event files, one substream each. Reads stdin when none are given.
    #[arg(short, long = "events", value_name = "FILE")]
    pub events: Vec<PathBuf>,

    /// First day of the window (YYYY-MM-DD or DD/MM/YYYY).
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Last day of the window, inclusive.
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// Metric bounded by --min/--max: time (hours) or days.
    #[arg(long, default_value_t = FilterKind::TotalTime)]
    pub filter: FilterKind,

    /// Lower bound; 0 or less disables it.
    #[arg(long)]
    pub min: Option<f64>,

    /// Upper bound; 0 or less disables it.
    #[arg(long)]
    pub max: Option<f64>,

    /// Sort by name, first, last, time or days.
    #[arg(long)]
    pub sort: Option<SortKey>,

    /// Reverse the sort order.
    #[arg(long)]
    pub reverse: bool,

    /// Close sessions still open at the current time instead of the last event.
    #[arg(long)]
    pub now: bool,
}

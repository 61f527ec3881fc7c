//! CLI subcommand implementations.

pub mod chart;
pub mod extract;
pub mod report;
pub mod util;

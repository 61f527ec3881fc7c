//! Presence tracker CLI library.
//!
//! This crate provides the CLI interface for the presence tracker: it turns
//! server logs into events, feeds them to `pt-core`, and prints the results.

mod cli;
pub mod commands;
mod config;
pub mod extract;

pub use cli::{ChartKind, Cli, Commands, QueryArgs};
pub use config::{Config, Terminal};

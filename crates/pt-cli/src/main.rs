use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pt_cli::commands::{chart, extract, report};
use pt_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Extract { paths, output }) => {
            let count = extract::run(paths, output.as_deref())?;
            tracing::debug!(count, "extract complete");
        }
        Some(Commands::Report { query, json }) => {
            let config = load_config(&cli)?;
            report::run(query, &config, *json)?;
        }
        Some(Commands::Chart {
            kind,
            query,
            no_trim,
        }) => {
            let config = load_config(&cli)?;
            chart::run(query, &config, *kind, *no_trim)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

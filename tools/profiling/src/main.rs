#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]

//! CLI for the query profiling harness

use anyhow::{Context, Result};
use clap::Parser;
use query_profiler::batch::BatchDriver;
use query_profiler::cli::Cli;
use query_profiler::report::{self, Report};
use query_profiler::{Mode, QuerySource, RunExecutor, platform_leak_checker};
use std::process;
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    let config = Cli::parse()
        .into_config()
        .context("invalid profiling setup")?;

    let queries = config
        .source()
        .discover()
        .context("failed to discover queries")?;

    if queries.is_empty() {
        if matches!(config.source(), QuerySource::Config(_)) {
            println!("Config does not contain any scheduledQueries.");
        } else {
            println!("No queries to profile.");
        }
        return Ok(());
    }

    info!(queries = queries.len(), shell = %config.shell().display(), "starting");

    let mut driver = BatchDriver::new(config.shell(), std::io::stdout());

    let report = match config.mode() {
        Mode::Leaks => {
            let checker = platform_leak_checker(config.suppressions().map(Into::into));
            Report::Leaks(driver.profile_leaks(checker.as_ref(), &queries, config.count()))
        }
        Mode::Performance => {
            let mut executor = RunExecutor::system();
            Report::Performance(driver.profile(
                &mut executor,
                &queries,
                config.rounds(),
                &config.run_limits(),
            ))
        }
    };

    info!(profiled = report.len(), total = queries.len(), "finished");

    report::write_report(&report, config.output(), config.summary())
        .context("failed to write report")?;

    Ok(())
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Command line definitions using clap.

use crate::config::{Mode, OutputTarget, ProfilingConfig, QuerySource};
use crate::error::Result;
use crate::queries::current_platform;
use clap::Parser;
use std::path::PathBuf;

/// Profile osquery queries, tables, or the scheduled queries of a config
#[derive(Parser, Debug)]
#[command(name = "query-profile")]
#[command(version)]
#[command(
    about = "Profile the CPU, memory, and file descriptor cost of queries, or check them for leaks"
)]
pub struct Cli {
    /// Skip the comma-separated tables
    #[arg(long, default_value = "")]
    pub restrict: String,

    /// Path to the table specs
    #[arg(long, default_value = "./osquery/tables/specs")]
    pub tables: PathBuf,

    /// Use scheduled queries from a config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write JSON output to a file, or `-` for stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write severity ranks instead of stats
    #[arg(long, default_value_t = false)]
    pub summary: bool,

    /// Profile a single query
    #[arg(long)]
    pub query: Option<String>,

    /// Max seconds a query may run --count times (0 for no limit)
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// Number of times to run each query
    #[arg(long, default_value_t = 1)]
    pub count: u32,

    /// Run the profile for multiple rounds and use the average
    #[arg(long, default_value_t = 1)]
    pub rounds: u32,

    /// Check for memory leaks instead of performance
    #[arg(long, default_value_t = false)]
    pub leaks: bool,

    /// Suppressions file for memory leak checking
    #[arg(long)]
    pub suppressions: Option<PathBuf>,

    /// Path to the query shell [default: ./build/<platform>/tools/run]
    #[arg(long)]
    pub shell: Option<PathBuf>,
}

impl Cli {
    /// Shell path, falling back to the platform build directory
    #[must_use]
    pub fn shell_path(&self) -> PathBuf {
        self.shell.clone().unwrap_or_else(|| {
            PathBuf::from(format!("./build/{}/tools/run", current_platform()))
        })
    }

    /// Query source; a config wins over a single query, which wins over tables
    #[must_use]
    pub fn query_source(&self) -> QuerySource {
        match (&self.config, &self.query) {
            (Some(path), _) => QuerySource::Config(path.clone()),
            (None, Some(query)) => QuerySource::Manual(query.clone()),
            (None, None) => QuerySource::Tables {
                root: self.tables.clone(),
                platform: current_platform().to_string(),
                restrict: self.restrict.clone(),
            },
        }
    }

    /// Validate arguments into a profiling configuration
    ///
    /// # Errors
    ///
    /// Returns a setup error if any path is missing or a count is invalid
    pub fn into_config(self) -> Result<ProfilingConfig> {
        let mode = if self.leaks {
            Mode::Leaks
        } else {
            Mode::Performance
        };

        let config = ProfilingConfig::new(
            self.shell_path(),
            self.query_source(),
            self.count,
            self.rounds,
        )?
        .with_timeout_secs(self.timeout)
        .with_mode(mode)
        .with_output(OutputTarget::from_arg(self.output.as_deref()), self.summary);

        match self.suppressions {
            Some(file) => config.with_suppressions(file),
            None => Ok(config),
        }
    }
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Validated configuration for a profiling invocation

use crate::error::{ProfilingError, Result};
use crate::queries::{self, QuerySet};
use crate::runner::RunLimits;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to measure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Resource usage averaged over rounds
    Performance,
    /// Leak summaries from the platform leak checker
    Leaks,
}

/// Where queries come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// `scheduledQueries` of a config document
    Config(PathBuf),
    /// One query given by hand
    Manual(String),
    /// `SELECT *` over every table spec of a platform
    Tables {
        root: PathBuf,
        platform: String,
        restrict: String,
    },
}

impl QuerySource {
    /// Resolve the query set
    ///
    /// # Errors
    ///
    /// Returns a setup error if the config or spec directory is missing or invalid.
    pub fn discover(&self) -> Result<QuerySet> {
        match self {
            Self::Config(path) => queries::queries_from_config(path),
            Self::Manual(query) => Ok(queries::manual_query(query)),
            Self::Tables {
                root,
                platform,
                restrict,
            } => queries::queries_from_tables(root, platform, restrict),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Config(path) if !path.exists() => {
                Err(ProfilingError::ConfigNotFound(path.clone()))
            }
            Self::Tables { root, .. } if !root.exists() => {
                Err(ProfilingError::TablesNotFound(root.clone()))
            }
            Self::Manual(query) if query.trim().is_empty() => Err(ProfilingError::InvalidConfig(
                "query cannot be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Report destination
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// Progress lines only
    #[default]
    None,
    /// JSON report on standard output
    Stdout,
    /// JSON report written to a file
    File(PathBuf),
}

impl OutputTarget {
    /// Interpret an `--output` value; `-` means standard output
    #[must_use]
    pub fn from_arg(arg: Option<&Path>) -> Self {
        match arg {
            None => Self::None,
            Some(path) if path.as_os_str() == "-" => Self::Stdout,
            Some(path) => Self::File(path.to_path_buf()),
        }
    }
}

/// Configuration for a profiling invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingConfig {
    /// Query shell to launch
    shell: PathBuf,

    /// Where queries come from
    source: QuerySource,

    /// Performance or leak mode
    mode: Mode,

    /// Per-run timeout, `None` for unlimited
    timeout: Option<Duration>,

    /// Iterations per run, and query repetitions in leak mode
    count: u32,

    /// Runs averaged per query
    rounds: NonZeroU32,

    /// Memcheck suppressions file
    suppressions: Option<PathBuf>,

    /// Report destination
    output: OutputTarget,

    /// Write ranks instead of raw values
    summary: bool,
}

impl ProfilingConfig {
    /// Create a validated configuration
    ///
    /// # Arguments
    ///
    /// * `shell` - The query shell binary
    /// * `source` - Where queries come from
    /// * `count` - Iterations per run (must be at least 1)
    /// * `rounds` - Runs averaged per query (must be at least 1)
    ///
    /// # Errors
    ///
    /// Returns a setup error if:
    /// - The shell does not exist
    /// - The config file or table spec directory does not exist
    /// - `count` or `rounds` is zero
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use query_profiler::{ProfilingConfig, QuerySource};
    /// # use std::path::PathBuf;
    /// let config = ProfilingConfig::new(
    ///     PathBuf::from("./build/linux/tools/run"),
    ///     QuerySource::Manual("SELECT * FROM time;".to_string()),
    ///     1,
    ///     3,
    /// );
    /// ```
    pub fn new(shell: PathBuf, source: QuerySource, count: u32, rounds: u32) -> Result<Self> {
        Self::validate_shell(&shell)?;
        source.validate()?;
        Self::validate_count(count)?;
        let rounds = Self::validate_rounds(rounds)?;

        Ok(Self {
            shell,
            source,
            mode: Mode::Performance,
            timeout: None,
            count,
            rounds,
            suppressions: None,
            output: OutputTarget::None,
            summary: false,
        })
    }

    /// Set the per-run timeout in seconds; 0 disables it
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = if secs == 0 {
            None
        } else {
            Some(Duration::from_secs(secs))
        };
        self
    }

    /// Check leaks instead of measuring performance
    #[must_use]
    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a memcheck suppressions file
    ///
    /// # Errors
    ///
    /// Returns error if the file does not exist
    pub fn with_suppressions(mut self, file: PathBuf) -> Result<Self> {
        if !file.exists() {
            return Err(ProfilingError::InvalidConfig(format!(
                "suppressions file not found: {}",
                file.display()
            )));
        }
        self.suppressions = Some(file);
        Ok(self)
    }

    /// Set the report destination and whether to reduce it to ranks
    #[must_use]
    pub fn with_output(mut self, output: OutputTarget, summary: bool) -> Self {
        self.output = output;
        self.summary = summary;
        self
    }

    /// Get the shell path
    #[must_use]
    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Get the query source
    #[must_use]
    pub const fn source(&self) -> &QuerySource {
        &self.source
    }

    /// Get the mode
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Get the timeout
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Get the iteration count
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Get the number of rounds
    #[must_use]
    pub const fn rounds(&self) -> NonZeroU32 {
        self.rounds
    }

    /// Get the suppressions file
    #[must_use]
    pub fn suppressions(&self) -> Option<&Path> {
        self.suppressions.as_deref()
    }

    /// Get the report destination
    #[must_use]
    pub const fn output(&self) -> &OutputTarget {
        &self.output
    }

    /// Whether the report is reduced to ranks
    #[must_use]
    pub const fn summary(&self) -> bool {
        self.summary
    }

    /// Limits for each run
    #[must_use]
    pub const fn run_limits(&self) -> RunLimits {
        RunLimits::new(self.timeout, self.count)
    }

    /// Validate the shell path
    fn validate_shell(shell: &Path) -> Result<()> {
        if shell.exists() {
            Ok(())
        } else {
            Err(ProfilingError::ShellNotFound(shell.to_path_buf()))
        }
    }

    /// Validate the iteration count
    fn validate_count(count: u32) -> Result<()> {
        if count == 0 {
            Err(ProfilingError::InvalidConfig(
                "count must be greater than 0".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Validate the number of rounds
    fn validate_rounds(rounds: u32) -> Result<NonZeroU32> {
        NonZeroU32::new(rounds).ok_or_else(|| {
            ProfilingError::InvalidConfig("rounds must be greater than 0".to_string())
        })
    }
}

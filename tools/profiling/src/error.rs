#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Error types for the query profiler.
//!
//! Setup errors are fatal and surface before any query is launched. Sampling
//! errors only end a poll loop. Everything else is local to one query and is
//! logged by the batch driver without aborting the batch.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while profiling queries
#[derive(Debug, Error)]
pub enum ProfilingError {
    // Setup errors
    #[error("cannot find query shell: {}", .0.display())]
    ShellNotFound(PathBuf),

    #[error("cannot find table specs: {}", .0.display())]
    TablesNotFound(PathBuf),

    #[error("cannot find config: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("cannot parse config '{path}': {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Sampling errors
    #[error("process {0} is gone")]
    ProcessGone(u32),

    #[error("access denied reading metrics for process {0}")]
    AccessDenied(u32),

    #[error("failed to parse metrics: {0}")]
    MetricsParse(String),

    // Execution errors
    #[error("failed to spawn process: {0}")]
    ProcessSpawnFailed(String),

    #[error("failed to control process: {0}")]
    ProcessControl(String),

    #[error("leak tool failed: {0}")]
    LeakToolFailed(String),

    // Output errors
    #[error("failed to write report: {0}")]
    ReportWrite(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProfilingError {
    /// Create a config parse error.
    pub fn config_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error happened while validating inputs, before profiling began.
    #[must_use]
    pub const fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::ShellNotFound(_)
                | Self::TablesNotFound(_)
                | Self::ConfigNotFound(_)
                | Self::ConfigParse { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// Whether this error means the sampled process can no longer be observed.
    ///
    /// The poll loop treats these as "no more samples", never as a failure.
    #[must_use]
    pub const fn ends_sampling(&self) -> bool {
        matches!(self, Self::ProcessGone(_) | Self::AccessDenied(_))
    }
}

/// Result type for profiler operations
pub type Result<T> = std::result::Result<T, ProfilingError>;

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]

//! Query profiling harness
//!
//! Launches a query shell once per round, samples its CPU, memory, and file
//! descriptors until it exits or times out, averages the rounds, and ranks
//! the averages against fixed severity thresholds. A leak mode runs each
//! query under the platform's leak checker instead.

pub mod batch;
pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod leaks;
pub mod metrics;
pub mod process;
pub mod queries;
pub mod report;
pub mod rounds;
pub mod runner;
pub mod system_metrics;

pub use batch::BatchDriver;
pub use classify::{Metric, classify};
pub use config::{Mode, OutputTarget, ProfilingConfig, QuerySource};
pub use error::{ProfilingError, Result};
pub use leaks::{LeakChecker, LeakSummary, platform_leak_checker};
pub use metrics::{MetricsProvider, MetricsSource, ProcfsProvider, Sample, platform_provider};
pub use queries::QuerySet;
pub use report::Report;
pub use rounds::{AggregatedResult, aggregate};
pub use runner::{QueryRunner, RunExecutor, RunLimits, RunResult};
pub use system_metrics::SysinfoProvider;

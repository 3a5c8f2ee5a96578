#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Run executor: launch one query, poll its metrics, reduce to a result

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::metrics::{MetricsProvider, Sample, platform_provider};
use crate::process::{ProfiledProcess, query_args};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval between samples; each sample blocks for this long
pub const POLL_STEP: Duration = Duration::from_millis(500);

/// Subtracted from wall time: the startup delay plus one unit of slack.
/// Thresholds are calibrated against this offset, and the timeout deadline
/// is extended by the same amount.
pub const SETTLE_OFFSET: Duration = Duration::from_secs(2);

/// Measurements for one execution of one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Average of the non-zero utilization samples (percent)
    pub utilization: f64,

    /// Wall time in seconds, less [`SETTLE_OFFSET`]
    pub duration: f64,

    /// Resident memory at the last sample (bytes)
    pub memory: u64,

    pub user_time: f64,

    pub system_time: f64,

    /// Always `user_time + system_time`
    pub cpu_time: f64,

    /// Open file descriptors at the last sample
    pub fds: u64,
}

impl RunResult {
    /// Reduce the samples of one run.
    ///
    /// `last` is the final successfully captured sample; when the process
    /// exited before any sample was taken its fields are zero.
    #[must_use]
    pub fn from_samples(utilization: &[f64], last: Option<&Sample>, duration: f64) -> Self {
        let last = last.cloned().unwrap_or_default();
        let user_time = last.cpu_times.user;
        let system_time = last.cpu_times.system;

        Self {
            utilization: average_nonzero(utilization),
            duration,
            memory: last.memory_rss,
            user_time,
            system_time,
            cpu_time: user_time + system_time,
            fds: last.fds,
        }
    }
}

/// Mean of the non-zero values, or 0 when there are none
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_nonzero(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| **v != 0.0)
        .fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Limits applied to a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Kill the query once it runs this long past the settle offset
    pub timeout: Option<Duration>,

    /// Number of times the shell executes the query
    pub iterations: u32,
}

impl RunLimits {
    /// Create limits; a zero timeout means no timeout
    #[must_use]
    pub const fn new(timeout: Option<Duration>, iterations: u32) -> Self {
        Self {
            timeout,
            iterations,
        }
    }

    /// Instant after which the run is killed
    #[must_use]
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.timeout
            .filter(|t| !t.is_zero())
            .map(|t| start + t + SETTLE_OFFSET)
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self::new(None, 1)
    }
}

/// Anything that can execute a query once and measure it
pub trait QueryRunner {
    /// Execute `query` through `shell` once.
    ///
    /// # Errors
    ///
    /// Returns an error only if the run could not be started.
    fn run(&mut self, shell: &Path, query: &str, limits: &RunLimits) -> Result<RunResult>;
}

/// Launches the query shell and samples it until exit or timeout
pub struct RunExecutor<P = Box<dyn MetricsProvider>, C = SystemClock> {
    provider: P,
    clock: C,
    step: Duration,
}

impl RunExecutor {
    /// Executor using the host's metrics source and the system clock
    #[must_use]
    pub fn system() -> Self {
        Self::new(platform_provider(), SystemClock)
    }
}

impl<P: MetricsProvider, C: Clock> RunExecutor<P, C> {
    /// Create an executor sampling every [`POLL_STEP`]
    #[must_use]
    pub const fn new(provider: P, clock: C) -> Self {
        Self {
            provider,
            clock,
            step: POLL_STEP,
        }
    }

    /// Override the sampling step
    #[must_use]
    pub const fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Run `query` once and reduce its samples.
    ///
    /// Sampling stops when the process exits, when it can no longer be
    /// read, or when the deadline passes (the process is then killed).
    /// Overshoot past the deadline is at most one sampling step.
    ///
    /// # Errors
    ///
    /// Returns error if the shell cannot be spawned.
    pub fn execute(&mut self, shell: &Path, query: &str, limits: &RunLimits) -> Result<RunResult> {
        let mut process = ProfiledProcess::spawn(shell, &query_args(query, Some(limits.iterations)))?;
        let pid = process.pid();
        let start = self.clock.now();
        let deadline = limits.deadline_from(start);

        let mut utilization = Vec::new();
        let mut last: Option<Sample> = None;
        let mut timed_out = false;

        loop {
            match process.is_running() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(pid, error = %e, "cannot poll query process, stopping");
                    break;
                }
            }

            match self.provider.sample(pid, self.step) {
                Ok(sample) => {
                    debug!(pid, utilization = sample.utilization, rss = sample.memory_rss, "sample");
                    utilization.push(sample.utilization);
                    last = Some(sample);
                }
                Err(e) if e.ends_sampling() => {
                    debug!(pid, reason = %e, "process no longer observable");
                    break;
                }
                Err(e) => {
                    warn!(pid, error = %e, "sample failed, keeping last known values");
                    break;
                }
            }

            if deadline.is_some_and(|d| self.clock.now() >= d) {
                timed_out = true;
                break;
            }
        }

        // An exited process was already reaped by `is_running`
        if matches!(process.is_running(), Ok(true)) {
            if timed_out {
                warn!(pid, timeout = ?limits.timeout, "query timed out, killing");
            } else {
                debug!(pid, "stopped observing a live query, killing");
            }
            if let Err(e) = process.kill() {
                warn!(pid, error = %e, "failed to kill query process");
            }
        }

        if last.is_none() {
            debug!(pid, "no sample captured, reporting zeroed metrics");
        }

        let elapsed = self.clock.now().saturating_duration_since(start);
        let duration = elapsed.as_secs_f64() - SETTLE_OFFSET.as_secs_f64();

        Ok(RunResult::from_samples(&utilization, last.as_ref(), duration))
    }
}

impl<P: MetricsProvider, C: Clock> QueryRunner for RunExecutor<P, C> {
    fn run(&mut self, shell: &Path, query: &str, limits: &RunLimits) -> Result<RunResult> {
        self.execute(shell, query, limits)
    }
}

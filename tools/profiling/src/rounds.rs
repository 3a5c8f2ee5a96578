#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Round aggregation: repeat a query and average the measurements

use crate::error::Result;
use crate::runner::{QueryRunner, RunLimits, RunResult};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;
use tracing::debug;

/// Per-field arithmetic mean of the runs of one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub utilization: f64,
    pub duration: f64,
    pub memory: f64,
    pub user_time: f64,
    pub system_time: f64,
    pub cpu_time: f64,
    pub fds: f64,
}

impl AggregatedResult {
    /// Average a set of runs. Returns `None` for an empty set.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(runs: &[RunResult]) -> Option<Self> {
        if runs.is_empty() {
            return None;
        }
        let n = runs.len() as f64;
        let avg = |field: fn(&RunResult) -> f64| runs.iter().map(field).sum::<f64>() / n;

        Some(Self {
            utilization: avg(|r| r.utilization),
            duration: avg(|r| r.duration),
            memory: avg(|r| r.memory as f64),
            user_time: avg(|r| r.user_time),
            system_time: avg(|r| r.system_time),
            cpu_time: avg(|r| r.cpu_time),
            fds: avg(|r| r.fds as f64),
        })
    }

    /// Named numeric fields, in display order
    #[must_use]
    pub const fn fields(&self) -> [(&'static str, f64); 7] {
        [
            ("utilization", self.utilization),
            ("duration", self.duration),
            ("memory", self.memory),
            ("user_time", self.user_time),
            ("system_time", self.system_time),
            ("cpu_time", self.cpu_time),
            ("fds", self.fds),
        ]
    }
}

impl From<&RunResult> for AggregatedResult {
    #[allow(clippy::cast_precision_loss)]
    fn from(run: &RunResult) -> Self {
        Self {
            utilization: run.utilization,
            duration: run.duration,
            memory: run.memory as f64,
            user_time: run.user_time,
            system_time: run.system_time,
            cpu_time: run.cpu_time,
            fds: run.fds as f64,
        }
    }
}

/// Run `query` `rounds` times in sequence and average the results.
///
/// `on_round` sees each round's result (1-based index) before the average is
/// taken; it is for progress output only.
///
/// # Errors
///
/// Returns the first error from the runner; remaining rounds are skipped.
pub fn aggregate<R, F>(
    runner: &mut R,
    shell: &Path,
    query: &str,
    rounds: NonZeroU32,
    limits: &RunLimits,
    mut on_round: F,
) -> Result<AggregatedResult>
where
    R: QueryRunner + ?Sized,
    F: FnMut(u32, &RunResult),
{
    let runs = (1..=rounds.get())
        .map(|round| {
            let result = runner.run(shell, query, limits)?;
            debug!(round, total = rounds.get(), ?result, "round complete");
            on_round(round, &result);
            Ok(result)
        })
        .collect::<Result<Vec<_>>>()?;

    // At least one round always ran
    Ok(AggregatedResult::mean(&runs).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::error::ProfilingError;
    use std::time::{Duration, Instant};

    /// Runner returning canned results and recording call intervals
    struct CannedRunner {
        results: Vec<RunResult>,
        calls: Vec<(Instant, Instant, String)>,
        fail_on: Option<usize>,
    }

    impl CannedRunner {
        fn new(results: Vec<RunResult>) -> Self {
            Self {
                results,
                calls: Vec::new(),
                fail_on: None,
            }
        }
    }

    impl QueryRunner for CannedRunner {
        fn run(&mut self, _shell: &Path, query: &str, _limits: &RunLimits) -> Result<RunResult> {
            let idx = self.calls.len();
            let begin = Instant::now();
            std::thread::sleep(Duration::from_millis(2));
            self.calls.push((begin, Instant::now(), query.to_string()));
            if self.fail_on == Some(idx) {
                return Err(ProfilingError::ProcessSpawnFailed("boom".to_string()));
            }
            Ok(self.results[idx % self.results.len()])
        }
    }

    fn run(utilization: f64, duration: f64, memory: u64, user: f64, system: f64, fds: u64) -> RunResult {
        RunResult {
            utilization,
            duration,
            memory,
            user_time: user,
            system_time: system,
            cpu_time: user + system,
            fds,
        }
    }

    fn rounds(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn test_mean_of_each_field() {
        let runs = [
            run(10.0, 1.0, 1000, 0.1, 0.2, 4),
            run(20.0, 2.0, 2000, 0.3, 0.4, 6),
            run(30.0, 3.0, 6000, 0.5, 0.0, 11),
        ];
        let avg = AggregatedResult::mean(&runs).unwrap();

        assert!((avg.utilization - 20.0).abs() < 1e-9);
        assert!((avg.duration - 2.0).abs() < 1e-9);
        assert!((avg.memory - 3000.0).abs() < 1e-9);
        assert!((avg.user_time - 0.3).abs() < 1e-9);
        assert!((avg.system_time - 0.2).abs() < 1e-9);
        assert!((avg.cpu_time - 0.5).abs() < 1e-9);
        assert!((avg.fds - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_of_nothing() {
        assert!(AggregatedResult::mean(&[]).is_none());
    }

    #[test]
    fn test_three_rounds_run_sequentially() {
        let mut runner = CannedRunner::new(vec![
            run(10.0, 1.0, 100, 0.1, 0.1, 1),
            run(20.0, 2.0, 200, 0.2, 0.2, 2),
            run(30.0, 3.0, 300, 0.3, 0.3, 3),
        ]);
        let mut seen = Vec::new();

        let avg = aggregate(
            &mut runner,
            Path::new("./run"),
            "SELECT 1;",
            rounds(3),
            &RunLimits::default(),
            |round, result| seen.push((round, result.fds)),
        )
        .unwrap();

        assert_eq!(runner.calls.len(), 3);
        assert!(runner.calls.iter().all(|(_, _, q)| q == "SELECT 1;"));
        assert!(
            runner
                .calls
                .windows(2)
                .all(|pair| pair[0].1 <= pair[1].0)
        );
        assert_eq!(seen, vec![(1, 1), (2, 2), (3, 3)]);
        assert!((avg.memory - 200.0).abs() < 1e-9);
        assert!((avg.cpu_time - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_single_round_is_the_run() {
        let only = run(12.5, 0.7, 4096, 0.25, 0.05, 9);
        let mut runner = CannedRunner::new(vec![only]);
        let avg = aggregate(
            &mut runner,
            Path::new("./run"),
            "SELECT 2;",
            rounds(1),
            &RunLimits::default(),
            |_, _| {},
        )
        .unwrap();
        assert_eq!(avg, AggregatedResult::from(&only));
    }

    #[test]
    fn test_failed_round_stops_query() {
        let mut runner = CannedRunner::new(vec![run(1.0, 1.0, 1, 0.0, 0.0, 1)]);
        runner.fail_on = Some(1);
        let result = aggregate(
            &mut runner,
            Path::new("./run"),
            "SELECT 3;",
            rounds(3),
            &RunLimits::default(),
            |_, _| {},
        );
        assert!(matches!(result, Err(ProfilingError::ProcessSpawnFailed(_))));
        assert_eq!(runner.calls.len(), 2);
    }
}

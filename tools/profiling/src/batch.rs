#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Batch driver: profile every discovered query and assemble the report

use crate::display;
use crate::leaks::{LeakChecker, amplify};
use crate::queries::QuerySet;
use crate::report::{LeakReport, PerformanceReport};
use crate::rounds::{AggregatedResult, aggregate};
use crate::runner::{QueryRunner, RunLimits};
use std::io::Write;
use std::num::NonZeroU32;
use std::path::Path;
use tracing::{info, warn};

/// Drives a query set through the runner or a leak checker.
///
/// Progress lines go to `out`. A query whose run fails is logged and left
/// out of the report; the batch carries on.
pub struct BatchDriver<'a, W: Write> {
    shell: &'a Path,
    out: W,
}

impl<'a, W: Write> BatchDriver<'a, W> {
    /// Create a driver for `shell`, writing progress to `out`
    pub const fn new(shell: &'a Path, out: W) -> Self {
        Self { shell, out }
    }

    /// Recover the progress sink
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: &str) {
        emit(&mut self.out, line);
    }

    /// Profile each query for `rounds` rounds and average the results
    pub fn profile<R>(
        &mut self,
        runner: &mut R,
        queries: &QuerySet,
        rounds: NonZeroU32,
        limits: &RunLimits,
    ) -> PerformanceReport
    where
        R: QueryRunner + ?Sized,
    {
        let mut report = PerformanceReport::new();

        for (name, query) in queries {
            info!(query = %name, "profiling");
            self.emit(&format!("Profiling query: {query}"));

            let out = &mut self.out;
            let outcome = aggregate(runner, self.shell, query, rounds, limits, |round, result| {
                let label = display::round_label(name, round, rounds.get());
                emit(out, &display::result_line(&label, &AggregatedResult::from(result)));
            });

            match outcome {
                Ok(average) => {
                    self.emit(&display::result_line(&display::average_label(name), &average));
                    report.insert(name.clone(), average);
                }
                Err(e) => warn!(query = %name, error = %e, "profiling failed, skipping query"),
            }
        }

        report
    }

    /// Check each query for leaks, repeating its text `count` times
    pub fn profile_leaks(
        &mut self,
        checker: &dyn LeakChecker,
        queries: &QuerySet,
        count: u32,
    ) -> LeakReport {
        let mut report = LeakReport::new();

        for (name, query) in queries {
            info!(query = %name, "checking leaks");
            self.emit(&format!("Analyzing leaks in query: {query}"));

            match checker.check_leaks(self.shell, &amplify(query, count)) {
                Ok(summary) => {
                    self.emit(&display::leak_line(&summary));
                    report.insert(name.clone(), summary);
                }
                Err(e) => warn!(query = %name, error = %e, "leak check failed, skipping query"),
            }
        }

        report
    }
}

fn emit<W: Write>(out: &mut W, line: &str) {
    if let Err(e) = writeln!(out, "{line}") {
        warn!(error = %e, "failed to write progress");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::error::{ProfilingError, Result};
    use crate::leaks::LeakSummary;
    use crate::runner::RunResult;
    use std::cell::RefCell;

    struct FixedRunner {
        calls: Vec<String>,
    }

    impl QueryRunner for FixedRunner {
        fn run(&mut self, _shell: &Path, query: &str, _limits: &RunLimits) -> Result<RunResult> {
            self.calls.push(query.to_string());
            if query.contains("broken") {
                return Err(ProfilingError::ProcessSpawnFailed("no such shell".to_string()));
            }
            Ok(RunResult {
                utilization: 10.0,
                duration: 0.5,
                memory: 2048,
                user_time: 0.1,
                system_time: 0.1,
                cpu_time: 0.2,
                fds: 5,
            })
        }
    }

    struct RecordingChecker {
        seen: RefCell<Vec<String>>,
    }

    impl LeakChecker for RecordingChecker {
        fn check_leaks(&self, _shell: &Path, query: &str) -> Result<LeakSummary> {
            self.seen.borrow_mut().push(query.to_string());
            Ok(LeakSummary {
                definitely: Some("0 bytes in 0 blocks".to_string()),
                ..LeakSummary::default()
            })
        }
    }

    fn queries(pairs: &[(&str, &str)]) -> QuerySet {
        pairs
            .iter()
            .map(|(n, q)| ((*n).to_string(), (*q).to_string()))
            .collect()
    }

    #[test]
    fn test_profile_every_query() {
        let mut runner = FixedRunner { calls: Vec::new() };
        let mut driver = BatchDriver::new(Path::new("./run"), Vec::new());
        let set = queries(&[("q1", "SELECT 1;"), ("q2", "SELECT 2;")]);

        let report = driver.profile(
            &mut runner,
            &set,
            NonZeroU32::new(2).unwrap(),
            &RunLimits::default(),
        );

        assert_eq!(report.len(), 2);
        assert_eq!(runner.calls, vec!["SELECT 1;", "SELECT 1;", "SELECT 2;", "SELECT 2;"]);
        assert!((report["q1"].memory - 2048.0).abs() < 1e-9);

        let out = String::from_utf8(driver.into_inner()).unwrap();
        assert!(out.contains("Profiling query: SELECT 1;"));
        assert!(out.contains("q1 (1/2): "));
        assert!(out.contains("q1 (2/2): "));
        assert!(out.contains("q2   avg: "));
    }

    #[test]
    fn test_failed_query_does_not_abort_batch() {
        let mut runner = FixedRunner { calls: Vec::new() };
        let mut driver = BatchDriver::new(Path::new("./run"), Vec::new());
        let set = queries(&[("bad", "SELECT broken;"), ("good", "SELECT 1;")]);

        let report = driver.profile(
            &mut runner,
            &set,
            NonZeroU32::new(1).unwrap(),
            &RunLimits::default(),
        );

        assert!(!report.contains_key("bad"));
        assert!(report.contains_key("good"));
    }

    #[test]
    fn test_leaks_amplify_query() {
        let checker = RecordingChecker {
            seen: RefCell::new(Vec::new()),
        };
        let mut driver = BatchDriver::new(Path::new("./run"), Vec::new());
        let set = queries(&[("manual", "SELECT 1;")]);

        let report = driver.profile_leaks(&checker, &set, 2);

        assert_eq!(*checker.seen.borrow(), vec!["SELECT 1;SELECT 1;"]);
        assert_eq!(
            report["manual"].definitely.as_deref(),
            Some("0 bytes in 0 blocks")
        );
        let out = String::from_utf8(driver.into_inner()).unwrap();
        assert!(out.contains("Analyzing leaks in query: SELECT 1;"));
        assert!(out.contains("definitely: 0 bytes in 0 blocks; indirectly: none; possibly: none"));
    }
}

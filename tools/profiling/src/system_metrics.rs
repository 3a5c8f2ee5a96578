#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Portable process metrics through `sysinfo`, for hosts without `/proc`

use crate::error::{ProfilingError, Result};
use crate::metrics::{CpuTimes, MetricsProvider, Sample};
use std::thread;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

/// Metrics provider backed by `sysinfo`.
///
/// `sysinfo` reports utilization but no user/system split, so CPU time is
/// the utilization integrated over each interval and counted as user time.
/// I/O counters are not reported.
pub struct SysinfoProvider {
    system: System,

    /// Integrated CPU seconds of the pid currently being sampled
    cpu_seconds: Option<(u32, f64)>,
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new(),
            cpu_seconds: None,
        }
    }

    fn refresh(&mut self, pid: Pid) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );
    }

    /// Live process readings: utilization percent and resident bytes
    fn observe(&self, pid: u32) -> Result<(f64, u64)> {
        self.system
            .process(Pid::from_u32(pid))
            .filter(|process| !is_defunct(process.status()))
            .map(|process| (f64::from(process.cpu_usage()), process.memory()))
            .ok_or(ProfilingError::ProcessGone(pid))
    }

    /// Add `seconds` to the running total for `pid`, restarting on a new pid
    fn accumulate(&mut self, pid: u32, seconds: f64) -> f64 {
        let total = match self.cpu_seconds {
            Some((tracked, total)) if tracked == pid => total + seconds,
            _ => seconds,
        };
        self.cpu_seconds = Some((pid, total));
        total
    }
}

impl MetricsProvider for SysinfoProvider {
    fn sample(&mut self, pid: u32, interval: Duration) -> Result<Sample> {
        let target = Pid::from_u32(pid);

        // The first refresh is the utilization baseline
        self.refresh(target);
        self.observe(pid)?;
        thread::sleep(interval);
        self.refresh(target);

        let (utilization, memory_rss) = self.observe(pid)?;
        let user = self.accumulate(pid, utilization / 100.0 * interval.as_secs_f64());

        Ok(Sample {
            utilization,
            io_counters: None,
            fds: count_fds(pid),
            cpu_times: CpuTimes::new(user, 0.0),
            memory_rss,
        })
    }
}

const fn is_defunct(status: ProcessStatus) -> bool {
    matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

#[cfg(target_os = "linux")]
fn count_fds(pid: u32) -> u64 {
    std::fs::read_dir(format!("/proc/{pid}/fd"))
        .map(|entries| entries.count() as u64)
        .unwrap_or(0)
}

/// Open files as listed by `lsof`, less its header line
#[cfg(not(target_os = "linux"))]
fn count_fds(pid: u32) -> u64 {
    use std::process::{Command, Stdio};
    use tracing::debug;

    match Command::new("lsof")
        .args(["-p", &pid.to_string()])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .count()
            .saturating_sub(1) as u64,
        Err(e) => {
            debug!(pid, error = %e, "lsof unavailable, reporting no fds");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use std::process::{Command, Stdio};

    /// Above the largest pid any kernel hands out
    const NO_SUCH_PID: u32 = 4_194_305;

    #[test]
    fn test_missing_process_is_gone() {
        let mut provider = SysinfoProvider::new();
        let result = provider.sample(NO_SUCH_PID, Duration::ZERO);
        assert!(matches!(result, Err(ProfilingError::ProcessGone(NO_SUCH_PID))));
    }

    #[test]
    fn test_cpu_seconds_restart_for_new_pid() {
        let mut provider = SysinfoProvider::new();
        assert!((provider.accumulate(10, 0.5) - 0.5).abs() < 1e-9);
        assert!((provider.accumulate(10, 0.25) - 0.75).abs() < 1e-9);
        assert!((provider.accumulate(11, 0.1) - 0.1).abs() < 1e-9);
    }

    #[cfg(unix)]
    #[test]
    fn test_samples_live_child() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let mut provider = SysinfoProvider::new();
        let sample = provider.sample(child.id(), Duration::from_millis(250));
        child.kill().unwrap();
        child.wait().unwrap();

        let sample = sample.unwrap();
        assert!(sample.memory_rss > 0);
        assert!(sample.utilization >= 0.0);
        assert!(sample.io_counters.is_none());
        assert!(sample.cpu_times.system.abs() < f64::EPSILON);
        assert!(sample.cpu_times.user >= 0.0);
        #[cfg(target_os = "linux")]
        assert!(sample.fds >= 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_reaped_child_is_gone() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let mut provider = SysinfoProvider::new();
        let result = provider.sample(pid, Duration::ZERO);
        assert!(matches!(result, Err(ProfilingError::ProcessGone(p)) if p == pid));
    }
}

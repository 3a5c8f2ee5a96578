#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Process metrics sampling

use crate::error::{ProfilingError, Result};
use crate::system_metrics::SysinfoProvider;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Kernel clock ticks per second as exposed through `/proc` (`USER_HZ`,
/// fixed by the proc ABI independently of the kernel's internal `HZ`)
const TICKS_PER_SEC: f64 = 100.0;

/// CPU time breakdown in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuTimes {
    /// Time spent in user mode
    pub user: f64,

    /// Time spent in kernel mode
    pub system: f64,
}

impl CpuTimes {
    /// Create CPU times from user and system seconds
    #[must_use]
    pub const fn new(user: f64, system: f64) -> Self {
        Self { user, system }
    }

    /// Combined user and system time
    #[must_use]
    pub fn total(&self) -> f64 {
        self.user + self.system
    }
}

/// I/O counters from `/proc/[pid]/io`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// One point-in-time snapshot of a process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// CPU utilization over the sampling interval (percent)
    pub utilization: f64,

    /// I/O counters, when the platform exposes them
    pub io_counters: Option<IoCounters>,

    /// Open file descriptors
    pub fds: u64,

    /// Cumulative CPU times
    pub cpu_times: CpuTimes,

    /// Resident set size in bytes
    pub memory_rss: u64,
}

/// Source of process metrics.
///
/// `sample` blocks for `interval` while measuring utilization over it.
/// Implementations report [`ProfilingError::ProcessGone`] or
/// [`ProfilingError::AccessDenied`] once the process can no longer be read.
pub trait MetricsProvider {
    /// Take one snapshot of `pid`, consuming `interval` of wall time.
    ///
    /// # Errors
    ///
    /// Returns an error when the process has exited or cannot be read.
    fn sample(&mut self, pid: u32, interval: Duration) -> Result<Sample>;
}

/// Metrics provider reading the Linux `/proc` filesystem
#[derive(Debug, Clone)]
pub struct ProcfsProvider {
    root: PathBuf,
}

impl Default for ProcfsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsProvider {
    /// Create a provider reading `/proc`
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(PROC_ROOT))
    }

    /// Create a provider reading an alternate proc root (testable)
    #[must_use]
    pub const fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn process_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn read_cpu_times(&self, pid: u32) -> Result<CpuTimes> {
        let path = self.process_dir(pid).join("stat");
        let content = read_proc_file(&path, pid)?;
        let stat = parse_stat(&content)?;
        if stat.is_defunct() {
            return Err(ProfilingError::ProcessGone(pid));
        }
        Ok(stat.cpu_times())
    }

    fn read_rss(&self, pid: u32) -> Result<u64> {
        let path = self.process_dir(pid).join("status");
        let content = read_proc_file(&path, pid)?;
        // Zombies keep a status file but drop the Vm* lines
        parse_status_rss(&content).ok_or(ProfilingError::ProcessGone(pid))
    }

    fn count_fds(&self, pid: u32) -> Result<u64> {
        let path = self.process_dir(pid).join("fd");
        let entries = std::fs::read_dir(&path).map_err(|e| map_io_error(&e, pid))?;
        Ok(entries.filter_map(std::result::Result::ok).count() as u64)
    }

    fn read_io(&self, pid: u32) -> Option<IoCounters> {
        let path = self.process_dir(pid).join("io");
        std::fs::read_to_string(path)
            .ok()
            .map(|content| parse_io(&content))
    }
}

impl MetricsProvider for ProcfsProvider {
    fn sample(&mut self, pid: u32, interval: Duration) -> Result<Sample> {
        let before = self.read_cpu_times(pid)?;
        thread::sleep(interval);
        let cpu_times = self.read_cpu_times(pid)?;

        let utilization = utilization_percent(before, cpu_times, interval);
        let memory_rss = self.read_rss(pid)?;
        let fds = self.count_fds(pid)?;

        Ok(Sample {
            utilization,
            io_counters: self.read_io(pid),
            fds,
            cpu_times,
            memory_rss,
        })
    }
}

impl<T: MetricsProvider + ?Sized> MetricsProvider for Box<T> {
    fn sample(&mut self, pid: u32, interval: Duration) -> Result<Sample> {
        (**self).sample(pid, interval)
    }
}

/// Mount point of the process filesystem
pub const PROC_ROOT: &str = "/proc";

/// Where process metrics come from on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsSource {
    /// Per-process files under `/proc`, with fd and I/O counts
    Procfs,
    /// `sysinfo`, for hosts without `/proc`
    Sysinfo,
}

impl MetricsSource {
    /// `Procfs` when `proc_root` exposes per-process stat files
    #[must_use]
    pub fn detect(proc_root: &Path) -> Self {
        if proc_root.join("self").join("stat").is_file() {
            Self::Procfs
        } else {
            Self::Sysinfo
        }
    }

    /// Build the provider for this source
    #[must_use]
    pub fn provider(self) -> Box<dyn MetricsProvider> {
        match self {
            Self::Procfs => Box::new(ProcfsProvider::new()),
            Self::Sysinfo => Box::new(SysinfoProvider::new()),
        }
    }
}

/// Metrics provider for the host this binary runs on
#[must_use]
pub fn platform_provider() -> Box<dyn MetricsProvider> {
    let source = MetricsSource::detect(Path::new(PROC_ROOT));
    debug!(?source, "metrics source");
    source.provider()
}

/// CPU consumed between two readings as a percent of `interval`
#[must_use]
pub fn utilization_percent(before: CpuTimes, after: CpuTimes, interval: Duration) -> f64 {
    let wall = interval.as_secs_f64();
    if wall <= 0.0 {
        return 0.0;
    }
    let busy = (after.total() - before.total()).max(0.0);
    busy / wall * 100.0
}

fn read_proc_file(path: &Path, pid: u32) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| map_io_error(&e, pid))
}

/// Reads against an exited process fail with `ENOENT` or `ESRCH`; both mean
/// the process is gone. Permission failures are reported separately.
fn map_io_error(error: &io::Error, pid: u32) -> ProfilingError {
    match error.kind() {
        io::ErrorKind::PermissionDenied => ProfilingError::AccessDenied(pid),
        _ => ProfilingError::ProcessGone(pid),
    }
}

/// Fields of interest from `/proc/[pid]/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    state: char,
    utime_ticks: u64,
    stime_ticks: u64,
}

impl ProcStat {
    const fn is_defunct(&self) -> bool {
        matches!(self.state, 'Z' | 'X' | 'x')
    }

    #[allow(clippy::cast_precision_loss)]
    fn cpu_times(&self) -> CpuTimes {
        CpuTimes::new(
            self.utime_ticks as f64 / TICKS_PER_SEC,
            self.stime_ticks as f64 / TICKS_PER_SEC,
        )
    }
}

/// Parse `/proc/[pid]/stat`.
///
/// The command name sits in parentheses and may contain spaces, so fields are
/// counted from the last closing parenthesis.
fn parse_stat(content: &str) -> Result<ProcStat> {
    let rest = content
        .rfind(')')
        .and_then(|idx| content.get(idx + 1..))
        .ok_or_else(|| ProfilingError::MetricsParse("stat: missing command name".to_string()))?;

    let fields: Vec<&str> = rest.split_whitespace().collect();

    let state = fields
        .first()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| ProfilingError::MetricsParse("stat: missing state".to_string()))?;

    // utime and stime are fields 14 and 15; the state is field 3
    let parse_ticks = |idx: usize, name: &str| -> Result<u64> {
        fields
            .get(idx)
            .ok_or_else(|| ProfilingError::MetricsParse(format!("stat: missing {name}")))?
            .parse::<u64>()
            .map_err(|e| ProfilingError::MetricsParse(format!("stat: bad {name}: {e}")))
    };

    Ok(ProcStat {
        state,
        utime_ticks: parse_ticks(11, "utime")?,
        stime_ticks: parse_ticks(12, "stime")?,
    })
}

/// Resident set size in bytes from `/proc/[pid]/status`
fn parse_status_rss(content: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb.saturating_mul(1024))
}

fn parse_io(content: &str) -> IoCounters {
    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter_map(|(key, value)| value.trim().parse::<u64>().ok().map(|v| (key, v)))
        .fold(IoCounters::default(), |mut acc, (key, value)| {
            match key {
                "syscr" => acc.read_count = value,
                "syscw" => acc.write_count = value,
                "read_bytes" => acc.read_bytes = value,
                "write_bytes" => acc.write_bytes = value,
                _ => {}
            }
            acc
        })
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Memory leak checking
//!
//! Two strategies: run the query shell under memcheck and read its summary,
//! or run it normally and poll a live leak inspector against its pid. One is
//! picked per platform at startup.

use crate::error::{ProfilingError, Result};
use crate::process::{ProfiledProcess, query_args};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Marker the live inspector prints on its totals line
const LIVE_TOTAL_MARKER: &str = "total leaked bytes";

/// Leak totals by category; `None` when the tool reported nothing for it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakSummary {
    pub definitely: Option<String>,
    pub indirectly: Option<String>,
    pub possibly: Option<String>,
}

impl LeakSummary {
    /// Categories with their values, in report order
    #[must_use]
    pub fn categories(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("definitely", self.definitely.as_deref()),
            ("indirectly", self.indirectly.as_deref()),
            ("possibly", self.possibly.as_deref()),
        ]
    }
}

/// Something that can check one query for leaks
pub trait LeakChecker {
    /// Run `query` through `shell` and summarize leaks.
    ///
    /// # Errors
    ///
    /// Returns error if the shell or the leak tool cannot be launched.
    fn check_leaks(&self, shell: &Path, query: &str) -> Result<LeakSummary>;
}

/// Text after the first colon of `line`, trimmed
fn value_after_colon(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, value)| value.trim())
}

/// Parse a memcheck diagnostic stream.
///
/// Each line mentioning a category sets that category to the text after the
/// line's first colon; later lines win. A matching line without a colon is
/// skipped and leaves the category as it was.
#[must_use]
pub fn parse_memcheck_report(diagnostics: &str) -> LeakSummary {
    diagnostics
        .lines()
        .fold(LeakSummary::default(), |mut summary, line| {
            let slots = [
                ("definitely", &mut summary.definitely),
                ("indirectly", &mut summary.indirectly),
                ("possibly", &mut summary.possibly),
            ];
            for (key, slot) in slots {
                if !line.contains(key) {
                    continue;
                }
                match value_after_colon(line) {
                    Some(value) => *slot = Some(value.to_string()),
                    None => warn!(line, "unrecognized leak line"),
                }
            }
            summary
        })
}

/// Parse one live-inspector report, returning its total leaked bytes line value
#[must_use]
pub fn parse_live_total(report: &str) -> Option<String> {
    report
        .lines()
        .filter(|line| line.contains(LIVE_TOTAL_MARKER))
        .filter_map(value_after_colon)
        .last()
        .map(str::to_string)
}

/// Runs the shell under valgrind memcheck
#[derive(Debug, Clone)]
pub struct MemcheckLeakChecker {
    tool: PathBuf,
    suppressions: Option<PathBuf>,
}

impl MemcheckLeakChecker {
    /// Create a checker using `valgrind` from `PATH`
    #[must_use]
    pub fn new(suppressions: Option<PathBuf>) -> Self {
        Self {
            tool: PathBuf::from("valgrind"),
            suppressions,
        }
    }

    /// Use a different instrumentation binary
    #[must_use]
    pub fn with_tool(mut self, tool: PathBuf) -> Self {
        self.tool = tool;
        self
    }

    fn command(&self, shell: &Path, query: &str) -> Command {
        let mut cmd = Command::new(&self.tool);
        cmd.arg("--tool=memcheck");
        if let Some(file) = &self.suppressions {
            cmd.arg(format!("--suppressions={}", file.display()));
        }
        cmd.arg(shell)
            .args(query_args(query, None))
            .stdin(Stdio::null());
        cmd
    }
}

impl LeakChecker for MemcheckLeakChecker {
    fn check_leaks(&self, shell: &Path, query: &str) -> Result<LeakSummary> {
        let output = self.command(shell, query).output().map_err(|e| {
            ProfilingError::LeakToolFailed(format!("{}: {e}", self.tool.display()))
        })?;

        debug!(status = %output.status, bytes = output.stderr.len(), "memcheck finished");
        Ok(parse_memcheck_report(&String::from_utf8_lossy(&output.stderr)))
    }
}

/// Runs the shell normally and polls the `leaks` inspector against it
#[derive(Debug, Clone)]
pub struct LiveLeakChecker {
    inspector: PathBuf,
}

impl Default for LiveLeakChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveLeakChecker {
    /// Create a checker using `leaks` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self::with_inspector(PathBuf::from("leaks"))
    }

    /// Use a different inspector binary
    #[must_use]
    pub const fn with_inspector(inspector: PathBuf) -> Self {
        Self { inspector }
    }
}

impl LeakChecker for LiveLeakChecker {
    fn check_leaks(&self, shell: &Path, query: &str) -> Result<LeakSummary> {
        let mut process = ProfiledProcess::spawn(shell, &query_args(query, None))?;
        let pid = process.pid();
        let mut definitely = None;

        loop {
            match process.is_running() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    terminate(process);
                    return Err(e);
                }
            }

            let output = match Command::new(&self.inspector)
                .arg(pid.to_string())
                .stdin(Stdio::null())
                .output()
            {
                Ok(output) => output,
                Err(e) => {
                    terminate(process);
                    return Err(ProfilingError::LeakToolFailed(format!(
                        "{}: {e}",
                        self.inspector.display()
                    )));
                }
            };

            // The target may exit mid-inspection; partial output is expected
            let report = String::from_utf8_lossy(&output.stdout);
            match parse_live_total(&report) {
                Some(total) => definitely = Some(total),
                None => debug!(pid, "no leak total in inspector output"),
            }
        }

        Ok(LeakSummary {
            definitely,
            indirectly: None,
            possibly: None,
        })
    }
}

/// Kill an abandoned query process, logging a failed kill
fn terminate(process: ProfiledProcess) {
    let pid = process.pid();
    if let Err(e) = process.kill() {
        warn!(pid, error = %e, "failed to kill query process");
    }
}

/// Leak checker for the platform this binary runs on
#[must_use]
pub fn platform_leak_checker(suppressions: Option<PathBuf>) -> Box<dyn LeakChecker> {
    if cfg!(target_os = "macos") {
        if suppressions.is_some() {
            warn!("suppressions are only used by memcheck, ignoring");
        }
        Box::new(LiveLeakChecker::new())
    } else {
        Box::new(MemcheckLeakChecker::new(suppressions))
    }
}

/// Repeat a query `count` times to amplify leaks under few iterations
#[must_use]
pub fn amplify(query: &str, count: u32) -> String {
    query.repeat(usize::try_from(count).unwrap_or(1).max(1))
}

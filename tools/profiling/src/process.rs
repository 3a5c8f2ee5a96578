#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Process management for profiled queries

use crate::error::{ProfilingError, Result};
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Seconds the query shell waits before running, so measurement starts on a settled process
pub const STARTUP_DELAY_SECS: u32 = 1;

/// Arguments passed to the query shell.
///
/// Performance runs pass an iteration count; leak checks run the query once.
#[must_use]
pub fn query_args(query: &str, iterations: Option<u32>) -> Vec<String> {
    let mut args = vec!["--query".to_string(), query.to_string()];
    if let Some(count) = iterations {
        args.push("--iterations".to_string());
        args.push(count.to_string());
    }
    args.push("--delay".to_string());
    args.push(STARTUP_DELAY_SECS.to_string());
    args
}

/// Wrapper for managing a profiled process
pub struct ProfiledProcess {
    /// The child process handle
    child: Child,

    /// Process ID
    pid: u32,
}

impl ProfiledProcess {
    /// Spawn the query shell with the given arguments
    ///
    /// Output is discarded so a chatty shell can never block on a full pipe
    /// while it is being measured.
    ///
    /// # Errors
    ///
    /// Returns error if the process fails to spawn
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use query_profiler::process::{ProfiledProcess, query_args};
    /// # use std::path::Path;
    /// let process = ProfiledProcess::spawn(
    ///     Path::new("./build/linux/tools/run"),
    ///     &query_args("SELECT * FROM processes;", Some(1)),
    /// );
    /// ```
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ProfilingError::ProcessSpawnFailed(format!(
                    "failed to spawn {}: {e}",
                    program.display()
                ))
            })?;

        let pid = child.id();

        Ok(Self { child, pid })
    }

    /// Get the process ID
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process is still running
    ///
    /// # Errors
    ///
    /// Returns error if process status cannot be determined
    pub fn is_running(&mut self) -> Result<bool> {
        match self.child.try_wait() {
            Ok(None) => Ok(true),
            Ok(Some(_)) => Ok(false),
            Err(e) => Err(ProfilingError::ProcessControl(format!(
                "failed to check process status: {e}"
            ))),
        }
    }

    /// Wait for the process to complete
    ///
    /// # Errors
    ///
    /// Returns error if process wait fails
    pub fn wait(mut self) -> Result<()> {
        self.child
            .wait()
            .map_err(|e| ProfilingError::ProcessControl(format!("wait failed: {e}")))?;
        Ok(())
    }

    /// Kill the process and reap it
    ///
    /// # Errors
    ///
    /// Returns error if the kill signal or the reap fails
    pub fn kill(mut self) -> Result<()> {
        self.child
            .kill()
            .map_err(|e| ProfilingError::ProcessControl(format!("kill failed: {e}")))?;
        self.wait()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn test_query_args_with_iterations() {
        let args = query_args("SELECT 1;", Some(3));
        assert_eq!(
            args,
            vec!["--query", "SELECT 1;", "--iterations", "3", "--delay", "1"]
        );
    }

    #[test]
    fn test_query_args_for_leak_check() {
        let args = query_args("SELECT 1;", None);
        assert_eq!(args, vec!["--query", "SELECT 1;", "--delay", "1"]);
    }

    #[test]
    fn test_spawn_missing_binary_fails() {
        let result = ProfiledProcess::spawn(Path::new("/nonexistent/query-shell"), &[]);
        assert!(matches!(result, Err(ProfilingError::ProcessSpawnFailed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_and_reap() {
        let mut process = ProfiledProcess::spawn(Path::new("true"), &[]).unwrap();
        assert!(process.pid() > 0);
        process.child.wait().unwrap();
        assert!(!process.is_running().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_running_process() {
        let mut process = ProfiledProcess::spawn(Path::new("sleep"), &["30".to_string()]).unwrap();
        assert!(process.is_running().unwrap());
        assert!(process.kill().is_ok());
    }
}

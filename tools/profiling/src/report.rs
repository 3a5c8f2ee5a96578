#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Report artifact and JSON output

use crate::classify::classify;
use crate::config::OutputTarget;
use crate::error::{ProfilingError, Result};
use crate::leaks::LeakSummary;
use crate::rounds::AggregatedResult;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::collections::BTreeMap;
use std::io::Write;

/// Averaged results keyed by query name
pub type PerformanceReport = BTreeMap<String, AggregatedResult>;

/// Leak summaries keyed by query name
pub type LeakReport = BTreeMap<String, LeakSummary>;

/// Severity ranks keyed by metric name
pub type RankSummary = BTreeMap<&'static str, usize>;

/// Result of one profiling invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Performance(PerformanceReport),
    Leaks(LeakReport),
}

impl Report {
    /// Number of queries with a result
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Performance(results) => results.len(),
            Self::Leaks(results) => results.len(),
        }
    }

    /// Whether no query produced a result
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rank every classified field of a result
#[must_use]
pub fn summarize(result: &AggregatedResult) -> RankSummary {
    result
        .fields()
        .into_iter()
        .filter_map(|(name, value)| classify(name, value).map(|rank| (name, rank)))
        .collect()
}

/// Reduce a performance report to ranks
#[must_use]
pub fn summarize_report(report: &PerformanceReport) -> BTreeMap<String, RankSummary> {
    report
        .iter()
        .map(|(name, result)| (name.clone(), summarize(result)))
        .collect()
}

/// Serialize with one-space indentation and sorted keys
///
/// # Errors
///
/// Returns error if serialization fails
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    // Going through `Value` sorts struct fields as well as map keys
    let value = serde_json::to_value(value)?;
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b" "));
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| ProfilingError::ReportWrite(e.to_string()))
}

/// Render a report, reduced to ranks when `summary` is set.
///
/// Leak reports carry no numbers, so `summary` does not apply to them.
///
/// # Errors
///
/// Returns error if serialization fails
pub fn render(report: &Report, summary: bool) -> Result<String> {
    match report {
        Report::Performance(results) if summary => to_json(&summarize_report(results)),
        Report::Performance(results) => to_json(results),
        Report::Leaks(results) => to_json(results),
    }
}

/// Write a report to its destination
///
/// # Errors
///
/// Returns error if the report cannot be serialized or written
pub fn write_report(report: &Report, target: &OutputTarget, summary: bool) -> Result<()> {
    let json = match target {
        OutputTarget::None => return Ok(()),
        OutputTarget::Stdout | OutputTarget::File(_) => render(report, summary)?,
    };

    match target {
        OutputTarget::File(path) => std::fs::write(path, json).map_err(|e| {
            ProfilingError::ReportWrite(format!("{}: {e}", path.display()))
        }),
        _ => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").map_err(|e| ProfilingError::ReportWrite(e.to_string()))
        }
    }
}

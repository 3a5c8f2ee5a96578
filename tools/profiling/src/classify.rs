#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Severity classification of measured values

use std::fmt;

const MIB: f64 = 1024.0 * 1024.0;

/// Metrics that carry severity thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Utilization,
    CpuTime,
    Memory,
    Fds,
    Duration,
}

impl Metric {
    /// Every ranked metric, in display order
    pub const ALL: [Self; 5] = [
        Self::Utilization,
        Self::CpuTime,
        Self::Memory,
        Self::Fds,
        Self::Duration,
    ];

    /// Look up a metric by its result field name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "utilization" => Some(Self::Utilization),
            "cpu_time" => Some(Self::CpuTime),
            "memory" => Some(Self::Memory),
            "fds" => Some(Self::Fds),
            "duration" => Some(Self::Duration),
            _ => None,
        }
    }

    /// Result field name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utilization => "utilization",
            Self::CpuTime => "cpu_time",
            Self::Memory => "memory",
            Self::Fds => "fds",
            Self::Duration => "duration",
        }
    }

    /// Ascending bucket boundaries: percent, seconds, bytes, count, seconds
    #[must_use]
    pub const fn thresholds(self) -> [f64; 3] {
        match self {
            Self::Utilization => [8.0, 20.0, 50.0],
            Self::CpuTime => [0.4, 1.0, 10.0],
            Self::Memory => [8.0 * MIB, 12.0 * MIB, 24.0 * MIB],
            Self::Fds => [6.0, 12.0, 50.0],
            Self::Duration => [0.8, 1.0, 3.0],
        }
    }

    /// Index of the first threshold `value` is below, or the worst bucket
    #[must_use]
    pub fn rank(self, value: f64) -> usize {
        let thresholds = self.thresholds();
        thresholds
            .iter()
            .position(|limit| value < *limit)
            .unwrap_or(thresholds.len())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rank a named value; fields without thresholds are not ranked.
#[must_use]
pub fn classify(metric: &str, value: f64) -> Option<usize> {
    Metric::from_name(metric).map(|m| m.rank(value))
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Colored terminal formatting of results

use crate::classify::Metric;
use crate::leaks::LeakSummary;
use crate::rounds::AggregatedResult;

const RESET: &str = "\x1b[0m";

/// Background color per severity rank: blue, green, yellow, red
const RANK_COLORS: [&str; 4] = ["\x1b[46m", "\x1b[42m", "\x1b[43m", "\x1b[41m"];

const RED: usize = 3;
const YELLOW: usize = 2;

/// Wrap `text` in the color of `rank`; ranks past the worst use its color
#[must_use]
pub fn paint(rank: usize, text: &str) -> String {
    let color = RANK_COLORS
        .get(rank)
        .or(RANK_COLORS.last())
        .copied()
        .unwrap_or_default();
    format!("{color}\x1b[1;30m {text} {RESET}")
}

/// One line with every ranked metric of a result painted by severity
#[must_use]
pub fn result_line(name: &str, result: &AggregatedResult) -> String {
    let fields = result.fields();
    let cells: Vec<String> = Metric::ALL
        .iter()
        .filter_map(|metric| {
            let value = fields
                .iter()
                .find(|(field, _)| *field == metric.name())
                .map(|(_, value)| *value)?;
            let rank = metric.rank(value);
            Some(paint(rank, &format!("{metric}: {rank} ({value})")))
        })
        .collect();
    format!("{name}: {}", cells.join(" "))
}

/// Label for round `round` of `total`
#[must_use]
pub fn round_label(name: &str, round: u32, total: u32) -> String {
    format!("{name} ({round}/{total})")
}

/// Label for the averaged result of a query
#[must_use]
pub fn average_label(name: &str) -> String {
    format!("{name}   avg")
}

/// Leak categories joined on one line; non-zero leaks are highlighted
#[must_use]
pub fn leak_line(summary: &LeakSummary) -> String {
    let cells: Vec<String> = summary
        .categories()
        .iter()
        .map(|(key, value)| {
            let text = match value {
                None => "none".to_string(),
                Some(v) if v.starts_with('0') => (*v).to_string(),
                Some(v) => match *key {
                    "definitely" => paint(RED, v),
                    "indirectly" => paint(YELLOW, v),
                    _ => (*v).to_string(),
                },
            };
            format!("{key}: {text}")
        })
        .collect();
    format!("  {}", cells.join("; "))
}

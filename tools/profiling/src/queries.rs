#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Query discovery: config scheduled queries, table specs, or a single query

use crate::error::{ProfilingError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

/// Ordered mapping of query name to query text
pub type QuerySet = IndexMap<String, String>;

/// Name used for a query given on the command line
pub const MANUAL_QUERY_NAME: &str = "manual";

/// Directory name of table specs shared by every platform
const CROSS_PLATFORM_DIR: &str = "x";

const TABLE_SPEC_SUFFIX: &str = ".table";

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    #[serde(rename = "scheduledQueries", default)]
    scheduled_queries: Option<Vec<ScheduledQuery>>,
}

#[derive(Debug, Deserialize)]
struct ScheduledQuery {
    name: String,
    query: String,
}

/// Platform name used for table spec directories
#[must_use]
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Parse scheduled queries from a config document.
///
/// A document without `scheduledQueries` yields an empty set.
///
/// # Errors
///
/// Returns error if the document is not valid JSON or a query entry is malformed.
pub fn parse_config(content: &str, path: &Path) -> Result<QuerySet> {
    let document: ConfigDocument = serde_json::from_str(content)
        .map_err(|e| ProfilingError::config_parse(path, e.to_string()))?;

    Ok(document
        .scheduled_queries
        .unwrap_or_default()
        .into_iter()
        .map(|q| (q.name, q.query))
        .collect())
}

/// Load scheduled queries from a config file
///
/// # Errors
///
/// Returns error if the file is missing, unreadable, or unparsable.
pub fn queries_from_config(path: &Path) -> Result<QuerySet> {
    if !path.exists() {
        return Err(ProfilingError::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ProfilingError::config_parse(path, e.to_string()))?;
    parse_config(&content, path)
}

/// Build `SELECT *` queries for every table spec of `platform`.
///
/// Specs live in `<root>/<platform>/<table>.table`; specs under `x/` apply
/// to every platform. Other files in the tree are ignored, and tables listed
/// in `restrict` (comma separated) are skipped.
///
/// # Errors
///
/// Returns error if `root` does not exist.
pub fn queries_from_tables(root: &Path, platform: &str, restrict: &str) -> Result<QuerySet> {
    if !root.is_dir() {
        return Err(ProfilingError::TablesNotFound(root.to_path_buf()));
    }

    let excluded: Vec<&str> = restrict
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let mut tables: Vec<(String, String)> = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let table = entry
                .file_name()
                .to_str()?
                .strip_suffix(TABLE_SPEC_SUFFIX)?
                .to_string();
            let spec_platform = entry.path().parent()?.file_name()?.to_str()?.to_string();

            let applies = spec_platform == CROSS_PLATFORM_DIR || spec_platform == platform;
            applies.then_some((spec_platform, table))
        })
        .filter(|(_, table)| !excluded.contains(&table.as_str()))
        .collect();

    tables.sort();

    Ok(tables
        .into_iter()
        .map(|(spec_platform, table)| {
            (
                format!("{spec_platform}.{table}"),
                format!("SELECT * FROM {table};"),
            )
        })
        .collect())
}

/// A single query supplied by hand
#[must_use]
pub fn manual_query(query: &str) -> QuerySet {
    std::iter::once((MANUAL_QUERY_NAME.to_string(), query.to_string())).collect()
}

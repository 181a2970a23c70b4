//! Index, stock and alert-mapping records.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Category assigned to indices created from an upload with no category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A named stock index and its upload bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Index {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub category: Option<String>,
    pub expected_filename: Option<String>,
    pub alert_ticker: Option<String>,
    pub is_flagged: bool,
    pub original_filename: Option<String>,
    pub upload_timestamp: Option<DateTime<Utc>>,
    pub file_size_kb: Option<f64>,
    pub record_count: i64,
}

impl Index {
    /// Empty and "Uncategorized" both count as no category.
    pub fn has_category(&self) -> bool {
        self.category
            .as_deref()
            .map(|c| !c.trim().is_empty() && c != UNCATEGORIZED)
            .unwrap_or(false)
    }
}

/// Fields needed to create an index; the store assigns the id.
#[derive(Debug, Clone, Default)]
pub struct NewIndex {
    pub name: String,
    pub display_name: String,
    pub category: Option<String>,
    pub expected_filename: Option<String>,
    pub alert_ticker: Option<String>,
}

impl NewIndex {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: default_display_name(&name),
            name,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stock {
    pub id: i64,
    pub ticker: String,
}

/// Internal index keys are trimmed and uppercased.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// `NIFTY_BANK` displays as `NIFTY BANK`.
pub fn default_display_name(name: &str) -> String {
    name.replace('_', " ")
}

/// Legacy index name for an uploaded file: everything before the first dot,
/// uppercased (`nifty_bank.csv` -> `NIFTY_BANK`).
pub fn name_from_filename(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or(filename);
    normalize_name(stem)
}

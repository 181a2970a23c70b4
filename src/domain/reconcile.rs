//! Master-configuration reconciliation.
//!
//! Merges rows of (filename, name, display name, category, alert ticker) into
//! the store. Each row resolves to an index by name, then by expected
//! filename, and otherwise creates one. The whole batch is one unit of work.
//!
//! Merge rules:
//! - display name and category only change when the row supplies a value;
//! - a blank alert ticker clears the index's alert ticker, while a file with
//!   no alert column leaves it alone;
//! - a filename claimed by another index is taken from it, so the most
//!   recently configured row owns the filename.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::error::IndexwatchError;
use crate::domain::index::{NewIndex, normalize_name};
use crate::domain::upload_text::{Table, decode_text};
use crate::ports::store_port::{IndexStore, StoreTx};

const FILENAME_COLUMNS: &[&str] = &["Filename", "File"];
const NAME_COLUMNS: &[&str] = &["Name"];
const DISPLAY_NAME_COLUMNS: &[&str] = &["DisplayName", "Display Name"];
const CATEGORY_COLUMNS: &[&str] = &["Category"];
const ALERT_TICKER_COLUMNS: &[&str] = &["TVTicker", "AlertTicker"];

/// One master-configuration row. Text fields are trimmed; blank means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRow {
    pub filename: String,
    pub name: String,
    pub display_name: String,
    pub category: String,
    /// `None` when the file has no alert ticker column at all.
    pub alert_ticker: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub processed: usize,
    pub skipped: usize,
    pub created: usize,
    pub filenames_reassigned: usize,
}

enum RowOutcome {
    Created,
    Updated,
    Skipped,
}

/// Parse an uploaded master-configuration file.
pub fn parse_master_config(
    bytes: &[u8],
    source_name: &str,
) -> Result<Vec<ConfigRow>, IndexwatchError> {
    let text = decode_text(bytes);
    let table = Table::parse(&text, source_name)?;

    let has_key_column = FILENAME_COLUMNS
        .iter()
        .chain(NAME_COLUMNS)
        .any(|c| table.has_column(c));
    if !has_key_column && !table.is_empty() {
        return Err(IndexwatchError::Decode {
            source_name: source_name.to_string(),
            reason: "expected a Filename or Name column".into(),
        });
    }

    Ok(table
        .rows()
        .map(|row| ConfigRow {
            filename: row.get(FILENAME_COLUMNS).unwrap_or("").to_string(),
            name: row.get(NAME_COLUMNS).unwrap_or("").to_string(),
            display_name: row.get(DISPLAY_NAME_COLUMNS).unwrap_or("").to_string(),
            category: row.get(CATEGORY_COLUMNS).unwrap_or("").to_string(),
            alert_ticker: row.get(ALERT_TICKER_COLUMNS).map(str::to_string),
        })
        .collect())
}

/// Merge `rows` into the store in order, committing once at the end.
///
/// Any store failure aborts the batch and discards every row of it.
pub fn reconcile_config(
    store: &dyn IndexStore,
    rows: &[ConfigRow],
) -> Result<ReconcileReport, IndexwatchError> {
    let mut tx = store.begin()?;
    let mut report = ReconcileReport::default();

    for (line, row) in rows.iter().enumerate() {
        match apply_row(tx.as_mut(), row, &mut report)? {
            RowOutcome::Created => {
                report.processed += 1;
                report.created += 1;
            }
            RowOutcome::Updated => report.processed += 1,
            RowOutcome::Skipped => {
                debug!(row = line + 1, "config row skipped");
                report.skipped += 1;
            }
        }
    }

    tx.commit()?;
    info!(
        processed = report.processed,
        created = report.created,
        skipped = report.skipped,
        reassigned = report.filenames_reassigned,
        "master config applied"
    );
    Ok(report)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn apply_row(
    tx: &mut dyn StoreTx,
    row: &ConfigRow,
    report: &mut ReconcileReport,
) -> Result<RowOutcome, IndexwatchError> {
    let name = normalize_name(&row.name);
    let filename = row.filename.trim();
    if name.is_empty() && filename.is_empty() {
        return Ok(RowOutcome::Skipped);
    }

    let mut found = None;
    if !name.is_empty() {
        found = tx.find_index_by_name(&name)?;
    }
    if found.is_none() && !filename.is_empty() {
        found = tx.find_index_by_filename(filename)?;
    }

    let (mut index, outcome) = match found {
        Some(index) => (index, RowOutcome::Updated),
        None => {
            let new_name = if name.is_empty() {
                filename.to_uppercase()
            } else {
                name
            };
            if tx.find_index_by_name(&new_name)?.is_some() {
                warn!(name = %new_name, "index name already claimed in this batch, row skipped");
                return Ok(RowOutcome::Skipped);
            }
            (
                tx.insert_index(&NewIndex::named(new_name))?,
                RowOutcome::Created,
            )
        }
    };

    if let Some(display_name) = non_empty(&row.display_name) {
        index.display_name = display_name;
    }
    if let Some(category) = non_empty(&row.category) {
        index.category = Some(category);
    }
    if let Some(alert_ticker) = &row.alert_ticker {
        index.alert_ticker = non_empty(alert_ticker);
    }

    if !filename.is_empty() && index.expected_filename.as_deref() != Some(filename) {
        // Clear the previous holder first so the unique column never sees two owners.
        for previous in tx.release_filename(filename, Some(index.id))? {
            info!(
                filename,
                from = %previous,
                to = %index.name,
                "expected filename reassigned"
            );
            report.filenames_reassigned += 1;
        }
        index.expected_filename = Some(filename.to_string());
    }

    tx.update_index(&index)?;

    if let Some(alert_ticker) = &index.alert_ticker {
        tx.upsert_alert_mapping(alert_ticker, index.id)?;
    }

    Ok(outcome)
}

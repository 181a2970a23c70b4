//! Constituent uploads: resolve the target index and replace its membership.
//!
//! Target resolution, first match wins:
//! 1. the explicit index id, when given and known;
//! 2. the index whose expected filename equals the upload's filename;
//! 3. the index named after the filename (extension stripped, uppercased);
//! 4. a new index under that name, only with [`MatchPolicy::AutoCreate`].
//!
//! The membership set is always replaced wholesale inside one unit of work.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::domain::error::IndexwatchError;
use crate::domain::index::{Index, NewIndex, UNCATEGORIZED, name_from_filename};
use crate::domain::settings::UploadSettings;
use crate::domain::upload_text::{decode_text, read_first_column};
use crate::ports::store_port::{IndexStore, StoreTx};

/// What to do with a file no existing index claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Report the file as unmatched.
    #[default]
    Strict,
    /// Create an index named after the file.
    AutoCreate,
}

#[derive(Debug, Clone)]
pub struct IndexUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub index_id: Option<i64>,
    /// Applied only to indices that have no category yet.
    pub category: Option<String>,
}

impl IndexUpload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            index_id: None,
            category: None,
        }
    }

    pub fn size_kb(&self) -> f64 {
        (self.bytes.len() as f64 / 1024.0 * 100.0).round() / 100.0
    }

    fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub filename: String,
    pub index_id: i64,
    pub index_name: String,
    pub stocks_added: usize,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    AllFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub detail: String,
    pub processed: Vec<LoadOutcome>,
    pub errors: Vec<String>,
}

/// Load one constituent file and replace the target index's membership.
pub fn load_constituents(
    store: &dyn IndexStore,
    upload: &IndexUpload,
    policy: MatchPolicy,
) -> Result<LoadOutcome, IndexwatchError> {
    let text = decode_text(&upload.bytes);
    let tickers = read_first_column(&text, &upload.filename)?;

    let mut tx = store.begin()?;
    let (mut index, created) = resolve_target(tx.as_mut(), upload, policy)?;

    if !index.has_category() {
        if let Some(category) = upload.category() {
            index.category = Some(category.to_string());
        }
    }
    index.original_filename = Some(upload.filename.clone());
    index.file_size_kb = Some(upload.size_kb());
    index.upload_timestamp = Some(Utc::now());
    index.record_count = tickers.len() as i64;
    tx.update_index(&index)?;

    replace_constituents(tx.as_mut(), index.id, &tickers)?;
    tx.commit()?;

    info!(
        filename = %upload.filename,
        index = %index.name,
        tickers = tickers.len(),
        created,
        "constituents loaded"
    );
    Ok(LoadOutcome {
        filename: upload.filename.clone(),
        index_id: index.id,
        index_name: index.name,
        stocks_added: tickers.len(),
        created,
    })
}

fn resolve_target(
    tx: &mut dyn StoreTx,
    upload: &IndexUpload,
    policy: MatchPolicy,
) -> Result<(Index, bool), IndexwatchError> {
    if let Some(id) = upload.index_id {
        match tx.find_index_by_id(id)? {
            Some(index) => return Ok((index, false)),
            None => warn!(
                filename = %upload.filename,
                index_id = id,
                "requested index does not exist, matching by filename"
            ),
        }
    }

    if let Some(index) = tx.find_index_by_filename(&upload.filename)? {
        return Ok((index, false));
    }

    let legacy_name = name_from_filename(&upload.filename);
    if !legacy_name.is_empty() {
        if let Some(index) = tx.find_index_by_name(&legacy_name)? {
            return Ok((index, false));
        }
    }

    if policy == MatchPolicy::Strict {
        return Err(IndexwatchError::UnmatchedFile {
            filename: upload.filename.clone(),
        });
    }
    if legacy_name.is_empty() {
        return Err(IndexwatchError::validation(format!(
            "{}: cannot derive an index name from the filename",
            upload.filename
        )));
    }

    let mut new = NewIndex::named(legacy_name);
    new.category = Some(upload.category().unwrap_or(UNCATEGORIZED).to_string());
    new.expected_filename = Some(upload.filename.clone());
    Ok((tx.insert_index(&new)?, true))
}

fn replace_constituents(
    tx: &mut dyn StoreTx,
    index_id: i64,
    tickers: &[String],
) -> Result<(), IndexwatchError> {
    tx.delete_constituents(index_id)?;
    for (position, ticker) in tickers.iter().enumerate() {
        let stock = tx.get_or_create_stock(ticker)?;
        tx.insert_constituent(index_id, position, stock.id)?;
    }
    Ok(())
}

fn describe_failure(filename: &str, err: &IndexwatchError) -> String {
    match err {
        IndexwatchError::UnmatchedFile { .. } | IndexwatchError::InvalidFileType { .. } => {
            err.to_string()
        }
        _ => format!("{}: {}", filename, err),
    }
}

/// Load every file independently. A failing file is reported and never
/// stops the others.
pub fn load_batch(
    store: &dyn IndexStore,
    uploads: &[IndexUpload],
    policy: MatchPolicy,
    settings: &UploadSettings,
) -> BatchReport {
    let mut processed = Vec::new();
    let mut errors = Vec::new();

    for upload in uploads {
        let result = if settings.accepts(&upload.filename) {
            load_constituents(store, upload, policy)
        } else {
            Err(IndexwatchError::InvalidFileType {
                filename: upload.filename.clone(),
                expected: settings.expected(),
            })
        };

        match result {
            Ok(outcome) => processed.push(outcome),
            Err(e) => {
                if e.is_recoverable() {
                    warn!(filename = %upload.filename, error = %e, "file not loaded");
                } else {
                    error!(filename = %upload.filename, error = %e, "file failed");
                }
                errors.push(describe_failure(&upload.filename, &e));
            }
        }
    }

    let status = if processed.is_empty() {
        BatchStatus::AllFailed
    } else {
        BatchStatus::Success
    };
    BatchReport {
        status,
        detail: format!("Processed {} of {} files.", processed.len(), uploads.len()),
        processed,
        errors,
    }
}

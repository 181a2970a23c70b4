//! Decoding and parsing of uploaded text files.
//!
//! Uploads arrive as raw bytes. They are decoded as UTF-8, falling back to
//! Latin-1 when that fails, with any byte-order mark removed. Constituent
//! files are read as a single column; configuration and alert files are
//! header-based tables looked up by column name.

use crate::domain::error::IndexwatchError;
use csv::{ReaderBuilder, StringRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode an upload: UTF-8 first, Latin-1 otherwise. Never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// First field of every row, trimmed and uppercased. Rows whose first field
/// is empty are dropped; duplicates are kept in file order.
pub fn read_first_column(text: &str, source_name: &str) -> Result<Vec<String>, IndexwatchError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut values = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| IndexwatchError::Decode {
            source_name: source_name.to_string(),
            reason: format!("CSV parse error: {}", e),
        })?;
        let value = record.get(0).unwrap_or("").trim().to_uppercase();
        if !value.is_empty() {
            values.push(value);
        }
    }
    Ok(values)
}

/// A header-based table. Column lookup ignores case and surrounding spaces.
#[derive(Debug)]
pub struct Table {
    headers: Vec<String>,
    records: Vec<StringRecord>,
}

impl Table {
    pub fn parse(text: &str, source_name: &str) -> Result<Self, IndexwatchError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| IndexwatchError::Decode {
                source_name: source_name.to_string(),
                reason: format!("missing header row: {}", e),
            })?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let mut records = Vec::new();
        for result in rdr.records() {
            records.push(result.map_err(|e| IndexwatchError::Decode {
                source_name: source_name.to_string(),
                reason: format!("CSV parse error: {}", e),
            })?);
        }

        Ok(Self { headers, records })
    }

    fn column(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.headers.iter().position(|h| *h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.records.iter().map(move |record| TableRow {
            table: self,
            record,
        })
    }
}

pub struct TableRow<'a> {
    table: &'a Table,
    record: &'a StringRecord,
}

impl<'a> TableRow<'a> {
    /// Trimmed value of the first listed column holding a non-empty value.
    ///
    /// `None` when none of the columns exist; `Some("")` when they exist but
    /// are blank on this row.
    pub fn get(&self, names: &[&str]) -> Option<&'a str> {
        let mut seen = false;
        for name in names {
            if let Some(idx) = self.table.column(name) {
                seen = true;
                let value = self.record.get(idx).unwrap_or("").trim();
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        seen.then_some("")
    }

    /// Like [`TableRow::get`], but blank and missing both become `None`.
    pub fn non_empty(&self, names: &[&str]) -> Option<&'a str> {
        self.get(names).filter(|v| !v.is_empty())
    }
}

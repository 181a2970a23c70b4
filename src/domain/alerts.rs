//! Mapping of external 52-week high/low alerts onto known indices.

use serde::Serialize;
use tracing::debug;

use crate::domain::error::IndexwatchError;
use crate::domain::settings::SignalMatch;
use crate::domain::upload_text::{Table, TableRow, decode_text};
use crate::ports::store_port::IndexStore;

pub const NOT_MAPPED: &str = "Not mapped";
pub const INVALID_DATE: &str = "Invalid Date";

const TICKER_COLUMNS: &[&str] = &["ticker", "symbol"];
const DESCRIPTION_COLUMNS: &[&str] = &["description"];
const TIME_COLUMNS: &[&str] = &["time"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Signal {
    High,
    Low,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub ticker: String,
    pub description: String,
    pub date: String,
    pub signal: Signal,
    pub index_id: Option<i64>,
    pub index_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub highs: usize,
    pub lows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertReport {
    pub records: Vec<AlertRecord>,
    pub summary: AlertSummary,
}

pub fn classify_signal(description: &str, policy: SignalMatch) -> Signal {
    let lowered = description.to_lowercase();
    let (high, low) = match policy {
        SignalMatch::Substring => ("high", "low"),
        SignalMatch::Phrase => ("new 52-week high", "new 52-week low"),
    };
    if lowered.contains(high) {
        Signal::High
    } else if lowered.contains(low) {
        Signal::Low
    } else {
        Signal::Unknown
    }
}

/// `"NSE:NIFTYBANK, 1D"` -> `"NIFTYBANK"`.
pub fn base_token(raw: &str) -> &str {
    let without_timeframe = raw.split(',').next().unwrap_or(raw);
    let without_exchange = without_timeframe
        .rsplit(':')
        .next()
        .unwrap_or(without_timeframe);
    without_exchange.trim()
}

/// Date part of an ISO timestamp; other values pass through.
pub fn normalize_date(time: Option<&str>) -> String {
    match time {
        None => INVALID_DATE.to_string(),
        Some(value) => match value.split_once('T') {
            Some((date, _)) => date.to_string(),
            None => value.to_string(),
        },
    }
}

/// Explicit mapping first, then the cleaned ticker as an index name.
pub fn resolve_alert_index(
    store: &dyn IndexStore,
    raw_ticker: &str,
) -> Result<Option<(i64, String)>, IndexwatchError> {
    if let Some(index_id) = store.alert_mapping(raw_ticker)? {
        if let Some(index) = store.get_index(index_id)? {
            return Ok(Some((index.id, index.display_name)));
        }
        debug!(ticker = raw_ticker, index_id, "alert mapping points at a deleted index");
    }

    let token = base_token(raw_ticker);
    if token.is_empty() {
        return Ok(None);
    }
    Ok(store
        .find_index_by_name(token)?
        .map(|index| (index.id, index.display_name)))
}

pub fn map_alert_row(
    store: &dyn IndexStore,
    row: &TableRow<'_>,
    policy: SignalMatch,
) -> Result<Option<AlertRecord>, IndexwatchError> {
    let ticker = match row.non_empty(TICKER_COLUMNS) {
        Some(ticker) => ticker.trim(),
        None => return Ok(None),
    };
    let description = row.get(DESCRIPTION_COLUMNS).unwrap_or("").to_string();
    let resolved = resolve_alert_index(store, ticker)?;

    Ok(Some(AlertRecord {
        ticker: ticker.to_string(),
        signal: classify_signal(&description, policy),
        date: normalize_date(row.get(TIME_COLUMNS)),
        index_id: resolved.as_ref().map(|(id, _)| *id),
        index_name: resolved
            .map(|(_, name)| name)
            .unwrap_or_else(|| NOT_MAPPED.to_string()),
        description,
    }))
}

/// Map every row of an uploaded alert export. Read-only.
pub fn process_alerts(
    store: &dyn IndexStore,
    bytes: &[u8],
    source_name: &str,
    policy: SignalMatch,
) -> Result<AlertReport, IndexwatchError> {
    let table = Table::parse(&decode_text(bytes), source_name)?;

    let mut report = AlertReport::default();
    for row in table.rows() {
        let Some(record) = map_alert_row(store, &row, policy)? else {
            continue;
        };
        match record.signal {
            Signal::High => report.summary.highs += 1,
            Signal::Low => report.summary.lows += 1,
            Signal::Unknown => {}
        }
        report.records.push(record);
    }
    report.summary.total = report.records.len();

    debug!(
        source = source_name,
        total = report.summary.total,
        "processed alert file"
    );
    Ok(report)
}

//! Entity store port: indices, stocks, membership edges and alert mappings.

use crate::domain::error::IndexwatchError;
use crate::domain::index::{Index, NewIndex, Stock};

/// Read access to the store plus the entry point for mutations.
///
/// Every write goes through a [`StoreTx`] obtained from [`IndexStore::begin`],
/// so a failing operation never leaves partial state behind.
pub trait IndexStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, IndexwatchError>;

    /// All indices, most recently uploaded first; never-uploaded indices last.
    fn list_indices(&self) -> Result<Vec<Index>, IndexwatchError>;

    fn get_index(&self, id: i64) -> Result<Option<Index>, IndexwatchError>;

    /// Exact, case-sensitive match on the stored name.
    fn find_index_by_name(&self, name: &str) -> Result<Option<Index>, IndexwatchError>;

    /// Tickers of an index in upload order, duplicates included.
    fn index_tickers(&self, index_id: i64) -> Result<Vec<String>, IndexwatchError>;

    /// Index id an alert identifier is mapped to, if any.
    fn alert_mapping(&self, alert_ticker: &str) -> Result<Option<i64>, IndexwatchError>;

    /// Indices holding at least one stock whose ticker contains `fragment`.
    fn search_indices_by_ticker(&self, fragment: &str) -> Result<Vec<Index>, IndexwatchError>;

    fn count_stocks(&self) -> Result<usize, IndexwatchError>;
}

/// One unit of work. Dropping it without calling [`StoreTx::commit`]
/// discards every change made through it.
pub trait StoreTx {
    fn find_index_by_id(&mut self, id: i64) -> Result<Option<Index>, IndexwatchError>;

    fn find_index_by_name(&mut self, name: &str) -> Result<Option<Index>, IndexwatchError>;

    fn find_index_by_filename(&mut self, filename: &str)
    -> Result<Option<Index>, IndexwatchError>;

    /// Fails if the name or the expected filename is already taken.
    fn insert_index(&mut self, new: &NewIndex) -> Result<Index, IndexwatchError>;

    /// Writes every mutable column of `index`, keyed by its id.
    fn update_index(&mut self, index: &Index) -> Result<(), IndexwatchError>;

    /// Clears `expected_filename` on any index other than `keep` that holds
    /// `filename`. Returns the names of the indices it was taken from.
    fn release_filename(
        &mut self,
        filename: &str,
        keep: Option<i64>,
    ) -> Result<Vec<String>, IndexwatchError>;

    /// Deletes the index row only; callers remove membership edges first.
    fn delete_index(&mut self, id: i64) -> Result<bool, IndexwatchError>;

    fn get_or_create_stock(&mut self, ticker: &str) -> Result<Stock, IndexwatchError>;

    fn delete_constituents(&mut self, index_id: i64) -> Result<usize, IndexwatchError>;

    /// Appends one membership edge at `position` in the index's list.
    fn insert_constituent(
        &mut self,
        index_id: i64,
        position: usize,
        stock_id: i64,
    ) -> Result<(), IndexwatchError>;

    /// Points `alert_ticker` at `index_id`, replacing any previous target.
    fn upsert_alert_mapping(
        &mut self,
        alert_ticker: &str,
        index_id: i64,
    ) -> Result<(), IndexwatchError>;

    fn commit(self: Box<Self>) -> Result<(), IndexwatchError>;
}

//! Read-side queries over the entity store and explicit index deletion.

use serde::Serialize;
use tracing::info;

use crate::domain::error::IndexwatchError;
use crate::domain::index::Index;
use crate::ports::store_port::IndexStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStocks {
    pub index_id: i64,
    pub name: String,
    pub display_name: String,
    pub stocks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedIndex {
    pub id: i64,
    pub name: String,
    pub constituents_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub indices: usize,
    pub stocks: usize,
}

pub fn list_indices(store: &dyn IndexStore) -> Result<Vec<Index>, IndexwatchError> {
    store.list_indices()
}

pub fn index_stocks(store: &dyn IndexStore, id: i64) -> Result<IndexStocks, IndexwatchError> {
    let index = store
        .get_index(id)?
        .ok_or(IndexwatchError::NotFound { entity: "index", id })?;
    Ok(IndexStocks {
        stocks: store.index_tickers(index.id)?,
        index_id: index.id,
        name: index.name,
        display_name: index.display_name,
    })
}

/// Removes the index and all of its membership edges in one unit of work.
/// Stocks and alert mappings are left in place.
pub fn delete_index(store: &dyn IndexStore, id: i64) -> Result<DeletedIndex, IndexwatchError> {
    let mut tx = store.begin()?;
    let index = tx
        .find_index_by_id(id)?
        .ok_or(IndexwatchError::NotFound { entity: "index", id })?;

    let constituents_removed = tx.delete_constituents(id)?;
    if !tx.delete_index(id)? {
        return Err(IndexwatchError::NotFound { entity: "index", id });
    }
    tx.commit()?;

    info!(id, name = %index.name, constituents_removed, "deleted index");
    Ok(DeletedIndex {
        id,
        name: index.name,
        constituents_removed,
    })
}

/// Indices holding any stock whose ticker contains `query`, ignoring case.
pub fn search_indices(store: &dyn IndexStore, query: &str) -> Result<Vec<Index>, IndexwatchError> {
    let fragment = query.trim().to_uppercase();
    if fragment.is_empty() {
        return Err(IndexwatchError::validation("search query must not be empty"));
    }
    store.search_indices_by_ticker(&fragment)
}

pub fn health(store: &dyn IndexStore) -> Result<HealthReport, IndexwatchError> {
    Ok(HealthReport {
        status: "ok",
        indices: store.list_indices()?.len(),
        stocks: store.count_stocks()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryStore;
    use crate::domain::constituents::{IndexUpload, MatchPolicy, load_constituents};

    fn seeded() -> (MemoryStore, i64) {
        let store = MemoryStore::new();
        let outcome = load_constituents(
            &store,
            &IndexUpload::new("NIFTY_BANK.csv", "HDFCBANK\nICICIBANK\nHDFCBANK\n"),
            MatchPolicy::AutoCreate,
        )
        .unwrap();
        (store, outcome.index_id)
    }

    #[test]
    fn index_stocks_in_upload_order() {
        let (store, id) = seeded();
        let stocks = index_stocks(&store, id).unwrap();
        assert_eq!(stocks.name, "NIFTY_BANK");
        assert_eq!(stocks.stocks, vec!["HDFCBANK", "ICICIBANK", "HDFCBANK"]);
    }

    #[test]
    fn index_stocks_unknown_id() {
        let store = MemoryStore::new();
        let err = index_stocks(&store, 7).unwrap_err();
        assert!(matches!(err, IndexwatchError::NotFound { id: 7, .. }));
    }

    #[test]
    fn delete_cascades_to_edges_but_keeps_stocks() {
        let (store, id) = seeded();
        let deleted = delete_index(&store, id).unwrap();
        assert_eq!(deleted.constituents_removed, 3);
        assert!(store.get_index(id).unwrap().is_none());
        assert!(store.index_tickers(id).unwrap().is_empty());
        assert_eq!(store.count_stocks().unwrap(), 2);
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            delete_index(&store, 99),
            Err(IndexwatchError::NotFound { .. })
        ));
    }

    #[test]
    fn search_uppercases_query() {
        let (store, id) = seeded();
        let hits = search_indices(&store, " icici ").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert!(search_indices(&store, "TCS").unwrap().is_empty());
    }

    #[test]
    fn blank_search_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            search_indices(&store, "  "),
            Err(IndexwatchError::Validation { .. })
        ));
    }

    #[test]
    fn health_counts() {
        let (store, _) = seeded();
        let report = health(&store).unwrap();
        assert_eq!(report.indices, 1);
        assert_eq!(report.stocks, 2);
    }
}

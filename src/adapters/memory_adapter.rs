//! In-process store adapter.
//!
//! Holds everything in a mutex-guarded snapshot. A unit of work edits a
//! private copy which replaces the shared snapshot on commit, so readers
//! never see a half-applied change. Units of work hold a writer lock from
//! `begin` until commit or drop, so writers run one at a time.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::error::IndexwatchError;
use crate::domain::index::{Index, NewIndex, Stock};
use crate::ports::store_port::{IndexStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    indices: BTreeMap<i64, Index>,
    stocks: BTreeMap<i64, Stock>,
    /// ticker -> stock id
    tickers: BTreeMap<String, i64>,
    /// index id -> (position, stock id), kept sorted by position
    constituents: BTreeMap<i64, Vec<(usize, i64)>>,
    alert_map: BTreeMap<String, i64>,
    next_index_id: i64,
    next_stock_id: i64,
}

impl MemoryState {
    fn index_by_name(&self, name: &str) -> Option<&Index> {
        self.indices.values().find(|i| i.name == name)
    }

    fn index_by_filename(&self, filename: &str) -> Option<&Index> {
        self.indices
            .values()
            .find(|i| i.expected_filename.as_deref() == Some(filename))
    }

    fn check_unique(
        &self,
        id: Option<i64>,
        name: &str,
        filename: Option<&str>,
    ) -> Result<(), IndexwatchError> {
        if self.index_by_name(name).is_some_and(|i| Some(i.id) != id) {
            return Err(constraint("indices.name"));
        }
        if let Some(filename) = filename {
            if self.index_by_filename(filename).is_some_and(|i| Some(i.id) != id) {
                return Err(constraint("indices.expected_filename"));
            }
        }
        Ok(())
    }
}

fn constraint(column: &str) -> IndexwatchError {
    IndexwatchError::DatabaseQuery {
        reason: format!("UNIQUE constraint failed: {}", column),
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    writer: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, IndexwatchError> {
        self.state.lock().map_err(|_| IndexwatchError::Database {
            reason: "memory store lock poisoned".into(),
        })
    }
}

impl IndexStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, IndexwatchError> {
        let writer = self.writer.lock().map_err(|_| IndexwatchError::Database {
            reason: "memory store writer lock poisoned".into(),
        })?;
        let working = self.lock()?.clone();
        Ok(Box::new(MemoryTx {
            store: self,
            working,
            _writer: writer,
        }))
    }

    fn list_indices(&self) -> Result<Vec<Index>, IndexwatchError> {
        let mut indices: Vec<Index> = self.lock()?.indices.values().cloned().collect();
        // None sorts before Some, so reversing puts newest first and unset last.
        indices.sort_by(|a, b| {
            b.upload_timestamp
                .cmp(&a.upload_timestamp)
                .then(b.id.cmp(&a.id))
        });
        Ok(indices)
    }

    fn get_index(&self, id: i64) -> Result<Option<Index>, IndexwatchError> {
        Ok(self.lock()?.indices.get(&id).cloned())
    }

    fn find_index_by_name(&self, name: &str) -> Result<Option<Index>, IndexwatchError> {
        Ok(self.lock()?.index_by_name(name).cloned())
    }

    fn index_tickers(&self, index_id: i64) -> Result<Vec<String>, IndexwatchError> {
        let state = self.lock()?;
        let edges = match state.constituents.get(&index_id) {
            Some(edges) => edges,
            None => return Ok(Vec::new()),
        };
        Ok(edges
            .iter()
            .filter_map(|(_, stock_id)| state.stocks.get(stock_id))
            .map(|s| s.ticker.clone())
            .collect())
    }

    fn alert_mapping(&self, alert_ticker: &str) -> Result<Option<i64>, IndexwatchError> {
        Ok(self.lock()?.alert_map.get(alert_ticker).copied())
    }

    fn search_indices_by_ticker(&self, fragment: &str) -> Result<Vec<Index>, IndexwatchError> {
        let state = self.lock()?;
        let mut found: Vec<Index> = state
            .indices
            .values()
            .filter(|index| {
                state.constituents.get(&index.id).is_some_and(|edges| {
                    edges.iter().any(|(_, stock_id)| {
                        state
                            .stocks
                            .get(stock_id)
                            .is_some_and(|s| s.ticker.contains(fragment))
                    })
                })
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn count_stocks(&self) -> Result<usize, IndexwatchError> {
        Ok(self.lock()?.stocks.len())
    }
}

pub struct MemoryTx<'a> {
    store: &'a MemoryStore,
    working: MemoryState,
    _writer: MutexGuard<'a, ()>,
}

impl StoreTx for MemoryTx<'_> {
    fn find_index_by_id(&mut self, id: i64) -> Result<Option<Index>, IndexwatchError> {
        Ok(self.working.indices.get(&id).cloned())
    }

    fn find_index_by_name(&mut self, name: &str) -> Result<Option<Index>, IndexwatchError> {
        Ok(self.working.index_by_name(name).cloned())
    }

    fn find_index_by_filename(
        &mut self,
        filename: &str,
    ) -> Result<Option<Index>, IndexwatchError> {
        Ok(self.working.index_by_filename(filename).cloned())
    }

    fn insert_index(&mut self, new: &NewIndex) -> Result<Index, IndexwatchError> {
        self.working
            .check_unique(None, &new.name, new.expected_filename.as_deref())?;
        self.working.next_index_id += 1;
        let index = Index {
            id: self.working.next_index_id,
            name: new.name.clone(),
            display_name: new.display_name.clone(),
            category: new.category.clone(),
            expected_filename: new.expected_filename.clone(),
            alert_ticker: new.alert_ticker.clone(),
            is_flagged: false,
            original_filename: None,
            upload_timestamp: None,
            file_size_kb: None,
            record_count: 0,
        };
        self.working.indices.insert(index.id, index.clone());
        Ok(index)
    }

    fn update_index(&mut self, index: &Index) -> Result<(), IndexwatchError> {
        if !self.working.indices.contains_key(&index.id) {
            return Err(IndexwatchError::NotFound {
                entity: "index",
                id: index.id,
            });
        }
        self.working.check_unique(
            Some(index.id),
            &index.name,
            index.expected_filename.as_deref(),
        )?;
        self.working.indices.insert(index.id, index.clone());
        Ok(())
    }

    fn release_filename(
        &mut self,
        filename: &str,
        keep: Option<i64>,
    ) -> Result<Vec<String>, IndexwatchError> {
        let mut released = Vec::new();
        for index in self.working.indices.values_mut() {
            if Some(index.id) != keep && index.expected_filename.as_deref() == Some(filename) {
                index.expected_filename = None;
                released.push(index.name.clone());
            }
        }
        Ok(released)
    }

    fn delete_index(&mut self, id: i64) -> Result<bool, IndexwatchError> {
        if self.working.constituents.get(&id).is_some_and(|e| !e.is_empty()) {
            return Err(IndexwatchError::DatabaseQuery {
                reason: "FOREIGN KEY constraint failed".into(),
            });
        }
        self.working.constituents.remove(&id);
        Ok(self.working.indices.remove(&id).is_some())
    }

    fn get_or_create_stock(&mut self, ticker: &str) -> Result<Stock, IndexwatchError> {
        if let Some(&id) = self.working.tickers.get(ticker) {
            return Ok(Stock {
                id,
                ticker: ticker.to_string(),
            });
        }
        self.working.next_stock_id += 1;
        let stock = Stock {
            id: self.working.next_stock_id,
            ticker: ticker.to_string(),
        };
        self.working.stocks.insert(stock.id, stock.clone());
        self.working.tickers.insert(stock.ticker.clone(), stock.id);
        Ok(stock)
    }

    fn delete_constituents(&mut self, index_id: i64) -> Result<usize, IndexwatchError> {
        Ok(self
            .working
            .constituents
            .remove(&index_id)
            .map(|edges| edges.len())
            .unwrap_or(0))
    }

    fn insert_constituent(
        &mut self,
        index_id: i64,
        position: usize,
        stock_id: i64,
    ) -> Result<(), IndexwatchError> {
        if !self.working.indices.contains_key(&index_id)
            || !self.working.stocks.contains_key(&stock_id)
        {
            return Err(IndexwatchError::DatabaseQuery {
                reason: "FOREIGN KEY constraint failed".into(),
            });
        }
        let edges = self.working.constituents.entry(index_id).or_default();
        match edges.binary_search_by_key(&position, |(p, _)| *p) {
            Ok(_) => Err(constraint("index_constituents.index_id, index_constituents.position")),
            Err(at) => {
                edges.insert(at, (position, stock_id));
                Ok(())
            }
        }
    }

    fn upsert_alert_mapping(
        &mut self,
        alert_ticker: &str,
        index_id: i64,
    ) -> Result<(), IndexwatchError> {
        self.working
            .alert_map
            .insert(alert_ticker.to_string(), index_id);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), IndexwatchError> {
        let MemoryTx { store, working, .. } = *self;
        *store.lock()? = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncommitted_changes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().unwrap();
            tx.insert_index(&NewIndex::named("NIFTY")).unwrap();
        }
        assert!(store.list_indices().unwrap().is_empty());
    }

    #[test]
    fn committed_changes_are_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let index = tx.insert_index(&NewIndex::named("NIFTY")).unwrap();
        let stock = tx.get_or_create_stock("TCS").unwrap();
        tx.insert_constituent(index.id, 0, stock.id).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.index_tickers(index.id).unwrap(), vec!["TCS"]);
        assert_eq!(store.count_stocks().unwrap(), 1);
    }

    #[test]
    fn stock_lookup_reuses_existing_ticker() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let first = tx.get_or_create_stock("TCS").unwrap();
        let other = tx.get_or_create_stock("INFY").unwrap();
        assert_eq!(tx.get_or_create_stock("TCS").unwrap(), first);
        assert_ne!(other.id, first.id);
        tx.commit().unwrap();
        assert_eq!(store.count_stocks().unwrap(), 2);
    }

    #[test]
    fn concurrent_units_of_work_keep_both_changes() {
        let store = MemoryStore::new();
        std::thread::scope(|scope| {
            for name in ["NIFTY_IT", "NIFTY_BANK"] {
                let store = &store;
                scope.spawn(move || {
                    let mut tx = store.begin().unwrap();
                    tx.insert_index(&NewIndex::named(name)).unwrap();
                    tx.commit().unwrap();
                });
            }
        });

        let mut names: Vec<String> = store
            .list_indices()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["NIFTY_BANK", "NIFTY_IT"]);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.insert_index(&NewIndex::named("NIFTY")).unwrap();
        let err = tx.insert_index(&NewIndex::named("NIFTY")).unwrap_err();
        assert!(err.to_string().contains("indices.name"));
    }

    #[test]
    fn duplicate_expected_filename_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let mut a = NewIndex::named("A");
        a.expected_filename = Some("list.csv".into());
        tx.insert_index(&a).unwrap();
        let mut b = NewIndex::named("B");
        b.expected_filename = Some("list.csv".into());
        assert!(tx.insert_index(&b).is_err());
    }

    #[test]
    fn release_filename_skips_kept_index() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let mut a = NewIndex::named("A");
        a.expected_filename = Some("list.csv".into());
        let a = tx.insert_index(&a).unwrap();

        assert!(tx.release_filename("list.csv", Some(a.id)).unwrap().is_empty());
        assert_eq!(tx.release_filename("list.csv", None).unwrap(), vec!["A"]);
        assert!(tx.find_index_by_filename("list.csv").unwrap().is_none());
    }

    #[test]
    fn delete_index_requires_edges_removed_first() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        let index = tx.insert_index(&NewIndex::named("NIFTY")).unwrap();
        let stock = tx.get_or_create_stock("TCS").unwrap();
        tx.insert_constituent(index.id, 0, stock.id).unwrap();

        assert!(tx.delete_index(index.id).is_err());
        assert_eq!(tx.delete_constituents(index.id).unwrap(), 1);
        assert!(tx.delete_index(index.id).unwrap());
    }
}

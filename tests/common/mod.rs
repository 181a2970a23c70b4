#![allow(dead_code)]

use indexwatch::adapters::memory_adapter::MemoryStore;
use indexwatch::domain::error::IndexwatchError;
use indexwatch::domain::index::{Index, NewIndex, Stock};
use indexwatch::ports::store_port::{IndexStore, StoreTx};

#[cfg(feature = "sqlite")]
use indexwatch::adapters::sqlite_adapter::SqliteAdapter;

#[cfg(feature = "sqlite")]
pub fn sqlite_store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
}

pub fn memory_store() -> MemoryStore {
    MemoryStore::new()
}

/// Insert an index directly, bypassing reconciliation.
pub fn seed_index(store: &dyn IndexStore, name: &str, filename: Option<&str>) -> Index {
    let mut tx = store.begin().unwrap();
    let mut new = NewIndex::named(name);
    new.expected_filename = filename.map(str::to_string);
    let index = tx.insert_index(&new).unwrap();
    tx.commit().unwrap();
    index
}

/// Master-configuration CSV with the standard header.
pub fn config_csv(rows: &[[&str; 5]]) -> String {
    let mut out = String::from("Filename,Name,DisplayName,Category,TVTicker\n");
    for row in rows {
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn tickers(store: &dyn IndexStore, index_id: i64) -> Vec<String> {
    store.index_tickers(index_id).unwrap()
}

pub fn index_named(store: &dyn IndexStore, name: &str) -> Index {
    store
        .find_index_by_name(name)
        .unwrap()
        .unwrap_or_else(|| panic!("index {name} should exist"))
}

/// Store mutation a [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    InsertConstituent,
    UpsertAlertMapping,
}

/// Wraps a store so that the `nth` call (1-based) of one mutation inside a
/// unit of work returns an error. The count restarts with every `begin`.
pub struct FaultyStore<S> {
    pub inner: S,
    fail_on: FailOn,
    nth: usize,
}

impl<S: IndexStore> FaultyStore<S> {
    pub fn new(inner: S, fail_on: FailOn, nth: usize) -> Self {
        Self {
            inner,
            fail_on,
            nth,
        }
    }
}

impl<S: IndexStore> IndexStore for FaultyStore<S> {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, IndexwatchError> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin()?,
            fail_on: self.fail_on,
            nth: self.nth,
            calls: 0,
        }))
    }

    fn list_indices(&self) -> Result<Vec<Index>, IndexwatchError> {
        self.inner.list_indices()
    }

    fn get_index(&self, id: i64) -> Result<Option<Index>, IndexwatchError> {
        self.inner.get_index(id)
    }

    fn find_index_by_name(&self, name: &str) -> Result<Option<Index>, IndexwatchError> {
        self.inner.find_index_by_name(name)
    }

    fn index_tickers(&self, index_id: i64) -> Result<Vec<String>, IndexwatchError> {
        self.inner.index_tickers(index_id)
    }

    fn alert_mapping(&self, alert_ticker: &str) -> Result<Option<i64>, IndexwatchError> {
        self.inner.alert_mapping(alert_ticker)
    }

    fn search_indices_by_ticker(&self, fragment: &str) -> Result<Vec<Index>, IndexwatchError> {
        self.inner.search_indices_by_ticker(fragment)
    }

    fn count_stocks(&self) -> Result<usize, IndexwatchError> {
        self.inner.count_stocks()
    }
}

struct FaultyTx<'a> {
    inner: Box<dyn StoreTx + 'a>,
    fail_on: FailOn,
    nth: usize,
    calls: usize,
}

impl FaultyTx<'_> {
    fn tick(&mut self, op: FailOn) -> Result<(), IndexwatchError> {
        if op == self.fail_on {
            self.calls += 1;
            if self.calls == self.nth {
                return Err(IndexwatchError::Database {
                    reason: format!("injected {:?} failure", op),
                });
            }
        }
        Ok(())
    }
}

impl StoreTx for FaultyTx<'_> {
    fn find_index_by_id(&mut self, id: i64) -> Result<Option<Index>, IndexwatchError> {
        self.inner.find_index_by_id(id)
    }

    fn find_index_by_name(&mut self, name: &str) -> Result<Option<Index>, IndexwatchError> {
        self.inner.find_index_by_name(name)
    }

    fn find_index_by_filename(
        &mut self,
        filename: &str,
    ) -> Result<Option<Index>, IndexwatchError> {
        self.inner.find_index_by_filename(filename)
    }

    fn insert_index(&mut self, new: &NewIndex) -> Result<Index, IndexwatchError> {
        self.inner.insert_index(new)
    }

    fn update_index(&mut self, index: &Index) -> Result<(), IndexwatchError> {
        self.inner.update_index(index)
    }

    fn release_filename(
        &mut self,
        filename: &str,
        keep: Option<i64>,
    ) -> Result<Vec<String>, IndexwatchError> {
        self.inner.release_filename(filename, keep)
    }

    fn delete_index(&mut self, id: i64) -> Result<bool, IndexwatchError> {
        self.inner.delete_index(id)
    }

    fn get_or_create_stock(&mut self, ticker: &str) -> Result<Stock, IndexwatchError> {
        self.inner.get_or_create_stock(ticker)
    }

    fn delete_constituents(&mut self, index_id: i64) -> Result<usize, IndexwatchError> {
        self.inner.delete_constituents(index_id)
    }

    fn insert_constituent(
        &mut self,
        index_id: i64,
        position: usize,
        stock_id: i64,
    ) -> Result<(), IndexwatchError> {
        self.tick(FailOn::InsertConstituent)?;
        self.inner.insert_constituent(index_id, position, stock_id)
    }

    fn upsert_alert_mapping(
        &mut self,
        alert_ticker: &str,
        index_id: i64,
    ) -> Result<(), IndexwatchError> {
        self.tick(FailOn::UpsertAlertMapping)?;
        self.inner.upsert_alert_mapping(alert_ticker, index_id)
    }

    fn commit(self: Box<Self>) -> Result<(), IndexwatchError> {
        self.inner.commit()
    }
}

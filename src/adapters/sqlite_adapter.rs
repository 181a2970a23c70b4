//! SQLite store adapter.
//!
//! Connections come from an r2d2 pool with foreign keys enabled. A unit of
//! work holds one pooled connection inside `BEGIN IMMEDIATE` and issues
//! `ROLLBACK` when dropped without a commit.

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use tracing::warn;

use crate::domain::error::IndexwatchError;
use crate::domain::index::{Index, NewIndex, Stock};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{IndexStore, StoreTx};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS indices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        category TEXT,
        expected_filename TEXT UNIQUE,
        alert_ticker TEXT,
        is_flagged INTEGER NOT NULL DEFAULT 0,
        original_filename TEXT,
        upload_timestamp TEXT,
        file_size_kb REAL,
        record_count INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS stocks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS index_constituents (
        index_id INTEGER NOT NULL REFERENCES indices(id),
        position INTEGER NOT NULL,
        stock_id INTEGER NOT NULL REFERENCES stocks(id),
        PRIMARY KEY (index_id, position)
    );
    CREATE INDEX IF NOT EXISTS idx_constituents_stock ON index_constituents(stock_id);
    CREATE TABLE IF NOT EXISTS tradingview_map (
        alert_ticker TEXT PRIMARY KEY,
        index_id INTEGER NOT NULL
    );";

const INDEX_COLUMNS: &str = "id, name, display_name, category, expected_filename, alert_ticker,
    is_flagged, original_filename, upload_timestamp, file_size_kb, record_count";

const CONNECTION_INIT: &str = "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

fn pool_err(e: r2d2::Error) -> IndexwatchError {
    IndexwatchError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> IndexwatchError {
    IndexwatchError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn index_from_row(row: &Row<'_>) -> rusqlite::Result<Index> {
    let upload_timestamp = match row.get::<_, Option<String>>(8)? {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        8,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        ),
        None => None,
    };
    Ok(Index {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        category: row.get(3)?,
        expected_filename: row.get(4)?,
        alert_ticker: row.get(5)?,
        is_flagged: row.get(6)?,
        original_filename: row.get(7)?,
        upload_timestamp,
        file_size_kb: row.get(9)?,
        record_count: row.get(10)?,
    })
}

fn select_one_index(
    conn: &Connection,
    filter: &str,
    param: &dyn ToSql,
) -> Result<Option<Index>, IndexwatchError> {
    let query = format!("SELECT {} FROM indices WHERE {}", INDEX_COLUMNS, filter);
    conn.query_row(&query, [param], index_from_row)
        .optional()
        .map_err(query_err)
}

fn select_indices(
    conn: &Connection,
    query: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Index>, IndexwatchError> {
    let mut stmt = conn.prepare(query).map_err(query_err)?;
    let rows = stmt.query_map(params, index_from_row).map_err(query_err)?;

    let mut indices = Vec::new();
    for row in rows {
        indices.push(row.map_err(query_err)?);
    }
    Ok(indices)
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, IndexwatchError> {
        let db_path =
            config
                .get_string("database", "path")
                .ok_or_else(|| IndexwatchError::ConfigMissing {
                    section: "database".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("database", "pool_size", 4);
        if pool_size < 1 {
            return Err(IndexwatchError::ConfigInvalid {
                section: "database".into(),
                key: "pool_size".into(),
                reason: "pool_size must be at least 1".into(),
            });
        }

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch(CONNECTION_INIT));
        let pool = Pool::builder()
            .max_size(pool_size as u32)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, IndexwatchError> {
        let manager =
            SqliteConnectionManager::memory().with_init(|conn| conn.execute_batch(CONNECTION_INIT));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), IndexwatchError> {
        let conn = self.pool.get().map_err(pool_err)?;
        conn.execute_batch(SCHEMA).map_err(query_err)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, IndexwatchError> {
        self.pool.get().map_err(pool_err)
    }
}

impl IndexStore for SqliteAdapter {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, IndexwatchError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE").map_err(query_err)?;
        Ok(Box::new(SqliteTx {
            conn,
            finished: false,
        }))
    }

    fn list_indices(&self) -> Result<Vec<Index>, IndexwatchError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {} FROM indices
             ORDER BY upload_timestamp IS NULL, upload_timestamp DESC, id DESC",
            INDEX_COLUMNS
        );
        select_indices(&conn, &query, &[])
    }

    fn get_index(&self, id: i64) -> Result<Option<Index>, IndexwatchError> {
        select_one_index(&*self.conn()?, "id = ?1", &id)
    }

    fn find_index_by_name(&self, name: &str) -> Result<Option<Index>, IndexwatchError> {
        select_one_index(&*self.conn()?, "name = ?1", &name)
    }

    fn index_tickers(&self, index_id: i64) -> Result<Vec<String>, IndexwatchError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.ticker FROM index_constituents c
                 JOIN stocks s ON s.id = c.stock_id
                 WHERE c.index_id = ?1
                 ORDER BY c.position",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![index_id], |row| row.get(0))
            .map_err(query_err)?;

        let mut tickers = Vec::new();
        for row in rows {
            tickers.push(row.map_err(query_err)?);
        }
        Ok(tickers)
    }

    fn alert_mapping(&self, alert_ticker: &str) -> Result<Option<i64>, IndexwatchError> {
        self.conn()?
            .query_row(
                "SELECT index_id FROM tradingview_map WHERE alert_ticker = ?1",
                params![alert_ticker],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)
    }

    fn search_indices_by_ticker(&self, fragment: &str) -> Result<Vec<Index>, IndexwatchError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {} FROM indices WHERE id IN (
                SELECT c.index_id FROM index_constituents c
                JOIN stocks s ON s.id = c.stock_id
                WHERE instr(s.ticker, ?1) > 0
             )
             ORDER BY name",
            INDEX_COLUMNS
        );
        select_indices(&conn, &query, &[&fragment as &dyn ToSql])
    }

    fn count_stocks(&self) -> Result<usize, IndexwatchError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM stocks", [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as usize)
    }
}

pub struct SqliteTx {
    conn: PooledConnection<SqliteConnectionManager>,
    finished: bool,
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback failed");
            }
        }
    }
}

impl StoreTx for SqliteTx {
    fn find_index_by_id(&mut self, id: i64) -> Result<Option<Index>, IndexwatchError> {
        select_one_index(&self.conn, "id = ?1", &id)
    }

    fn find_index_by_name(&mut self, name: &str) -> Result<Option<Index>, IndexwatchError> {
        select_one_index(&self.conn, "name = ?1", &name)
    }

    fn find_index_by_filename(
        &mut self,
        filename: &str,
    ) -> Result<Option<Index>, IndexwatchError> {
        select_one_index(&self.conn, "expected_filename = ?1", &filename)
    }

    fn insert_index(&mut self, new: &NewIndex) -> Result<Index, IndexwatchError> {
        self.conn
            .execute(
                "INSERT INTO indices (name, display_name, category, expected_filename, alert_ticker)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new.name,
                    new.display_name,
                    new.category,
                    new.expected_filename,
                    new.alert_ticker
                ],
            )
            .map_err(query_err)?;

        Ok(Index {
            id: self.conn.last_insert_rowid(),
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
        })
    }

    fn update_index(&mut self, index: &Index) -> Result<(), IndexwatchError> {
        let changed = self
            .conn
            .execute(
                "UPDATE indices SET
                    name = ?2, display_name = ?3, category = ?4, expected_filename = ?5,
                    alert_ticker = ?6, is_flagged = ?7, original_filename = ?8,
                    upload_timestamp = ?9, file_size_kb = ?10, record_count = ?11
                 WHERE id = ?1",
                params![
                    index.id,
                    index.name,
                    index.display_name,
                    index.category,
                    index.expected_filename,
                    index.alert_ticker,
                    index.is_flagged,
                    index.original_filename,
                    index.upload_timestamp.as_ref().map(format_timestamp),
                    index.file_size_kb,
                    index.record_count
                ],
            )
            .map_err(query_err)?;

        if changed == 0 {
            return Err(IndexwatchError::NotFound {
                entity: "index",
                id: index.id,
            });
        }
        Ok(())
    }

    fn release_filename(
        &mut self,
        filename: &str,
        keep: Option<i64>,
    ) -> Result<Vec<String>, IndexwatchError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM indices
                 WHERE expected_filename = ?1 AND (?2 IS NULL OR id != ?2)",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![filename, keep], |row| row.get(0))
            .map_err(query_err)?;
        let mut released = Vec::new();
        for row in rows {
            released.push(row.map_err(query_err)?);
        }

        if !released.is_empty() {
            self.conn
                .execute(
                    "UPDATE indices SET expected_filename = NULL
                     WHERE expected_filename = ?1 AND (?2 IS NULL OR id != ?2)",
                    params![filename, keep],
                )
                .map_err(query_err)?;
        }
        Ok(released)
    }

    fn delete_index(&mut self, id: i64) -> Result<bool, IndexwatchError> {
        let changed = self
            .conn
            .execute("DELETE FROM indices WHERE id = ?1", params![id])
            .map_err(query_err)?;
        Ok(changed > 0)
    }

    fn get_or_create_stock(&mut self, ticker: &str) -> Result<Stock, IndexwatchError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO stocks (ticker) VALUES (?1)",
                params![ticker],
            )
            .map_err(query_err)?;
        let id = self
            .conn
            .query_row(
                "SELECT id FROM stocks WHERE ticker = ?1",
                params![ticker],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        Ok(Stock {
            id,
            ticker: ticker.to_string(),
        })
    }

    fn delete_constituents(&mut self, index_id: i64) -> Result<usize, IndexwatchError> {
        self.conn
            .execute(
                "DELETE FROM index_constituents WHERE index_id = ?1",
                params![index_id],
            )
            .map_err(query_err)
    }

    fn insert_constituent(
        &mut self,
        index_id: i64,
        position: usize,
        stock_id: i64,
    ) -> Result<(), IndexwatchError> {
        self.conn
            .execute(
                "INSERT INTO index_constituents (index_id, position, stock_id)
                 VALUES (?1, ?2, ?3)",
                params![index_id, position as i64, stock_id],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn upsert_alert_mapping(
        &mut self,
        alert_ticker: &str,
        index_id: i64,
    ) -> Result<(), IndexwatchError> {
        self.conn
            .execute(
                "INSERT INTO tradingview_map (alert_ticker, index_id) VALUES (?1, ?2)
                 ON CONFLICT(alert_ticker) DO UPDATE SET index_id = excluded.index_id",
                params![alert_ticker, index_id],
            )
            .map_err(query_err)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), IndexwatchError> {
        self.conn.execute_batch("COMMIT").map_err(query_err)?;
        self.finished = true;
        Ok(())
    }
}

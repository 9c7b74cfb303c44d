// src/store.rs
//! SQLite persistence for trend rows.
//!
//! One append-only table, `trend_data`. Every insert is a single autocommitted
//! statement, so a failure mid-pass loses at most the record in flight.
//! Single writer only: the connection sits behind a mutex and concurrent
//! multi-process writers are not supported.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::classify::UNKNOWN_CRYPTO;
use crate::record::TrendRecord;

pub const TABLE: &str = "trend_data";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trend_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT '',
    crypto TEXT NOT NULL DEFAULT 'Unknown',
    score INTEGER NOT NULL DEFAULT 0,
    num_comments INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    sentiment_neg REAL,
    sentiment_neu REAL,
    sentiment_pos REAL,
    sentiment_compound REAL
)
"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_trend_data_crypto_created ON trend_data (crypto, created)";

/// Where assembled records go. The pipeline only needs this.
pub trait RecordSink: Send + Sync {
    /// Persist one record, returning its row id.
    fn insert(&self, record: &TrendRecord) -> Result<i64>;
}

/// A stored row as the read API returns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub id: i64,
    pub title: String,
    pub crypto: String,
    pub score: i64,
    pub num_comments: i64,
    pub created: String,
    pub sentiment_neg: f64,
    pub sentiment_neu: f64,
    pub sentiment_pos: f64,
    pub sentiment_compound: f64,
}

pub struct TrendStore {
    conn: Mutex<Connection>,
}

impl TrendStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite database {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        tracing::info!(db = %path.display(), "trend store ready");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory sqlite")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("trend store mutex poisoned"))
    }

    /// Idempotent create-if-absent. Older databases without a `crypto`
    /// column get one, and NULL cryptos are set to the sentinel.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(CREATE_TABLE)
            .context("creating trend_data table")?;

        let columns = table_columns(&conn, TABLE)?;
        if !columns.iter().any(|c| c == "crypto") {
            tracing::info!("migrating legacy trend_data: adding crypto column");
            conn.execute(
                "ALTER TABLE trend_data ADD COLUMN crypto TEXT NOT NULL DEFAULT 'Unknown'",
                [],
            )
            .context("adding crypto column")?;
        }
        let fixed = conn
            .execute(
                "UPDATE trend_data SET crypto = ?1 WHERE crypto IS NULL OR crypto = ''",
                params![UNKNOWN_CRYPTO],
            )
            .context("backfilling NULL crypto")?;
        if fixed > 0 {
            tracing::info!(rows = fixed, "set legacy NULL crypto to sentinel");
        }

        conn.execute_batch(CREATE_INDEX)
            .context("creating trend_data index")?;
        Ok(())
    }

    pub fn insert(&self, record: &TrendRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO trend_data
                (title, crypto, score, num_comments, created,
                 sentiment_neg, sentiment_neu, sentiment_pos, sentiment_compound)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.title,
                record.crypto,
                record.score,
                record.num_comments,
                record.created_text(),
                record.sentiment.neg,
                record.sentiment.neu,
                record.sentiment.pos,
                record.sentiment.compound,
            ],
        )
        .context("inserting trend row")?;
        Ok(conn.last_insert_rowid())
    }

    /// All rows, optionally filtered by crypto, newest `created` first.
    pub fn list_trends(&self, crypto: Option<&str>) -> Result<Vec<TrendRow>> {
        let conn = self.conn()?;
        let base = "SELECT id, title, crypto, score, num_comments, created, \
                    sentiment_neg, sentiment_neu, sentiment_pos, sentiment_compound \
                    FROM trend_data";
        let rows = match crypto {
            Some(c) => {
                let mut stmt = conn.prepare(&format!(
                    "{base} WHERE crypto = ?1 ORDER BY created DESC, id DESC"
                ))?;
                let out = stmt
                    .query_map(params![c], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out
            }
            None => {
                let mut stmt = conn.prepare(&format!("{base} ORDER BY created DESC, id DESC"))?;
                let out = stmt
                    .query_map([], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out
            }
        };
        Ok(rows)
    }

    pub fn count(&self, crypto: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        let n = match crypto {
            Some(c) => conn.query_row(
                "SELECT COUNT(*) FROM trend_data WHERE crypto = ?1",
                params![c],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM trend_data", [], |r| r.get(0))?,
        };
        Ok(n)
    }

    pub fn get(&self, id: i64) -> Result<Option<TrendRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, title, crypto, score, num_comments, created, \
                 sentiment_neg, sentiment_neu, sentiment_pos, sentiment_compound \
                 FROM trend_data WHERE id = ?1",
                params![id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }
}

impl RecordSink for TrendStore {
    fn insert(&self, record: &TrendRecord) -> Result<i64> {
        TrendStore::insert(self, record)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrendRow> {
    Ok(TrendRow {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        crypto: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| UNKNOWN_CRYPTO.to_string()),
        score: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
        num_comments: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
        created: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        sentiment_neg: row.get::<_, Option<f64>>(6)?.unwrap_or_default(),
        sentiment_neu: row.get::<_, Option<f64>>(7)?.unwrap_or_default(),
        sentiment_pos: row.get::<_, Option<f64>>(8)?.unwrap_or_default(),
        sentiment_compound: row.get::<_, Option<f64>>(9)?.unwrap_or_default(),
    })
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}

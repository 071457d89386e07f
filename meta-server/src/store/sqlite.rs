//! SQLite backend for local deployments.
//!
//! The connection sits behind a `Mutex`; the lock is never held across an
//! `.await`.

use super::{parse_timestamp, AnalysisRecord, NewAnalysis, RecordBackend};
use async_trait::async_trait;
use chrono::Utc;
use meta_common::error::ResultExt;
use meta_common::{Error, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Stores analyses in a local SQLite file.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and initialize the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(db_path).map_err(|e| {
            Error::Storage(format!("Failed to open {}: {}", db_path.display(), e))
        })?;
        Self::with_connection(conn)
    }

    /// In-memory database, mainly for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("schema.sql"))
            .map_err(|e| Error::Storage(format!("Failed to initialize schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Internal(format!("SQLite connection poisoned: {e}")))
    }
}

fn storage_error(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(ref code, _)
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            Error::External(e.to_string())
        }
        other => Error::Storage(other.to_string()),
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let created_at: String = row.get(5)?;
    Ok(AnalysisRecord {
        id: row.get(0)?,
        old_schema: row.get(1)?,
        new_schema: row.get(2)?,
        is_breaking: row.get(3)?,
        ai_summary: row.get(4)?,
        created_at: parse_timestamp(&created_at),
    })
}

#[async_trait]
impl RecordBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, row: &NewAnalysis) -> Result<AnalysisRecord> {
        let conn = self.lock()?;
        let created_at = Utc::now();

        conn.execute(
            r"
            INSERT INTO metadata_analyses (old_schema, new_schema, is_breaking, ai_summary, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                row.old_schema,
                row.new_schema,
                row.is_breaking,
                row.ai_summary,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(storage_error)?;

        Ok(AnalysisRecord {
            id: conn.last_insert_rowid(),
            old_schema: row.old_schema.clone(),
            new_schema: row.new_schema.clone(),
            is_breaking: row.is_breaking,
            ai_summary: row.ai_summary.clone(),
            created_at: Some(created_at),
        })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r"
                SELECT id, old_schema, new_schema, is_breaking, ai_summary, created_at
                FROM metadata_analyses
                ORDER BY id DESC
                LIMIT ?1
                ",
            )
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(params![limit as i64], map_row)
            .map_err(storage_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error)
    }
}

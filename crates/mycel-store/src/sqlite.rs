//! SQLite implementation of the LedgerStore trait.
//!
//! Uses rusqlite with bundled SQLite. The connection sits behind a mutex and
//! every call runs on tokio's blocking pool via `spawn_blocking`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use mycel_core::{
    now_millis, validate_draft, verify_entry_id, EntryDraft, EntryId, EntryType, IdentityId,
    LedgerEntry,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AppendOutcome, LedgerStore, LogEntry};

const ENTRY_COLUMNS: &str = "seq, entry_id, entry_type, payload, parent_id, author, timestamp";

/// SQLite-backed ledger.
///
/// Thread-safe via internal Mutex, which also serializes writers. Each
/// append runs in its own transaction.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Row as read from SQLite, before conversion to domain types.
struct RawEntry {
    seq: i64,
    id: Vec<u8>,
    entry_type: String,
    payload: String,
    parent_id: Option<Vec<u8>>,
    author: String,
    timestamp: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        seq: row.get("seq")?,
        id: row.get("entry_id")?,
        entry_type: row.get("entry_type")?,
        payload: row.get("payload")?,
        parent_id: row.get("parent_id")?,
        author: row.get("author")?,
        timestamp: row.get("timestamp")?,
    })
}

fn blob_to_id(bytes: &[u8], column: &str) -> Result<EntryId> {
    EntryId::try_from(bytes)
        .map_err(|_| StoreError::InvalidData(format!("{column} is {} bytes", bytes.len())))
}

impl RawEntry {
    /// Convert and re-verify the content hash.
    fn into_log_entry(self) -> Result<LogEntry> {
        let entry = LedgerEntry {
            id: blob_to_id(&self.id, "entry_id")?,
            entry_type: EntryType::new(self.entry_type)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            payload: self.payload,
            parent_id: self
                .parent_id
                .as_deref()
                .map(|b| blob_to_id(b, "parent_id"))
                .transpose()?,
            author: IdentityId::new(self.author)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            timestamp: self.timestamp,
        };
        verify_entry_id(&entry)?;
        Ok(LogEntry {
            seq: self.seq as u64,
            entry,
        })
    }
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<LogEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, read_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(RawEntry::into_log_entry).collect()
}

fn query_ids(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<EntryId>> {
    let mut stmt = conn.prepare(sql)?;
    let blobs = stmt
        .query_map(params, |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    blobs.iter().map(|b| blob_to_id(b, "entry_id")).collect()
}

fn seq_of(conn: &Connection, id: &EntryId) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT seq FROM entries WHERE entry_id = ?1",
            params![id.0.as_slice()],
            |row| row.get(0),
        )
        .optional()?)
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn append(&self, draft: EntryDraft) -> Result<AppendOutcome> {
        let id = validate_draft(&draft)?;

        let outcome = self
            .run(move |conn| {
                let tx = conn.transaction()?;

                if seq_of(&tx, &id)?.is_some() {
                    return Ok(AppendOutcome::AlreadyExists(id));
                }

                if let Some(parent) = draft.parent_id {
                    if seq_of(&tx, &parent)?.is_none() {
                        return Err(StoreError::EntryNotFound(parent));
                    }
                }

                tx.execute(
                    "INSERT INTO entries (
                        entry_id, entry_type, payload, parent_id, author, timestamp, ingested_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id.0.as_slice(),
                        draft.entry_type.as_str(),
                        draft.payload,
                        draft.parent_id.as_ref().map(|p| p.0.to_vec()),
                        draft.author.as_str(),
                        draft.timestamp,
                        now_millis(),
                    ],
                )?;
                tx.commit()?;

                Ok(AppendOutcome::Inserted(id))
            })
            .await?;

        if outcome.is_inserted() {
            debug!(entry_id = %id, "appended entry");
        }
        Ok(outcome)
    }

    async fn get(&self, id: &EntryId) -> Result<Option<LedgerEntry>> {
        let id = *id;
        self.run(move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE entry_id = ?1"),
                    params![id.0.as_slice()],
                    read_row,
                )
                .optional()?;
            raw.map(|r| r.into_log_entry().map(|l| l.entry)).transpose()
        })
        .await
    }

    async fn has(&self, id: &EntryId) -> Result<bool> {
        let id = *id;
        self.run(move |conn| Ok(seq_of(conn, &id)?.is_some())).await
    }

    async fn children(&self, id: &EntryId) -> Result<BTreeSet<EntryId>> {
        let id = *id;
        self.run(move |conn| {
            if seq_of(conn, &id)?.is_none() {
                return Err(StoreError::EntryNotFound(id));
            }
            let ids = query_ids(
                conn,
                "SELECT entry_id FROM entries WHERE parent_id = ?1",
                params![id.0.as_slice()],
            )?;
            Ok(ids.into_iter().collect())
        })
        .await
    }

    async fn roots(&self) -> Result<Vec<EntryId>> {
        self.run(|conn| {
            query_ids(
                conn,
                "SELECT entry_id FROM entries WHERE parent_id IS NULL ORDER BY seq",
                [],
            )
        })
        .await
    }

    async fn by_author(&self, author: &IdentityId) -> Result<Vec<LedgerEntry>> {
        let author = author.clone();
        self.run(move |conn| {
            let rows = query_entries(
                conn,
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE author = ?1 ORDER BY seq"),
                params![author.as_str()],
            )?;
            Ok(rows.into_iter().map(|l| l.entry).collect())
        })
        .await
    }

    async fn by_type(&self, entry_type: &EntryType) -> Result<Vec<LedgerEntry>> {
        let entry_type = entry_type.clone();
        self.run(move |conn| {
            let rows = query_entries(
                conn,
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE entry_type = ?1 ORDER BY seq"),
                params![entry_type.as_str()],
            )?;
            Ok(rows.into_iter().map(|l| l.entry).collect())
        })
        .await
    }

    async fn len(&self) -> Result<u64> {
        self.run(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    async fn position(&self, id: &EntryId) -> Result<Option<u64>> {
        let id = *id;
        self.run(move |conn| Ok(seq_of(conn, &id)?.map(|s| s as u64)))
            .await
    }

    async fn log_since(&self, since: Option<&EntryId>, limit: usize) -> Result<Vec<LogEntry>> {
        let since = since.copied();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let after = match since {
                None => 0,
                Some(id) => seq_of(conn, &id)?.ok_or(StoreError::EntryNotFound(id))?,
            };
            query_entries(
                conn,
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries WHERE seq > ?1 ORDER BY seq LIMIT ?2"
                ),
                params![after, limit],
            )
        })
        .await
    }

    async fn all_ids(&self) -> Result<BTreeSet<EntryId>> {
        self.run(|conn| {
            let ids = query_ids(conn, "SELECT entry_id FROM entries", [])?;
            Ok(ids.into_iter().collect())
        })
        .await
    }
}

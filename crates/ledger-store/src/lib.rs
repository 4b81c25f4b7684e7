// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Durable ordered record store with hash-chain sealing (spec §4.3)."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Backed by `rusqlite` (bundled SQLite): WAL mode gives a single-writer
//! lock and crash-consistent commit for free, and an index on `ts` gives
//! the time-bounded `list` query for free — exactly the contract §4.3 and
//! §5 ask for (SPEC_FULL.md §4.3a).

mod pool;

use ledger_core::{link_hash, AppendInput, Record, RecordKind};
use pool::ReadPool;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default size of the read-only connection pool: a small multiple of
/// expected concurrency (spec §5's resource-limits note).
const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Default cap applied to `list` when `limit` is zero or negative.
const DEFAULT_LIST_LIMIT: i64 = 100;

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend failed to read or write.
    #[error("store io error: {0}")]
    Io(#[from] rusqlite::Error),
    /// An append input failed validation before it could be sealed.
    #[error("validation error: {0}")]
    Validation(String),
    /// `get_by_id` found no record with the requested id.
    #[error("no record with id {id}")]
    NotFound {
        /// The id that was requested.
        id: u64,
    },
    /// The on-disk schema could not be initialized.
    #[error("corrupt schema: {0}")]
    CorruptSchema(String),
}

impl StoreError {
    /// The stable taxonomy code for this error (spec §7).
    #[must_use]
    pub fn code(&self) -> ledger_error::ErrorCode {
        match self {
            Self::Io(_) => ledger_error::ErrorCode::IoFailure,
            Self::Validation(_) => ledger_error::ErrorCode::EmptyAppendInput,
            Self::NotFound { .. } => ledger_error::ErrorCode::RecordNotFound,
            Self::CorruptSchema(_) => ledger_error::ErrorCode::CorruptSchema,
        }
    }
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts INTEGER NOT NULL,
            type TEXT NOT NULL,
            source TEXT NOT NULL,
            payload TEXT NOT NULL,
            hash TEXT NOT NULL,
            prev_hash TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_ts ON records(ts);",
    )
    .map_err(|e| StoreError::CorruptSchema(e.to_string()))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    let ts: i64 = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let kind = RecordKind::from_str(&kind_str).unwrap_or(RecordKind::Code);
    Ok(Record {
        id: id as u64,
        timestamp: ts,
        kind,
        source: row.get(3)?,
        payload: row.get(4)?,
        hash: row.get(5)?,
        prev_hash: row.get(6)?,
    })
}

/// A handle to the durable record store (spec §4.3).
///
/// Writes serialize through an exclusive lock on the writer connection
/// (spec §5); reads use a small pool of read-only connections so readers
/// never block on the writer.
pub struct RecordStore {
    path: PathBuf,
    writer: tokio::sync::Mutex<Option<Connection>>,
    read_pool: ReadPool,
}

impl RecordStore {
    /// Open (creating if absent) the record store at `path`, initializing
    /// its schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::CorruptSchema`].
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_read_pool_size(path, DEFAULT_READ_POOL_SIZE).await
    }

    /// Open (creating if absent) the record store at `path`, sizing the
    /// read-only connection pool explicitly (spec §5's resource-limits
    /// note) instead of taking the default of 4.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::CorruptSchema`].
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display(), read_pool_size))]
    pub async fn open_with_read_pool_size(
        path: impl AsRef<Path>,
        read_pool_size: usize,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::CorruptSchema(e.to_string()))?;
        }

        let writer_path = path.clone();
        let writer_conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = Connection::open(&writer_path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await
        .expect("writer open task panicked")?;

        let read_pool_size = if read_pool_size == 0 {
            DEFAULT_READ_POOL_SIZE
        } else {
            read_pool_size
        };
        let read_pool = ReadPool::open(&path, read_pool_size).await?;

        Ok(Self {
            path,
            writer: tokio::sync::Mutex::new(Some(writer_conn)),
            read_pool,
        })
    }

    /// The path this store persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seal a single input into the chain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `payload` is empty, or
    /// [`StoreError::Io`] on a storage failure.
    pub async fn append_one(&self, input: AppendInput) -> Result<Record, StoreError> {
        let mut records = self.append_batch(vec![input]).await?;
        Ok(records.remove(0))
    }

    /// Seal a batch of inputs atomically: all become visible, or none do
    /// (spec §4.3 append algorithm, §8 invariant 6).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if any input is invalid — no
    /// record in the batch becomes visible. Returns [`StoreError::Io`] on
    /// a storage failure.
    #[tracing::instrument(skip(self, inputs), fields(batch_len = inputs.len()))]
    pub async fn append_batch(&self, inputs: Vec<AppendInput>) -> Result<Vec<Record>, StoreError> {
        let mut guard = self.writer.lock().await;
        let conn = guard.take().expect("writer connection missing");

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = append_batch_blocking(&conn, inputs);
            (conn, result)
        })
        .await
        .expect("writer worker panicked");

        *guard = Some(conn);
        result
    }

    /// Fetch the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists.
    pub async fn get_by_id(&self, id: u64) -> Result<Record, StoreError> {
        self.read_pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, ts, type, source, payload, hash, prev_hash FROM records WHERE id = ?1",
                    params![id as i64],
                    row_to_record,
                )
                .optional()?
                .ok_or(StoreError::NotFound { id })
            })
            .await
    }

    /// List records with `timestamp ∈ [since, until]` (zero bound means
    /// unbounded on that side), ascending id order, capped at `limit`
    /// (default 100 if zero or negative).
    pub async fn list(&self, since: i64, until: i64, limit: i64) -> Result<Vec<Record>, StoreError> {
        let cap = if limit <= 0 { DEFAULT_LIST_LIMIT } else { limit };
        self.read_pool
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, ts, type, source, payload, hash, prev_hash FROM records
                     WHERE (?1 = 0 OR ts >= ?1) AND (?2 = 0 OR ts <= ?2)
                     ORDER BY id ASC LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(params![since, until, cap], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// List records with `timestamp ≤ bound`, or every record if `bound`
    /// is `None`, ascending id order.
    ///
    /// This is deliberately a distinct method from [`RecordStore::list`]
    /// rather than another caller of it with a magic `until` value: `list`
    /// treats `until = 0` as "unbounded", which makes `0` unusable as a
    /// real upper bound through that API. Callers needing "everything, or
    /// up to this timestamp" (the verifier and reconstructor) go through
    /// `bound: Option<i64>` instead, so a literal `Some(0)` means exactly
    /// what it says.
    pub async fn list_up_to(&self, bound: Option<i64>) -> Result<Vec<Record>, StoreError> {
        let records = self.list(0, 0, i64::MAX).await?;
        match bound {
            None => Ok(records),
            Some(until) => Ok(records.into_iter().filter(|r| r.timestamp <= until).collect()),
        }
    }

    /// The current chain tip hash, or the empty string if the store is
    /// empty.
    pub async fn last_hash(&self) -> Result<String, StoreError> {
        self.read_pool
            .with_conn(|conn| {
                let hash: Option<String> = conn
                    .query_row(
                        "SELECT hash FROM records ORDER BY id DESC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(hash.unwrap_or_default())
            })
            .await
    }

    /// Close the store, releasing its connections. Connections are
    /// dropped cleanly regardless; this just makes the intent explicit.
    pub async fn close(self) {
        drop(self.writer);
        drop(self.read_pool);
    }
}

fn append_batch_blocking(
    conn: &Connection,
    inputs: Vec<AppendInput>,
) -> Result<Vec<Record>, StoreError> {
    for input in &inputs {
        if input.payload.is_empty() {
            return Err(StoreError::Validation(
                "append input payload must not be empty".to_string(),
            ));
        }
    }

    let tx = conn.unchecked_transaction()?;

    let mut tip: String = tx
        .query_row(
            "SELECT hash FROM records ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or_default();

    let mut sealed = Vec::with_capacity(inputs.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO records (ts, type, source, payload, hash, prev_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for input in inputs {
            let timestamp = if input.timestamp == 0 {
                now_seconds()
            } else {
                input.timestamp
            };
            let hash = link_hash(&tip, timestamp, input.kind, &input.source, &input.payload);
            stmt.execute(params![
                timestamp,
                input.kind.as_str(),
                input.source,
                input.payload,
                hash,
                tip,
            ])?;
            let id = tx.last_insert_rowid() as u64;
            sealed.push(Record {
                id,
                timestamp,
                kind: input.kind,
                source: input.source,
                payload: input.payload,
                prev_hash: tip.clone(),
                hash: hash.clone(),
            });
            tip = hash;
        }
    }

    tx.commit()?;
    Ok(sealed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::RecordKind;
    use proptest::prelude::*;

    fn input(ts: i64, kind: RecordKind, source: &str, payload: &str) -> AppendInput {
        AppendInput {
            timestamp: ts,
            kind,
            source: source.to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn genesis_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let r = store
            .append_one(input(1000, RecordKind::Code, "t", "{\"repo\":\"a\",\"commit\":\"abc1234\"}"))
            .await
            .unwrap();
        assert_eq!(r.id, 1);
        assert_eq!(r.prev_hash, "");
    }

    #[tokio::test]
    async fn ids_are_dense_and_contiguous_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        store
            .append_batch(vec![
                input(1000, RecordKind::Code, "t", "{\"repo\":\"a\",\"commit\":\"abc1234\"}"),
                input(1001, RecordKind::Environment, "t", "{\"os\":\"linux\",\"runtime\":\"x\",\"arch\":\"amd64\",\"time_source\":\"system\"}"),
            ])
            .await
            .unwrap();
        let r1 = store.get_by_id(1).await.unwrap();
        let r2 = store.get_by_id(2).await.unwrap();
        assert_eq!(r2.prev_hash, r1.hash);
    }

    #[tokio::test]
    async fn batch_rollback_leaves_tip_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        store
            .append_one(input(1000, RecordKind::Code, "t", "{\"repo\":\"a\",\"commit\":\"abc1234\"}"))
            .await
            .unwrap();
        let tip_before = store.last_hash().await.unwrap();

        let result = store
            .append_batch(vec![
                input(1001, RecordKind::Environment, "t", "{}"),
                input(1002, RecordKind::Mutation, "t", ""),
            ])
            .await;
        assert!(result.is_err());

        assert_eq!(store.last_hash().await.unwrap(), tip_before);
        assert!(store.list(0, 0, 0).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn open_with_read_pool_size_zero_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open_with_read_pool_size(dir.path().join("ledger.db"), 0)
            .await
            .unwrap();
        store
            .append_one(input(1000, RecordKind::Code, "t", "{\"repo\":\"a\",\"commit\":\"abc1234\"}"))
            .await
            .unwrap();
        assert_eq!(store.list(0, 0, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_up_to_distinguishes_none_from_a_literal_zero_bound() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        store
            .append_one(input(1000, RecordKind::Code, "t", "{\"repo\":\"a\",\"commit\":\"abc1234\"}"))
            .await
            .unwrap();

        assert_eq!(store.list_up_to(None).await.unwrap().len(), 1);
        assert_eq!(store.list_up_to(Some(0)).await.unwrap().len(), 0);
        assert_eq!(store.list_up_to(Some(1000)).await.unwrap().len(), 1);
        assert_eq!(store.list_up_to(Some(999)).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn get_by_id_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let err = store.get_by_id(99).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 99 }));
    }

    #[tokio::test]
    async fn list_respects_time_bounds_and_default_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        for ts in [1000, 2000, 3000] {
            store
                .append_one(input(ts, RecordKind::Mutation, "t", "{\"type\":\"x\",\"id\":\"1\",\"source\":\"s\"}"))
                .await
                .unwrap();
        }
        let all = store.list(0, 0, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        let bounded = store.list(1500, 2500, 0).await.unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].timestamp, 2000);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        /// Chain soundness (§8 invariant 1), link computability (invariant 2),
        /// and dense monotone ids (invariant 8) hold after appending any
        /// sequence of valid batches, whatever their internal batch sizes.
        #[test]
        fn chain_invariants_hold_after_arbitrary_batches(
            batches in proptest::collection::vec(
                proptest::collection::vec(1000i64..2_000_000_000i64, 1..5),
                1..8,
            )
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();

                let mut expected_id = 1u64;
                for timestamps in &batches {
                    let inputs: Vec<AppendInput> = timestamps
                        .iter()
                        .map(|ts| input(*ts, RecordKind::Mutation, "t", "{\"type\":\"x\",\"id\":\"1\",\"source\":\"s\"}"))
                        .collect();
                    let sealed = store.append_batch(inputs).await.unwrap();
                    for record in &sealed {
                        prop_assert_eq!(record.id, expected_id);
                        expected_id += 1;
                    }
                }

                let all = store.list(0, 0, i64::MAX).await.unwrap();
                prop_assert_eq!(all.len() as u64, expected_id - 1);

                let mut expected_prev = String::new();
                for record in &all {
                    prop_assert_eq!(&record.prev_hash, &expected_prev);
                    let recomputed = link_hash(
                        &expected_prev,
                        record.timestamp,
                        record.kind,
                        &record.source,
                        &record.payload,
                    );
                    prop_assert_eq!(&recomputed, &record.hash);
                    expected_prev = record.hash.clone();
                }
                Ok(())
            })?;
        }
    }
}

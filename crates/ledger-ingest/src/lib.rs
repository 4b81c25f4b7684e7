// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Thin layer orchestrating payload validation and append (spec §4.7)."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Dispatches raw bytes to the right typed schema, validates, and hands
//! the canonical re-serialization to the Record Store. This crate does
//! not deduplicate by content — a caller wanting idempotent re-ingestion
//! must supply a stable `timestamp`, since the chain hash still advances
//! for byte-identical payloads appended onto different `prev_hash` tips.

use ledger_core::payload::MalformedPayload;
use ledger_core::{AppendInput, CodePayload, ConfigPayload, EnvironmentPayload, MutationPayload, PayloadSchema, Record, RecordKind};
use ledger_store::{RecordStore, StoreError};

/// Errors from ingesting a raw payload, preserving the category the
/// underlying failure belongs to (spec §7): `malformed`, `invalid`, or
/// `io`.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The raw bytes are not valid JSON for the requested kind, or
    /// contain an unknown field.
    #[error("malformed payload: {0}")]
    Malformed(#[from] MalformedPayload),
    /// The parsed payload is missing one or more required fields.
    #[error("invalid payload: {0}")]
    Invalid(String),
    /// The record store failed to read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// The stable taxonomy code for this error (spec §7).
    #[must_use]
    pub fn code(&self) -> ledger_error::ErrorCode {
        match self {
            Self::Malformed(_) => ledger_error::ErrorCode::MalformedJson,
            Self::Invalid(_) => ledger_error::ErrorCode::BlankRequiredField,
            Self::Store(e) => e.code(),
        }
    }
}

fn canonicalize<P: PayloadSchema>(raw: &[u8]) -> Result<String, IngestError> {
    let payload = P::parse(raw)?;
    let missing = payload.validate();
    if !missing.is_empty() {
        return Err(IngestError::Invalid(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }
    payload
        .serialize()
        .map_err(|e| IngestError::Invalid(e.to_string()))
}

fn canonical_payload_for(kind: RecordKind, raw: &[u8]) -> Result<String, IngestError> {
    match kind {
        RecordKind::Code => canonicalize::<CodePayload>(raw),
        RecordKind::Config => canonicalize::<ConfigPayload>(raw),
        RecordKind::Environment => canonicalize::<EnvironmentPayload>(raw),
        RecordKind::Mutation => canonicalize::<MutationPayload>(raw),
    }
}

/// Parse, validate, canonically re-serialize, and append a single raw
/// payload. `timestamp` of zero asks the store to assign the wall clock
/// at commit.
///
/// # Errors
///
/// Returns [`IngestError::Malformed`] or [`IngestError::Invalid`] before
/// ever touching the store, or [`IngestError::Store`] on a storage
/// failure.
#[tracing::instrument(skip(store, raw_payload_bytes), fields(kind = %kind))]
pub async fn ingest(
    store: &RecordStore,
    kind: RecordKind,
    raw_payload_bytes: &[u8],
    source: impl Into<String>,
    timestamp: i64,
) -> Result<Record, IngestError> {
    let payload = canonical_payload_for(kind, raw_payload_bytes)?;
    let input = AppendInput {
        timestamp,
        kind,
        source: source.into(),
        payload,
    };
    Ok(store.append_one(input).await?)
}

/// One raw entry to be ingested as part of a batch.
pub struct IngestEntry {
    /// Record kind.
    pub kind: RecordKind,
    /// Raw, possibly non-canonical payload bytes.
    pub raw_payload_bytes: Vec<u8>,
    /// Origin tag.
    pub source: String,
    /// Seconds since epoch; zero means "assign wall clock at commit".
    pub timestamp: i64,
}

/// Validate and canonicalize every entry before appending any of them;
/// the store's batch append then commits all or none (spec §4.7,
/// §8 invariant 6).
///
/// # Errors
///
/// Returns [`IngestError::Malformed`] or [`IngestError::Invalid`] for the
/// first entry that fails, without appending anything. Returns
/// [`IngestError::Store`] on a storage failure.
pub async fn ingest_batch(
    store: &RecordStore,
    entries: Vec<IngestEntry>,
) -> Result<Vec<Record>, IngestError> {
    let mut inputs = Vec::with_capacity(entries.len());
    for entry in entries {
        let payload = canonical_payload_for(entry.kind, &entry.raw_payload_bytes)?;
        inputs.push(AppendInput {
            timestamp: entry.timestamp,
            kind: entry.kind,
            source: entry.source,
            payload,
        });
    }
    Ok(store.append_batch(inputs).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ingest_rejects_unknown_fields_before_touching_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let err = ingest(
            &store,
            RecordKind::Code,
            br#"{"repo":"a","commit":"abc1234","bogus":true}"#,
            "t",
            1000,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
        assert_eq!(store.list(0, 0, 0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn ingest_rejects_missing_required_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let err = ingest(
            &store,
            RecordKind::Code,
            br#"{"repo":"","commit":"abc1234"}"#,
            "t",
            1000,
        )
        .await
        .unwrap_err();
        match err {
            IngestError::Invalid(msg) => assert!(msg.contains("repo")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ingest_canonicalizes_before_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let record = ingest(
            &store,
            RecordKind::Code,
            br#"{"commit": "abc1234", "repo": "a"}"#,
            "t",
            1000,
        )
        .await
        .unwrap();
        assert_eq!(record.payload, r#"{"artifacts":[],"commit":"abc1234","lockfiles":[],"repo":"a"}"#);
    }

    #[tokio::test]
    async fn ingest_batch_commits_all_or_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let entries = vec![
            IngestEntry {
                kind: RecordKind::Code,
                raw_payload_bytes: br#"{"repo":"a","commit":"abc1234"}"#.to_vec(),
                source: "t".to_string(),
                timestamp: 1000,
            },
            IngestEntry {
                kind: RecordKind::Code,
                raw_payload_bytes: br#"{"repo":"","commit":"abc1234"}"#.to_vec(),
                source: "t".to_string(),
                timestamp: 1001,
            },
        ];
        let err = ingest_batch(&store, entries).await.unwrap_err();
        assert!(matches!(err, IngestError::Invalid(_)));
        assert_eq!(store.list(0, 0, 0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn ingest_zero_timestamp_is_assigned_by_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let record = ingest(
            &store,
            RecordKind::Code,
            br#"{"repo":"a","commit":"abc1234"}"#,
            "t",
            0,
        )
        .await
        .unwrap();
        assert!(record.timestamp > 0);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Chain verifier: walks the log recomputing each link (spec §4.4)."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Verification never mutates, never panics, and never masquerades an I/O
//! failure as a chain failure — those are kept on separate `Result`
//! channels (spec §4.4's failure semantics, §9's "parse error is not
//! chain error" note).

use ledger_core::link_hash;
use ledger_store::{RecordStore, StoreError};
use serde::{Deserialize, Serialize};

/// The shape both `verify_all` and `verify_up_to` return (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct VerifyProof {
    /// `true` if every checked record's chain link is intact.
    pub ok: bool,
    /// How many records were checked before the walk stopped.
    pub checked: u64,
    /// The id of the first record that failed, if any.
    pub failed_id: Option<u64>,
    /// `"prev_hash mismatch"` or `"hash mismatch"`, if `ok` is `false`.
    pub reason: Option<String>,
}

impl VerifyProof {
    fn ok(checked: u64) -> Self {
        Self {
            ok: true,
            checked,
            failed_id: None,
            reason: None,
        }
    }

    fn failed(checked: u64, failed_id: u64, reason: &str) -> Self {
        Self {
            ok: false,
            checked,
            failed_id: Some(failed_id),
            reason: Some(reason.to_string()),
        }
    }
}

/// Walk the entire chain, recomputing every link.
///
/// # Errors
///
/// Returns [`StoreError`] on an I/O failure; an I/O error is reported as
/// such and never masquerades as a chain failure.
#[tracing::instrument(skip(store))]
pub async fn verify_all(store: &RecordStore) -> Result<VerifyProof, StoreError> {
    verify_up_to(store, i64::MAX).await
}

/// Walk the chain prefix with `timestamp ≤ target_time`, recomputing
/// every link. The proof is still rooted at genesis — it is an error for
/// a caller to skip records, so this always starts from id 1.
///
/// # Errors
///
/// Returns [`StoreError`] on an I/O failure.
#[tracing::instrument(skip(store), fields(target_time))]
pub async fn verify_up_to(store: &RecordStore, target_time: i64) -> Result<VerifyProof, StoreError> {
    let bound = if target_time == i64::MAX { None } else { Some(target_time) };
    let records = store.list_up_to(bound).await.inspect_err(|e| {
        tracing::error!(error = %e, "verify_up_to failed to read the store");
    })?;

    let mut expected_prev = String::new();
    let mut checked = 0u64;
    for record in &records {
        if record.prev_hash != expected_prev {
            tracing::warn!(record_id = record.id, checked, "prev_hash mismatch");
            return Ok(VerifyProof::failed(checked, record.id, "prev_hash mismatch"));
        }
        let link = link_hash(
            &expected_prev,
            record.timestamp,
            record.kind,
            &record.source,
            &record.payload,
        );
        if link != record.hash {
            tracing::warn!(record_id = record.id, checked, "hash mismatch");
            return Ok(VerifyProof::failed(checked, record.id, "hash mismatch"));
        }
        expected_prev = record.hash.clone();
        checked += 1;
    }

    Ok(VerifyProof::ok(checked))
}

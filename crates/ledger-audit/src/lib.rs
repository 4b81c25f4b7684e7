// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Exports a self-contained, offline-verifiable audit bundle (spec §4.6)."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! A [`Bundle`] bundles a reconstruction report with its chain proof and
//! a short list of reviewer-facing notes, so a third party can judge the
//! snapshot's trustworthiness without re-running any of the ledger's own
//! tooling.

use ledger_reconstruct::ReconstructionReport;
use ledger_store::{RecordStore, StoreError};
use ledger_verify::VerifyProof;
use serde::{Deserialize, Serialize};

/// Errors from building or exporting an audit bundle.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// `target_time` must be a positive timestamp.
    #[error("target_time must be > 0")]
    InvalidTargetTime,
    /// The reconstructor or store failed to read.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The bundle failed to serialize.
    #[error("bundle serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A self-contained snapshot-plus-proof artifact for offline review
/// (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Bundle {
    /// Wall-clock time the bundle was produced.
    pub generated_at: i64,
    /// The target time the bundle reconstructs.
    pub target_time: i64,
    /// The full reconstruction report, serialized under the wire key
    /// `snapshot` (spec §6.2).
    #[serde(rename = "snapshot")]
    pub report: ReconstructionReport,
    /// The chain proof up to `target_time`, duplicated at the top level
    /// for reviewers who only check the proof.
    pub proof: Option<VerifyProof>,
    /// Reviewer-facing caveats, e.g. `"no proof available"`.
    pub notes: Vec<String>,
}

/// Build and export an audit bundle for `target_time`.
///
/// # Errors
///
/// Returns [`AuditError::InvalidTargetTime`] if `target_time <= 0`, or
/// propagates a [`StoreError`] from the underlying reconstruction.
pub async fn export(store: &RecordStore, target_time: i64) -> Result<Bundle, AuditError> {
    if target_time <= 0 {
        return Err(AuditError::InvalidTargetTime);
    }

    let report = ledger_reconstruct::reconstruct(store, target_time).await?;
    let mut notes = Vec::new();
    if report.proof.is_none() {
        notes.push("no proof available".to_string());
    }
    if !report.success {
        notes.push("snapshot reconstruction failed".to_string());
    }
    if !report.coverage.complete {
        notes.push("snapshot missing required dimensions".to_string());
    }

    Ok(Bundle {
        generated_at: now_seconds(),
        target_time,
        proof: report.proof.clone(),
        report,
        notes,
    })
}

/// Render a bundle as pretty-printed, 2-space-indented JSON for a human
/// reviewer. This is a presentation form only — the chain hashes inside
/// `report` remain the single-line canonical bytes they were sealed
/// with; this function never re-derives or re-hashes anything.
///
/// # Errors
///
/// Returns [`AuditError::Serialize`] if the bundle cannot be serialized.
pub fn to_pretty_json(bundle: &Bundle) -> Result<String, AuditError> {
    Ok(serde_json::to_string_pretty(bundle)?)
}

fn now_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{AppendInput, RecordKind};

    fn input(ts: i64, kind: RecordKind, payload: &str) -> AppendInput {
        AppendInput {
            timestamp: ts,
            kind,
            source: "t".to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_non_positive_target_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        let err = export(&store, 0).await.unwrap_err();
        assert!(matches!(err, AuditError::InvalidTargetTime));
    }

    #[tokio::test]
    async fn missing_dimensions_produce_a_note() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        store
            .append_one(input(1000, RecordKind::Code, r#"{"repo":"a","commit":"abc1234"}"#))
            .await
            .unwrap();
        let bundle = export(&store, 2000).await.unwrap();
        assert!(bundle.notes.contains(&"snapshot missing required dimensions".to_string()));
    }

    #[tokio::test]
    async fn full_coverage_bundle_has_no_notes() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        store
            .append_one(input(1000, RecordKind::Code, r#"{"repo":"a","commit":"abc1234"}"#))
            .await
            .unwrap();
        store
            .append_one(input(1001, RecordKind::Config, r#"{"source":"s","version":"1","hash":"sha256:x","snapshot":"k=v"}"#))
            .await
            .unwrap();
        store
            .append_one(input(1002, RecordKind::Environment, r#"{"os":"linux","runtime":"x","arch":"amd64","time_source":"system"}"#))
            .await
            .unwrap();
        store
            .append_one(input(1003, RecordKind::Mutation, r#"{"type":"insert","id":"1","source":"s","external_ref":"kafka:1"}"#))
            .await
            .unwrap();
        let bundle = export(&store, 2000).await.unwrap();
        assert!(bundle.notes.is_empty());
        assert!(bundle.proof.unwrap().ok);
    }

    #[tokio::test]
    async fn pretty_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("ledger.db")).await.unwrap();
        store
            .append_one(input(1000, RecordKind::Code, r#"{"repo":"a","commit":"abc1234"}"#))
            .await
            .unwrap();
        let bundle = export(&store, 2000).await.unwrap();
        let json = to_pretty_json(&bundle).unwrap();
        assert!(json.contains("\n  "));
        let parsed: Bundle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.target_time, bundle.target_time);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Reconstruction Report shape (spec §4.5) and its constituents.

use ledger_core::{CodePayload, ConfigPayload, EnvironmentPayload, MutationPayload};
use ledger_verify::VerifyProof;
use serde::{Deserialize, Serialize};

/// Which of the four state dimensions were resolved (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Coverage {
    /// A code record was resolved at or before the target time.
    pub has_code: bool,
    /// A config record was resolved at or before the target time.
    pub has_config: bool,
    /// An environment record was resolved at or before the target time.
    pub has_environment: bool,
    /// At least one mutation record was resolved at or before the target time.
    pub has_mutations: bool,
    /// `true` iff all four dimensions above are present.
    pub complete: bool,
}

/// A single namespace bucket of the replay plan (spec §4.5.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ReplayBucket {
    /// The namespace (prefix of `external_ref` before the last colon, or
    /// `"default"`).
    pub namespace: String,
    /// `true` if every record in this bucket parsed a `<namespace>:<offset>`
    /// form and was sorted by offset; `false` if the fallback
    /// timestamp-then-id sort was used instead.
    pub ordered: bool,
    /// Record ids in this bucket's final replay order.
    pub record_ids: Vec<u64>,
}

/// An ordering of mutation records grouped by namespace; describes what
/// to replay, not how (spec §4.5.3). `None` when no mutations are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ReplayPlan {
    /// Total count of mutations covered by this plan.
    pub total: u64,
    /// Buckets in first-appearance order.
    pub buckets: Vec<ReplayBucket>,
}

/// The derived, non-persistent view of "latest code/config/environment +
/// all mutations" at a target time T (spec §3.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Snapshot {
    /// The latest code record's payload at or before T, if any.
    pub code: Option<CodePayload>,
    /// The latest config record's payload at or before T, if any.
    pub config: Option<ConfigPayload>,
    /// The latest environment record's payload at or before T, if any.
    pub environment: Option<EnvironmentPayload>,
    /// All mutation records at or before T, ordered per the replay plan.
    pub mutations: Vec<MutationPayload>,
    /// `H(join('|', records[i].hash for i in order))` over all records at
    /// or before T in ascending id order (spec §4.5.5).
    pub snapshot_hash: String,
}

/// The full structured output for a time-T query (spec §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ReconstructionReport {
    /// Wall-clock time the reconstruction was requested.
    pub request_time: i64,
    /// The target time T the caller asked to reconstruct.
    pub target_time: i64,
    /// `true` if at least one record at or before T was resolved.
    pub success: bool,
    /// Total records (of any kind) considered at or before T.
    pub records_matched: u64,
    /// Which state dimensions were resolved.
    pub coverage: Coverage,
    /// A 0–100 heuristic, reported with one decimal (spec §4.5.4).
    pub determinism_score: f64,
    /// Non-fatal parse errors and provenance anomalies (spec §4.5.2).
    pub issues: Vec<String>,
    /// The chain verifier's proof up to T, or absent on a verifier I/O error.
    pub proof: Option<VerifyProof>,
    /// The mutation replay plan, or absent if no mutations were present.
    pub replay_plan: Option<ReplayPlan>,
    /// The resolved snapshot.
    pub state: Snapshot,
}

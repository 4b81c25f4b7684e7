// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Reconstructs a typed snapshot and reconstruction report at a target time (spec §4.5)."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! The Reconstructor never writes to the store; it is a pure read-side
//! view assembled from whatever the Record Store and Chain Verifier
//! report back. A parse failure or provenance anomaly is recorded as an
//! `issue`, never surfaced as a hard error — only a genuine I/O failure
//! propagates as `Err`.

mod replay;
mod report;

pub use report::{Coverage, ReconstructionReport, ReplayBucket, ReplayPlan, Snapshot};

use ledger_core::{
    sha256_hex, external_ref_namespace, CodePayload, ConfigPayload, EnvironmentPayload,
    MutationPayload, PayloadSchema, Record, RecordKind,
};
use ledger_store::{RecordStore, StoreError};
use replay::TaggedMutation;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn parse_latest<P: PayloadSchema>(
    record: Option<&Record>,
    kind_name: &str,
    issues: &mut Vec<String>,
) -> Option<P> {
    let record = record?;
    match P::parse(record.payload.as_bytes()) {
        Ok(payload) => Some(payload),
        Err(e) => {
            issues.push(format!("{kind_name} parse error: {e}"));
            None
        }
    }
}

/// Assemble the Reconstruction Report for the state of the ledger at or
/// before `target_time` (spec §4.5.1–§4.5.6).
///
/// # Errors
///
/// Returns [`StoreError`] only on a genuine failure to read from the
/// store; parse failures and provenance anomalies are folded into the
/// report's `issues` instead.
#[tracing::instrument(skip(store), fields(target_time))]
pub async fn reconstruct(
    store: &RecordStore,
    target_time: i64,
) -> Result<ReconstructionReport, StoreError> {
    let request_time = now_seconds();
    let bound = if target_time == i64::MAX { None } else { Some(target_time) };
    let records = store.list_up_to(bound).await.inspect_err(|e| {
        tracing::error!(error = %e, "reconstruct failed to read the store");
    })?;

    let mut issues = Vec::new();

    let mut latest_code: Option<&Record> = None;
    let mut latest_config: Option<&Record> = None;
    let mut latest_environment: Option<&Record> = None;
    let mut mutation_records: Vec<&Record> = Vec::new();
    for record in &records {
        match record.kind {
            RecordKind::Code => latest_code = Some(record),
            RecordKind::Config => latest_config = Some(record),
            RecordKind::Environment => latest_environment = Some(record),
            RecordKind::Mutation => mutation_records.push(record),
        }
    }

    let code = parse_latest::<CodePayload>(latest_code, "code", &mut issues);
    let config = parse_latest::<ConfigPayload>(latest_config, "config", &mut issues);
    let environment = parse_latest::<EnvironmentPayload>(latest_environment, "environment", &mut issues);

    let mut tagged_mutations = Vec::with_capacity(mutation_records.len());
    for record in &mutation_records {
        match MutationPayload::parse(record.payload.as_bytes()) {
            Ok(payload) => tagged_mutations.push(TaggedMutation {
                id: record.id,
                timestamp: record.timestamp,
                payload,
            }),
            Err(e) => issues.push(format!("mutation parse error: {e}")),
        }
    }

    let coverage = report::Coverage {
        has_code: code.is_some(),
        has_config: config.is_some(),
        has_environment: environment.is_some(),
        has_mutations: !tagged_mutations.is_empty(),
        complete: code.is_some() && config.is_some() && environment.is_some() && !tagged_mutations.is_empty(),
    };

    let proof = match ledger_verify::verify_up_to(store, target_time).await {
        Ok(p) => {
            if !p.ok {
                tracing::warn!(failed_id = ?p.failed_id, reason = ?p.reason, "reconstruct found a broken chain");
            }
            Some(p)
        }
        Err(e) => {
            tracing::error!(error = %e, "reconstruct could not obtain a chain proof");
            issues.push(format!("proof: {e}"));
            None
        }
    };

    provenance_checks(&code, &config, &environment, &tagged_mutations, &mut issues);
    if !issues.is_empty() {
        tracing::warn!(issue_count = issues.len(), "reconstruct recorded provenance issues");
    }

    let determinism_score = score(&coverage, environment.as_ref(), &tagged_mutations);

    let replay_plan = replay::build_replay_plan(&tagged_mutations);
    let mutations = ordered_mutation_payloads(&tagged_mutations, replay_plan.as_ref());

    let joined: String = records
        .iter()
        .map(|r| r.hash.as_str())
        .collect::<Vec<_>>()
        .join("|");
    let snapshot_hash = sha256_hex(joined.as_bytes());

    let records_matched = records.len() as u64;

    Ok(ReconstructionReport {
        request_time,
        target_time,
        success: records_matched > 0,
        records_matched,
        coverage,
        determinism_score,
        issues,
        proof,
        replay_plan,
        state: Snapshot {
            code,
            config,
            environment,
            mutations,
            snapshot_hash,
        },
    })
}

fn ordered_mutation_payloads(
    tagged: &[TaggedMutation],
    plan: Option<&ReplayPlan>,
) -> Vec<MutationPayload> {
    let Some(plan) = plan else {
        return Vec::new();
    };
    let by_id: std::collections::HashMap<u64, &MutationPayload> =
        tagged.iter().map(|m| (m.id, &m.payload)).collect();
    plan.buckets
        .iter()
        .flat_map(|bucket| bucket.record_ids.iter())
        .filter_map(|id| by_id.get(id).map(|p| (*p).clone()))
        .collect()
}

fn provenance_checks(
    code: &Option<CodePayload>,
    config: &Option<ConfigPayload>,
    environment: &Option<EnvironmentPayload>,
    mutations: &[TaggedMutation],
    issues: &mut Vec<String>,
) {
    if let Some(code) = code {
        if code.commit.len() < 7 {
            issues.push("provenance: code commit hash too short".to_string());
        }
    }

    if let Some(config) = config {
        if config.snapshot.is_empty() {
            issues.push("provenance: config snapshot empty".to_string());
        }
        let computed = sha256_hex(config.snapshot.as_bytes());
        let stored = config.hash.strip_prefix("sha256:").unwrap_or(&config.hash);
        if !config.hash.is_empty() && stored != computed {
            issues.push("provenance: config hash mismatch".to_string());
        }
    }

    if let Some(environment) = environment {
        if environment.os.trim().is_empty() || environment.runtime.trim().is_empty() {
            issues.push("provenance: environment fields missing".to_string());
        }
    }

    let mut seen_ids = HashSet::new();
    let mut seen_refs = HashSet::new();
    let mut namespaces = HashSet::new();
    let mut duplicate_id_emitted = false;
    let mut duplicate_ref_emitted = false;
    let mut missing_ref_emitted = false;
    for m in mutations {
        if !duplicate_id_emitted && !seen_ids.insert(m.payload.id.clone()) {
            issues.push("provenance: duplicate mutation id".to_string());
            duplicate_id_emitted = true;
        }
        match m.payload.external_ref.as_deref() {
            Some(r) if !r.is_empty() => {
                if !duplicate_ref_emitted && !seen_refs.insert(r.to_string()) {
                    issues.push("provenance: duplicate external_ref".to_string());
                    duplicate_ref_emitted = true;
                }
                namespaces.insert(external_ref_namespace(r));
            }
            _ => {
                if !missing_ref_emitted {
                    issues.push("provenance: missing external_ref".to_string());
                    missing_ref_emitted = true;
                }
                // A mutation without an external_ref has no namespace to
                // observe — it already raised "missing external_ref" above
                // and must not also count toward the mixed-namespace check
                // below, which only cares about genuinely distinct real
                // namespaces.
            }
        }
    }
    if namespaces.len() > 1 {
        issues.push("provenance: mixed external_ref namespaces detected".to_string());
    }
}

fn score(
    coverage: &Coverage,
    environment: Option<&EnvironmentPayload>,
    mutations: &[TaggedMutation],
) -> f64 {
    let mut total = 0.0;
    if coverage.has_code {
        total += 25.0;
    }
    if coverage.has_config {
        total += 25.0;
    }
    if coverage.has_environment {
        total += 25.0;
    }
    if coverage.has_mutations {
        total += 25.0;
    }
    if let Some(env) = environment {
        if env.time_source != "system" {
            total -= 5.0;
        }
    }
    if mutations
        .iter()
        .any(|m| m.payload.external_ref.as_deref().unwrap_or("").is_empty())
    {
        total -= 2.0;
    }
    let clamped = total.clamp(0.0, 100.0);
    (clamped * 10.0).round() / 10.0
}

/// Render a human-readable explanation of a report (spec §4.5.6): missing
/// coverage dimensions, then every issue, then the score and its verdict.
#[must_use]
pub fn explain_failure(report: &ReconstructionReport) -> String {
    let mut lines = Vec::new();

    if !report.coverage.has_code {
        lines.push("missing code: no code record resolved at or before the target time".to_string());
    }
    if !report.coverage.has_config {
        lines.push("missing config: no config record resolved at or before the target time".to_string());
    }
    if !report.coverage.has_environment {
        lines.push("missing environment: no environment record resolved at or before the target time".to_string());
    }
    if !report.coverage.has_mutations {
        lines.push("missing mutations: no mutation records resolved at or before the target time".to_string());
    }

    lines.extend(report.issues.iter().cloned());

    let verdict = if report.determinism_score < 50.0 {
        "forensics only"
    } else if report.determinism_score < 100.0 {
        "partial"
    } else {
        "full"
    };
    lines.push(format!(
        "determinism score: {:.1} ({verdict})",
        report.determinism_score
    ));

    lines.join("\n")
}

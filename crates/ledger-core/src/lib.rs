// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Record data model, canonical serialization, and payload schemas."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! This crate is the one place that turns an arbitrary `Serialize` value
//! into the byte-exact canonical form every chain hash is computed over,
//! and defines the [`Record`] type that the rest of the ledger operates on.

pub mod payload;

pub use payload::{
    CodePayload, ConfigPayload, EnvironmentPayload, MutationPayload, PayloadSchema,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors from canonical serialization.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The four record kinds the ledger accepts, stored as lowercase strings
/// (spec §3.1, §6.2 `type` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Source code identity.
    Code,
    /// Configuration snapshot.
    Config,
    /// Runtime environment descriptor.
    Environment,
    /// External data mutation.
    Mutation,
}

impl RecordKind {
    /// The exact lowercase string stored in the record store's `type` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Config => "config",
            Self::Environment => "environment",
            Self::Mutation => "mutation",
        }
    }

    /// Parse a stored `type` string back into a [`RecordKind`].
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "config" => Some(Self::Config),
            "environment" => Some(Self::Environment),
            "mutation" => Some(Self::Mutation),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single sealed entry in the ledger (spec §3.1).
///
/// Constructed only by the Record Store at commit time; every field is
/// read-only thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Record {
    /// Monotonically increasing sequence number, dense from 1.
    pub id: u64,
    /// Integer seconds since epoch.
    pub timestamp: i64,
    /// One of `{code, config, environment, mutation}`.
    pub kind: RecordKind,
    /// Free-form origin tag (e.g. `"manifest-run"`, `"ci-pipeline"`).
    pub source: String,
    /// Canonical byte-exact serialization of the typed payload (§3.2).
    /// Stored verbatim; never re-serialized on read.
    pub payload: String,
    /// The `hash` of the record with the immediately preceding `id`, or
    /// the empty string if this is the first record.
    pub prev_hash: String,
    /// `H(prev_hash, timestamp, kind, source, payload)` (§6.2).
    pub hash: String,
}

/// The unsealed shape an append call accepts, before a `prev_hash`/`hash`
/// pair is computed by the Record Store.
#[derive(Debug, Clone)]
pub struct AppendInput {
    /// Seconds since epoch; zero means "assign wall clock at commit".
    pub timestamp: i64,
    /// Record kind.
    pub kind: RecordKind,
    /// Origin tag.
    pub source: String,
    /// Canonical payload bytes.
    pub payload: String,
}

/// Hex-encode the SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Serialize `value` to its canonical JSON form: sorted keys (via
/// `serde_json`'s default `BTreeMap`-backed object representation), no
/// insignificant whitespace, no lossy numeric coercion.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if `value` cannot be serialized.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

/// Compute the link hash over the 5-tuple that binds a record to its
/// predecessor (spec §6.2): the octet-concatenation
/// `prev_hash || "|" || decimal(timestamp) || "|" || kind || "|" || source || "|" || payload`.
#[must_use]
pub fn link_hash(prev_hash: &str, timestamp: i64, kind: RecordKind, source: &str, payload: &str) -> String {
    let joined = format!(
        "{prev_hash}|{timestamp}|{kind}|{source}|{payload}",
        kind = kind.as_str()
    );
    sha256_hex(joined.as_bytes())
}

/// Parse an `external_ref` of the form `"<namespace>:<offset>"` per spec
/// §6.2's grammar: `ns` may itself contain colons, the *last* colon
/// separates namespace from offset. Returns `None` if there is no colon
/// or the suffix after the last colon is not a decimal integer.
#[must_use]
pub fn parse_external_ref(s: &str) -> Option<(&str, i64)> {
    let (ns, offset) = s.rsplit_once(':')?;
    let offset: i64 = offset.parse().ok()?;
    Some((ns, offset))
}

/// The namespace bucket of an `external_ref` (prefix before the last
/// colon), or `"default"` if the ref is empty or has no colon at all.
#[must_use]
pub fn external_ref_namespace(external_ref: &str) -> String {
    if external_ref.is_empty() {
        return "default".to_string();
    }
    match external_ref.rsplit_once(':') {
        Some((ns, _)) => ns.to_string(),
        None => "default".to_string(),
    }
}

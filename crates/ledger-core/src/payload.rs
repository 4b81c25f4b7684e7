// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed record payloads (spec §3.2) with strict parse/validate/serialize.

use crate::ContractError;
use serde::{Deserialize, Serialize};

/// Error from [`PayloadSchema::parse`]: the bytes are not valid JSON for
/// this schema, or they contain a field the schema does not define.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload: {0}")]
pub struct MalformedPayload(#[from] pub serde_json::Error);

/// Common contract every typed payload implements (spec §4.2): `parse`
/// (bytes → typed value, rejecting unknown fields and invalid shape),
/// `validate` (typed value → ok/error listing every missing or blank
/// required field), and `serialize` (typed value → canonical bytes).
pub trait PayloadSchema: Sized {
    /// Parse canonical or non-canonical JSON bytes into this payload,
    /// rejecting unknown fields.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`] on invalid JSON or unknown fields.
    fn parse(bytes: &[u8]) -> Result<Self, MalformedPayload>;

    /// List every missing or blank required field by name. Empty means
    /// the payload is valid.
    fn validate(&self) -> Vec<String>;

    /// Produce the canonical byte-exact serialization of this payload.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if serialization fails.
    fn serialize(&self) -> Result<String, ContractError>;
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Source code identity (spec §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CodePayload {
    /// Repository identifier; non-empty.
    pub repo: String,
    /// Commit hash; non-empty. The reconstructor additionally warns if
    /// this is fewer than 7 characters (§4.5.2).
    pub commit: String,
    /// Optional list of build artifact identifiers.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Optional list of lockfile identifiers.
    #[serde(default)]
    pub lockfiles: Vec<String>,
}

impl PayloadSchema for CodePayload {
    fn parse(bytes: &[u8]) -> Result<Self, MalformedPayload> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn validate(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if is_blank(&self.repo) {
            missing.push("repo".to_string());
        }
        if is_blank(&self.commit) {
            missing.push("commit".to_string());
        }
        missing
    }

    fn serialize(&self) -> Result<String, ContractError> {
        crate::canonical_json(self)
    }
}

/// Configuration snapshot (spec §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfigPayload {
    /// Non-empty path or URI the config was read from.
    pub source: String,
    /// Non-empty version tag.
    pub version: String,
    /// Non-empty digest prefixed with its algorithm, e.g. `"sha256:…"`.
    pub hash: String,
    /// The full config content as a string. May legitimately be empty;
    /// an empty snapshot is a provenance concern (§4.5.2), not a
    /// validation failure.
    #[serde(default)]
    pub snapshot: String,
}

impl PayloadSchema for ConfigPayload {
    fn parse(bytes: &[u8]) -> Result<Self, MalformedPayload> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn validate(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if is_blank(&self.source) {
            missing.push("source".to_string());
        }
        if is_blank(&self.version) {
            missing.push("version".to_string());
        }
        if is_blank(&self.hash) {
            missing.push("hash".to_string());
        }
        missing
    }

    fn serialize(&self) -> Result<String, ContractError> {
        crate::canonical_json(self)
    }
}

/// Runtime environment descriptor (spec §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentPayload {
    /// Non-empty operating system identifier.
    pub os: String,
    /// Non-empty runtime identifier (e.g. interpreter/VM version).
    pub runtime: String,
    /// Non-empty CPU architecture.
    pub arch: String,
    /// Non-empty source of the captured time (e.g. `"system"`).
    pub time_source: String,
    /// Optional kernel version string.
    #[serde(default)]
    pub kernel: Option<String>,
    /// Optional container identifier.
    #[serde(default)]
    pub container: Option<String>,
    /// Optional free-form flags.
    #[serde(default)]
    pub flags: Vec<String>,
}

impl PayloadSchema for EnvironmentPayload {
    fn parse(bytes: &[u8]) -> Result<Self, MalformedPayload> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn validate(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if is_blank(&self.os) {
            missing.push("os".to_string());
        }
        if is_blank(&self.runtime) {
            missing.push("runtime".to_string());
        }
        if is_blank(&self.arch) {
            missing.push("arch".to_string());
        }
        if is_blank(&self.time_source) {
            missing.push("time_source".to_string());
        }
        missing
    }

    fn serialize(&self) -> Result<String, ContractError> {
        crate::canonical_json(self)
    }
}

/// External data mutation (spec §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MutationPayload {
    /// Non-empty mutation type tag.
    #[serde(rename = "type")]
    pub mutation_type: String,
    /// Non-empty mutation identifier.
    pub id: String,
    /// Non-empty origin tag for the mutation.
    pub source: String,
    /// Optional content digest.
    #[serde(default)]
    pub hash: Option<String>,
    /// Optional `"<namespace>:<offset>"` reference (§6.2 grammar).
    #[serde(default)]
    pub external_ref: Option<String>,
}

impl PayloadSchema for MutationPayload {
    fn parse(bytes: &[u8]) -> Result<Self, MalformedPayload> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn validate(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if is_blank(&self.mutation_type) {
            missing.push("type".to_string());
        }
        if is_blank(&self.id) {
            missing.push("id".to_string());
        }
        if is_blank(&self.source) {
            missing.push("source".to_string());
        }
        missing
    }

    fn serialize(&self) -> Result<String, ContractError> {
        crate::canonical_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_unknown_fields() {
        let bytes = br#"{"repo":"a","commit":"abc1234","bogus":true}"#;
        assert!(CodePayload::parse(bytes).is_err());
    }

    #[test]
    fn validate_lists_every_blank_required_field() {
        let p = CodePayload {
            repo: String::new(),
            commit: "  ".to_string(),
            artifacts: vec![],
            lockfiles: vec![],
        };
        let missing = p.validate();
        assert_eq!(missing, vec!["repo".to_string(), "commit".to_string()]);
    }

    #[test]
    fn config_snapshot_may_be_empty_without_failing_validate() {
        let p = ConfigPayload {
            source: "a".into(),
            version: "1".into(),
            hash: "sha256:deadbeef".into(),
            snapshot: String::new(),
        };
        assert!(p.validate().is_empty());
    }

    #[test]
    fn serialize_is_canonical_and_stable() {
        let p = EnvironmentPayload {
            os: "linux".into(),
            runtime: "x".into(),
            arch: "amd64".into(),
            time_source: "system".into(),
            kernel: None,
            container: None,
            flags: vec![],
        };
        let a = p.serialize().unwrap();
        let b = p.serialize().unwrap();
        assert_eq!(a, b);
        assert!(!a.contains(' '));
    }

    #[test]
    fn mutation_payload_renames_type_field() {
        let bytes = br#"{"type":"insert","id":"1","source":"kafka"}"#;
        let m = MutationPayload::parse(bytes).unwrap();
        assert_eq!(m.mutation_type, "insert");
    }
}

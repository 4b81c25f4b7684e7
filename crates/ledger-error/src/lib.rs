// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! Error code catalog for the provenance ledger.
//!
//! Every error code follows the pattern `LEDGER-X###` where `X` is the
//! taxonomy letter (spec §7) and `###` is a three-digit number:
//!
//! - **U** — usage: missing/invalid caller inputs
//! - **M** — malformed: payload bytes do not parse
//! - **V** — invalid: parsed payload fails validation
//! - **I** — io: storage read/write failure
//! - **N** — not_found: missing record
//! - **G** — integrity: chain verifier detected a mismatch
//! - **P** — provenance: non-fatal reconstruction anomaly

use std::collections::BTreeMap;
use std::fmt;

/// Enumeration of all ledger error codes, organized by taxonomy category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // ── usage (U) ─────────────────────────────────────────────────────
    /// A required CLI argument or API input is missing.
    MissingArgument,
    /// An argument value is syntactically invalid.
    InvalidArgument,
    /// Two mutually exclusive inputs were supplied together.
    ConflictingArguments,

    // ── malformed (M) ─────────────────────────────────────────────────
    /// The payload bytes are not valid JSON.
    MalformedJson,
    /// The payload contains a field not defined by its schema.
    UnknownField,
    /// The record `kind` value is not one of the four known payload kinds.
    UnknownRecordKind,

    // ── invalid (V) ───────────────────────────────────────────────────
    /// A required field is missing or blank.
    BlankRequiredField,
    /// A field's value does not satisfy its schema constraint.
    InvalidFieldValue,
    /// The `kind` or `payload` of an append input is empty.
    EmptyAppendInput,

    // ── io (I) ────────────────────────────────────────────────────────
    /// A storage read or write failed.
    IoFailure,
    /// The store's on-disk schema could not be initialized or is corrupt.
    CorruptSchema,
    /// The blob store root is not writable.
    BlobRootUnwritable,

    // ── not_found (N) ─────────────────────────────────────────────────
    /// No record exists with the requested id.
    RecordNotFound,
    /// No blob exists with the requested digest.
    BlobNotFound,

    // ── integrity (G) ────────────────────────────────────────────────
    /// A record's `prev_hash` does not equal its predecessor's `hash`.
    PrevHashMismatch,
    /// A record's stored `hash` does not match its recomputed link hash.
    HashMismatch,
    /// A non-empty chain was expected but the store is empty.
    EmptyChain,

    // ── provenance (P) ───────────────────────────────────────────────
    /// A reconstruction-time consistency check failed; non-fatal.
    ProvenanceAnomaly,
}

impl ErrorCode {
    /// Machine-readable code string (e.g. `"LEDGER-U001"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingArgument => "LEDGER-U001",
            Self::InvalidArgument => "LEDGER-U002",
            Self::ConflictingArguments => "LEDGER-U003",

            Self::MalformedJson => "LEDGER-M001",
            Self::UnknownField => "LEDGER-M002",
            Self::UnknownRecordKind => "LEDGER-M003",

            Self::BlankRequiredField => "LEDGER-V001",
            Self::InvalidFieldValue => "LEDGER-V002",
            Self::EmptyAppendInput => "LEDGER-V003",

            Self::IoFailure => "LEDGER-I001",
            Self::CorruptSchema => "LEDGER-I002",
            Self::BlobRootUnwritable => "LEDGER-I003",

            Self::RecordNotFound => "LEDGER-N001",
            Self::BlobNotFound => "LEDGER-N002",

            Self::PrevHashMismatch => "LEDGER-G001",
            Self::HashMismatch => "LEDGER-G002",
            Self::EmptyChain => "LEDGER-G003",

            Self::ProvenanceAnomaly => "LEDGER-P001",
        }
    }

    /// Taxonomy category label, matching spec §7's `Kind` column verbatim.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingArgument | Self::InvalidArgument | Self::ConflictingArguments => "usage",
            Self::MalformedJson | Self::UnknownField | Self::UnknownRecordKind => "malformed",
            Self::BlankRequiredField | Self::InvalidFieldValue | Self::EmptyAppendInput => {
                "invalid"
            }
            Self::IoFailure | Self::CorruptSchema | Self::BlobRootUnwritable => "io",
            Self::RecordNotFound | Self::BlobNotFound => "not_found",
            Self::PrevHashMismatch | Self::HashMismatch | Self::EmptyChain => "integrity",
            Self::ProvenanceAnomaly => "provenance",
        }
    }

    /// Short human-readable description of this error code.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingArgument => "A required argument or input is missing",
            Self::InvalidArgument => "An argument value is syntactically invalid",
            Self::ConflictingArguments => "Two mutually exclusive inputs were supplied together",

            Self::MalformedJson => "The payload bytes are not valid JSON",
            Self::UnknownField => "The payload contains a field not defined by its schema",
            Self::UnknownRecordKind => "The record kind is not one of code/config/environment/mutation",

            Self::BlankRequiredField => "A required field is missing or blank",
            Self::InvalidFieldValue => "A field's value does not satisfy its schema constraint",
            Self::EmptyAppendInput => "The kind or payload of an append input is empty",

            Self::IoFailure => "A storage read or write failed",
            Self::CorruptSchema => "The store's on-disk schema could not be initialized or is corrupt",
            Self::BlobRootUnwritable => "The blob store root is not writable",

            Self::RecordNotFound => "No record exists with the requested id",
            Self::BlobNotFound => "No blob exists with the requested digest",

            Self::PrevHashMismatch => "A record's prev_hash does not equal its predecessor's hash",
            Self::HashMismatch => "A record's stored hash does not match its recomputed link hash",
            Self::EmptyChain => "A non-empty chain was expected but the store is empty",

            Self::ProvenanceAnomaly => "A reconstruction-time consistency check failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::error::Error for ErrorCode {}

/// All error codes, in definition order.
const ALL_CODES: &[ErrorCode] = &[
    ErrorCode::MissingArgument,
    ErrorCode::InvalidArgument,
    ErrorCode::ConflictingArguments,
    ErrorCode::MalformedJson,
    ErrorCode::UnknownField,
    ErrorCode::UnknownRecordKind,
    ErrorCode::BlankRequiredField,
    ErrorCode::InvalidFieldValue,
    ErrorCode::EmptyAppendInput,
    ErrorCode::IoFailure,
    ErrorCode::CorruptSchema,
    ErrorCode::BlobRootUnwritable,
    ErrorCode::RecordNotFound,
    ErrorCode::BlobNotFound,
    ErrorCode::PrevHashMismatch,
    ErrorCode::HashMismatch,
    ErrorCode::EmptyChain,
    ErrorCode::ProvenanceAnomaly,
];

/// Rich error value carrying an [`ErrorCode`], a human message, and
/// optional structured context.
pub struct ErrorInfo {
    /// The catalog error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary key-value context (deterministic ordering).
    pub context: BTreeMap<String, String>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ErrorInfo {
    /// Start building an [`ErrorInfo`] for the given code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    /// Add a key-value context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach an underlying source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            let mut first = true;
            for (k, v) in &self.context {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
                first = false;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorInfo")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

impl std::error::Error for ErrorInfo {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Static catalog providing lookup and enumeration of [`ErrorCode`]s.
pub struct ErrorCatalog;

impl ErrorCatalog {
    /// Look up an [`ErrorCode`] by its code string (e.g. `"LEDGER-U001"`).
    #[must_use]
    pub fn lookup(code: &str) -> Option<ErrorCode> {
        ALL_CODES.iter().find(|c| c.code() == code).copied()
    }

    /// Return every defined [`ErrorCode`].
    #[must_use]
    pub fn all() -> Vec<ErrorCode> {
        ALL_CODES.to_vec()
    }

    /// Return all codes belonging to `category` (e.g. `"integrity"`).
    #[must_use]
    pub fn by_category(category: &str) -> Vec<ErrorCode> {
        ALL_CODES
            .iter()
            .filter(|c| c.category() == category)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_at_least_one_code() {
        for cat in [
            "usage",
            "malformed",
            "invalid",
            "io",
            "not_found",
            "integrity",
            "provenance",
        ] {
            assert!(
                !ErrorCatalog::by_category(cat).is_empty(),
                "category {cat} has no codes"
            );
        }
    }

    #[test]
    fn lookup_roundtrips_through_code_string() {
        for c in ErrorCatalog::all() {
            assert_eq!(ErrorCatalog::lookup(c.code()), Some(c));
        }
    }

    #[test]
    fn error_info_display_includes_code_and_context() {
        let e = ErrorInfo::new(ErrorCode::HashMismatch, "tampered record")
            .with_context("id", "3");
        let s = e.to_string();
        assert!(s.contains("LEDGER-G002"));
        assert!(s.contains("id=3"));
    }
}

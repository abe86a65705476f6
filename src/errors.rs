//! Typed error hierarchy for the Scrutiny orchestrator.
//!
//! Two top-level enums cover the two subsystems:
//! - `ReviewError` — phase orchestration and merge failures
//! - `StoreError` — record and evidence persistence failures

use thiserror::Error;

use crate::oracle::OraclePhase;

/// Errors from the review orchestration core.
///
/// Phase-level failures (an oracle call that errored or timed out) are
/// additionally recorded on the record itself as a failed `PhaseRun`, so
/// callers always hold an inspectable last-known-good state.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Missing required locked context or an out-of-order phase invocation.
    /// Fatal; the caller must correct the request before retrying.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Oracle invocation failed or timed out. The record is unchanged and
    /// the same phase may be retried against the same locked snapshot.
    #[error("Oracle invocation for phase {phase} failed: {message}")]
    Oracle { phase: OraclePhase, message: String },

    /// Targeted re-verify requested with zero derived targets. Rejected
    /// before any oracle call is made.
    #[error("Targeted re-verify requested but no targets are outstanding")]
    EmptyTargets,

    /// A phase output wrote an unexpected or overlapping section key.
    /// Cannot occur with the disjoint-section design; fatal if detected.
    #[error("Merge conflict on section key '{section}'")]
    MergeConflict { section: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReviewError {
    /// Whether retrying the same call with identical inputs can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Oracle { .. })
    }
}

/// Errors from record and evidence persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record {id} not found")]
    RecordNotFound { id: uuid::Uuid },

    #[error("Evidence ref '{reference}' not found")]
    EvidenceNotFound { reference: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode record at {path}: {source}")]
    DecodeFailed {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record {id}: {source}")]
    EncodeFailed {
        id: uuid::Uuid,
        #[source]
        source: serde_json::Error,
    },
}

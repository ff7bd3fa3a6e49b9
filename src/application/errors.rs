//! Error types for the engine API

use thiserror::Error;

use crate::domain::finding::FindingKind;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The batch was refused before any mutation ran
    #[error("Batch rejected: {0}")]
    ValidationRejected(String),

    #[error("Invalid batch configuration: {0}")]
    Config(String),

    #[error("Failed to load snapshot: {0}")]
    Snapshot(#[source] anyhow::Error),

    #[error("Detection task failed: {0}")]
    Detection(#[from] tokio::task::JoinError),
}

/// A finding that cannot be turned into a store mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("{kind} finding for '{subject_key}' is informational only")]
    Informational { kind: FindingKind, subject_key: String },

    #[error("{kind} finding for '{subject_key}' has no proposed value")]
    MissingProposal { kind: FindingKind, subject_key: String },

    #[error("{kind} finding for '{subject_key}' has a malformed proposal: {reason}")]
    MalformedProposal {
        kind: FindingKind,
        subject_key: String,
        reason: String,
    },
}

/// Failure of a two-phase move, naming the phase that failed
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("could not read record {path}: {source}")]
    Read { path: String, source: anyhow::Error },

    #[error("source record {from} no longer exists")]
    SourceMissing { from: String },

    /// Nothing was written
    #[error("{to} already holds a record; reconcile it before moving")]
    TargetExists { to: String },

    #[error("could not write {to}: {source}")]
    Write { to: String, source: anyhow::Error },

    /// The record now exists under both keys
    #[error("wrote {to} but could not remove {from}: {source}")]
    Remove {
        from: String,
        to: String,
        source: anyhow::Error,
    },
}

impl MoveError {
    /// Whether the store was left with the record under both keys
    pub const fn is_half_applied(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

// src/error.rs
// Error types shared by the rebuild pipeline and the query engine, each tagged with a Severity.

use std::path::PathBuf;

use thiserror::Error;

/// Why the normalizer refused a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingTitle,
    MissingSourceId,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingTitle => write!(f, "missing title"),
            RejectReason::MissingSourceId => write!(f, "missing source id"),
        }
    }
}

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Only the offending record is skipped.
    PerRecord,
    /// Only the offending request fails.
    Request,
    /// The whole rebuild aborts and prior state is kept.
    Batch,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("record {source_name}/{source_id} rejected: {reason}")]
    RecordRejected {
        source_name: String,
        source_id: String,
        reason: RejectReason,
    },

    #[error("encoding failed for {subject}: {reason}")]
    EncodingFailed { subject: String, reason: String },

    #[error("failed to write golden record store at {}: {source}", path.display())]
    StoreWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read golden record store at {}: {reason}", path.display())]
    StoreReadFailed { path: PathBuf, reason: String },

    #[error("index build failed: {0}")]
    IndexBuildFailed(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("search failed: {0}")]
    SearchFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    pub fn severity(&self) -> Severity {
        match self {
            CoreError::RecordRejected { .. } | CoreError::EncodingFailed { .. } => {
                Severity::PerRecord
            }
            CoreError::InvalidQuery(_) | CoreError::SearchFailed(_) => Severity::Request,
            CoreError::StoreWriteFailed { .. }
            | CoreError::StoreReadFailed { .. }
            | CoreError::IndexBuildFailed(_)
            | CoreError::InvalidConfig(_) => Severity::Batch,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity() != Severity::Batch
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::IndexBuildFailed(format!("{:#}", err))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

//! Error types for the claim matcher
//!
//! Each subsystem owns a structured `thiserror` enum with actionable
//! messages. [`MatchError`] gathers them for callers of the engine and
//! attaches stable status codes for JSON output.

use thiserror::Error;

use crate::ann::AnnError;
use crate::config::ConfigError;
use crate::records::{RecordId, RecordStoreError};
use crate::vector::{VectorError, VectorStorageError};

/// Top-level error returned by the matching engine.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    VectorStorage(#[from] VectorStorageError),

    #[error(transparent)]
    RecordStore(#[from] RecordStoreError),

    #[error(transparent)]
    Ann(#[from] AnnError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No index has been loaded or built yet
    #[error("No index is loaded\nSuggestion: Run 'misinfo rebuild' or open the engine before querying")]
    IndexUnavailable,

    /// Claim rejected before anything was written
    #[error("Invalid claim: {reason}")]
    InvalidClaim { reason: String },

    /// Ingestion failed after staging; the staged vectors were discarded
    #[error("Ingestion rolled back: {cause}")]
    IngestRolledBack { cause: String },

    /// The record is durable but its vectors or the index are not yet
    /// up to date with it
    #[error(
        "Claim {record_id} was stored but is not matchable yet: {cause}\nSuggestion: Do not ingest it again; run 'misinfo rebuild' or reopen the store to publish it"
    )]
    IngestIncomplete { record_id: RecordId, cause: String },
}

impl MatchError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(_) => "INVALID_VECTOR",
            Self::VectorStorage(VectorStorageError::Vector(VectorError::DimensionMismatch {
                ..
            })) => "DIMENSION_MISMATCH",
            Self::VectorStorage(VectorStorageError::StoredDimensionMismatch { .. }) => {
                "STORED_DIMENSION_MISMATCH"
            }
            Self::VectorStorage(_) => "VECTOR_STORAGE_ERROR",
            Self::RecordStore(RecordStoreError::NotInitialized { .. }) => "NOT_FOUND",
            Self::RecordStore(RecordStoreError::OverlappingRange { .. }) => "OVERLAPPING_RANGE",
            Self::RecordStore(_) => "RECORD_STORE_ERROR",
            Self::Ann(AnnError::CorruptIndex { .. }) => "CORRUPT_INDEX",
            Self::Ann(AnnError::Vector(VectorError::DimensionMismatch { .. })) => {
                "DIMENSION_MISMATCH"
            }
            Self::Ann(_) => "INDEX_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::IndexUnavailable => "INDEX_UNAVAILABLE",
            Self::InvalidClaim { .. } => "INVALID_CLAIM",
            Self::IngestRolledBack { .. } => "INGEST_ROLLED_BACK",
            Self::IngestIncomplete { .. } => "INGEST_INCOMPLETE",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(_) | Self::Ann(AnnError::Vector(_)) => vec![
                "Check that every vector comes from the configured embedding model",
                "Compare matching.vector_dimension with the embedding size",
            ],
            Self::VectorStorage(VectorStorageError::StoredDimensionMismatch { .. }) => vec![
                "The data directory was created with a different vector dimension",
                "Point data_dir at a fresh directory or restore the original dimension",
            ],
            Self::VectorStorage(_) => vec![
                "Check disk space and permissions in the data directory",
                "Reopening the store settles any half-written vectors",
            ],
            Self::RecordStore(RecordStoreError::NotInitialized { .. }) => {
                vec!["Open the engine before reading records"]
            }
            Self::RecordStore(_) => vec![
                "Check disk space and permissions in the data directory",
                "Restore records.log from a backup if it is damaged",
            ],
            Self::Ann(AnnError::CorruptIndex { .. }) => vec![
                "Run 'misinfo rebuild' to rebuild the index from the vector store",
                "Check for disk errors or filesystem corruption",
            ],
            Self::Ann(_) => vec!["Run 'misinfo rebuild' to rebuild the index"],
            Self::Config(_) => vec![
                "Run 'misinfo config' to inspect the effective settings",
                "Run 'misinfo init --force' to regenerate the settings file",
            ],
            Self::IndexUnavailable => vec!["Run 'misinfo rebuild' to build the index"],
            Self::InvalidClaim { .. } => {
                vec!["A claim needs non-empty text and at least one vector"]
            }
            Self::IngestRolledBack { .. } => vec![
                "The store was left in its previous state",
                "Try the operation again, it may succeed on retry",
            ],
            Self::IngestIncomplete { .. } => vec![
                "The claim is stored; ingesting it again would duplicate it",
                "Run 'misinfo rebuild' once the disk problem is fixed",
            ],
        }
    }
}

/// Result type alias for engine operations
pub type MatchResult<T> = Result<T, MatchError>;

/// Result type alias for vector storage operations
pub type StorageResult<T> = Result<T, VectorStorageError>;

//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed (a match query found claims)
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - critical failure that should halt automation
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::ann::AnnError;
use crate::error::MatchError;
use crate::records::RecordStoreError;
use crate::vector::VectorStorageError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// No claim matched but the command ran fine (code 3)
    NotFound = 3,

    /// Input could not be used (code 4)
    InvalidInput = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Index corruption detected (code 7)
    IndexCorrupted = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// `Success` when anything matched, `NotFound` otherwise.
    pub fn from_match_result<T>(results: &[T]) -> Self {
        if results.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Convert a `MatchError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &MatchError) -> Self {
        match error {
            MatchError::Vector(_)
            | MatchError::InvalidClaim { .. }
            | MatchError::Ann(AnnError::Vector(_))
            | MatchError::VectorStorage(VectorStorageError::Vector(_)) => ExitCode::InvalidInput,

            MatchError::Ann(AnnError::CorruptIndex { .. }) => ExitCode::IndexCorrupted,

            MatchError::VectorStorage(VectorStorageError::Io(_))
            | MatchError::RecordStore(RecordStoreError::Io(_))
            | MatchError::IngestIncomplete { .. } => ExitCode::IoError,

            MatchError::Config(_)
            | MatchError::VectorStorage(VectorStorageError::StoredDimensionMismatch { .. }) => {
                ExitCode::ConfigError
            }

            // Damaged stores need a human
            MatchError::VectorStorage(VectorStorageError::InvalidFormat(_))
            | MatchError::RecordStore(RecordStoreError::Corrupt(_))
            | MatchError::RecordStore(RecordStoreError::IdExhausted) => ExitCode::BlockingError,

            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    ///
    /// Blocking errors should halt automation pipelines.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "No matching claims",
            ExitCode::InvalidInput => "Invalid input",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexCorrupted => "Index corrupted",
        }
    }
}

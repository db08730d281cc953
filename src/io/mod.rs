//! Input/Output handling for the CLI.
//!
//! This module provides:
//! - Unified output formatting (tables, JSON)
//! - Consistent error handling and exit codes
//! - JSON input of precomputed embeddings

pub mod exit_code;
pub mod format;
pub mod input;
pub mod output;

pub use exit_code::ExitCode;
pub use format::{ErrorDetails, JsonResponse, OutputFormat, ResponseMeta};
pub use output::OutputManager;

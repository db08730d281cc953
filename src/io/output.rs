//! Output management for CLI commands.
//!
//! Handles formatting and display for different output formats,
//! providing a unified interface for text and JSON output.

use crate::error::MatchError;
use crate::io::exit_code::ExitCode;
use crate::io::format::{JsonResponse, OutputFormat};
use serde::Serialize;
use std::io::{self, Write};

/// Manages output formatting and display.
///
/// Text mode prints whatever rendering the caller supplies (usually a
/// table); JSON mode wraps the data in a [`JsonResponse`].
pub struct OutputManager {
    format: OutputFormat,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl OutputManager {
    /// Create a new output manager with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
        }
    }

    /// Create an output manager for testing with custom writers.
    #[cfg(test)]
    pub fn new_with_writers(
        format: OutputFormat,
        stdout: Box<dyn Write>,
        stderr: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            stdout,
            stderr,
        }
    }

    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Output a successful result.
    pub fn success<T, F>(&mut self, data: &T, render: F) -> io::Result<ExitCode>
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        match self.format {
            OutputFormat::Json => {
                let response = JsonResponse::success(data);
                writeln!(self.stdout, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => {
                writeln!(self.stdout, "{}", render(data))?;
            }
        }
        Ok(ExitCode::Success)
    }

    /// Output query results.
    ///
    /// An empty result is not an error, but exits with `NotFound` so
    /// scripts can branch on it.
    pub fn matches<T, F>(&mut self, items: &[T], render: F) -> io::Result<ExitCode>
    where
        T: Serialize,
        F: FnOnce(&[T]) -> String,
    {
        let code = ExitCode::from_match_result(items);
        match (self.format, code) {
            (OutputFormat::Json, ExitCode::Success) => {
                let response = JsonResponse::success(items);
                writeln!(self.stdout, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            (OutputFormat::Json, _) => {
                let response = JsonResponse::no_match(items);
                writeln!(self.stdout, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            (OutputFormat::Text, ExitCode::Success) => {
                writeln!(self.stdout, "Found {} matching claims:", items.len())?;
                writeln!(self.stdout, "{}", render(items))?;
            }
            (OutputFormat::Text, _) => {
                writeln!(self.stderr, "No known claim matched")?;
            }
        }
        Ok(code)
    }

    /// Output an error with suggestions.
    pub fn error(&mut self, error: &MatchError) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => {
                let response = JsonResponse::from_error(error);
                writeln!(self.stderr, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => {
                writeln!(self.stderr, "Error: {error}")?;
                for suggestion in error.recovery_suggestions() {
                    writeln!(self.stderr, "  Suggestion: {suggestion}")?;
                }
            }
        }
        Ok(ExitCode::from_error(error))
    }

    /// Output informational message (text mode only).
    pub fn info(&mut self, message: &str) -> io::Result<()> {
        if matches!(self.format, OutputFormat::Text) {
            writeln!(self.stdout, "{message}")?;
        }
        Ok(())
    }
}

//! Terminal display utilities for CLI output.

pub mod tables;

pub use tables::{TableBuilder, create_match_table, create_sentence_table, create_status_table};

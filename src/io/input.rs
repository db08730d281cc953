//! JSON input for the CLI.
//!
//! Embeddings are produced upstream, so commands read them as JSON from a
//! file or from stdin (`-`).

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::matching::SentenceEmbeddings;

/// Reads `path` (or stdin when `path` is `-`) and parses it as JSON.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    parse_json(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> serde_json::Result<T> {
    serde_json::from_str(raw)
}

/// A list of vectors: `[[0.1, 0.2], [0.3, 0.4]]`.
pub fn read_vectors(path: &Path) -> Result<Vec<Vec<f32>>> {
    read_json(path)
}

/// Sentences with their embeddings:
/// `[{"sentence": "...", "embeddings": [[...], ...]}, ...]`.
pub fn read_sentences(path: &Path) -> Result<Vec<SentenceEmbeddings>> {
    read_json(path)
}

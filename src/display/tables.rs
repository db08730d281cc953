//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::engine::EngineStatus;
use crate::matching::SentenceMatches;
use crate::records::ClaimMatch;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        // Apply rounded corners
        table.apply_modifier(UTF8_ROUND_CORNERS);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Table of matched claims for one query.
pub fn create_match_table(matches: &[ClaimMatch]) -> String {
    matches
        .iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Claim", "Source", "Correction"]),
            |table, m| {
                table.add_row(vec![
                    m.claim_text.clone(),
                    m.source_link.clone(),
                    m.corrective_info.clone(),
                ])
            },
        )
        .build()
}

/// Table of matched claims grouped by input sentence.
pub fn create_sentence_table(sentences: &[SentenceMatches]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["Sentence", "Claim", "Source", "Correction"]);
    for s in sentences {
        for (i, m) in s.results.iter().enumerate() {
            // Sentence text only on its first row
            let sentence = if i == 0 { s.sentence.clone() } else { String::new() };
            builder = builder.add_row(vec![
                sentence,
                m.claim_text.clone(),
                m.source_link.clone(),
                m.corrective_info.clone(),
            ]);
        }
    }
    builder.build()
}

/// Create a status table for the engine.
pub fn create_status_table(status: &EngineStatus) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);

    table.add_row(vec!["Data directory", &status.data_dir.display().to_string()]);
    table.add_row(vec!["Vector dimension", &status.dimension.to_string()]);
    table.add_row(vec!["Claims", &status.records.to_string()]);
    table.add_row(vec!["Vectors", &status.vectors.to_string()]);
    if status.staged_vectors > 0 {
        table.add_row(vec!["Staged vectors", &status.staged_vectors.to_string()]);
    }

    let index = &status.index;
    let (state, color) = if !index.loaded {
        ("✗ not loaded", Color::Red)
    } else if index.stale || index.indexed_vectors != status.vectors as u64 {
        ("⚠ stale", Color::Yellow)
    } else {
        ("✓ up to date", Color::Green)
    };
    table.add_row(vec![
        Cell::new("Index"),
        Cell::new(state).fg(color).add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec!["Trees", &index.tree_count.to_string()]);
    table.add_row(vec!["Indexed vectors", &index.indexed_vectors.to_string()]);
    table.add_row(vec!["Rebuilds this run", &index.rebuilds.to_string()]);

    table.to_string()
}

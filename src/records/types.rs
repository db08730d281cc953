//! Record types for the misinformation claim corpus.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::vector::VectorRange;

/// Type-safe wrapper for record IDs.
///
/// Assigned sequentially by the record store starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(NonZeroU32);

impl RecordId {
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A known misinformation claim and the vectors derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MisinformationRecord {
    pub id: RecordId,
    pub claim_text: String,
    pub source_link: String,
    pub corrective_info: String,
    /// Main-sentence vector followed by any sub-proposition vectors.
    pub vector_range: VectorRange,
}

/// What a caller sees for a matched claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimMatch {
    pub claim_text: String,
    pub source_link: String,
    pub corrective_info: String,
}

impl From<&MisinformationRecord> for ClaimMatch {
    fn from(record: &MisinformationRecord) -> Self {
        Self {
            claim_text: record.claim_text.clone(),
            source_link: record.source_link.clone(),
            corrective_info: record.corrective_info.clone(),
        }
    }
}

impl From<MisinformationRecord> for ClaimMatch {
    fn from(record: MisinformationRecord) -> Self {
        Self {
            claim_text: record.claim_text,
            source_link: record.source_link,
            corrective_info: record.corrective_info,
        }
    }
}

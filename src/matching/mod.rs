//! Sentence-to-claim matching.

mod pipeline;

use serde::{Deserialize, Serialize};

use crate::records::ClaimMatch;

pub use pipeline::{MatchParams, MatchingPipeline};

/// A sentence and the embeddings computed for it upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceEmbeddings {
    pub sentence: String,
    pub embeddings: Vec<Vec<f32>>,
}

/// The claims one sentence matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceMatches {
    pub sentence: String,
    pub results: Vec<ClaimMatch>,
}

//! Claim intake: cleanup and validation before anything touches disk.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, MatchResult};
use crate::vector::VectorDimension;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

/// Character references decoded by markup stripping. `&amp;` goes last so
/// that `&amp;lt;` becomes `&lt;` rather than `<`.
const ENTITIES: [(&str, &str); 6] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
    ("&amp;", "&"),
];

/// A claim to add to the corpus, with the embeddings computed for it.
///
/// `vectors[0]` is the main sentence; any further vectors are propositions
/// extracted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClaim {
    pub claim_text: String,
    pub source_link: String,
    pub corrective_info: String,
    pub vectors: Vec<Vec<f32>>,
    /// Strip HTML tags and decode common character references from the text.
    #[serde(default)]
    pub strip_markup: bool,
}

impl NewClaim {
    #[must_use]
    pub fn new(
        claim_text: impl Into<String>,
        source_link: impl Into<String>,
        corrective_info: impl Into<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            claim_text: claim_text.into(),
            source_link: source_link.into(),
            corrective_info: corrective_info.into(),
            vectors,
            strip_markup: false,
        }
    }

    #[must_use]
    pub fn with_strip_markup(mut self, strip: bool) -> Self {
        self.strip_markup = strip;
        self
    }

    /// Normalized claim text, as it will be stored.
    #[must_use]
    pub fn normalized_text(&self) -> String {
        normalize_claim_text(&self.claim_text, self.strip_markup)
    }

    /// Checks the claim can be ingested without writing anything.
    pub fn validate(&self, dimension: VectorDimension) -> MatchResult<()> {
        if self.normalized_text().is_empty() {
            return Err(MatchError::InvalidClaim {
                reason: "claim text is empty".to_string(),
            });
        }
        if self.vectors.is_empty() {
            return Err(MatchError::InvalidClaim {
                reason: "claim has no vectors".to_string(),
            });
        }
        for vector in &self.vectors {
            dimension.validate_vector(vector)?;
        }
        Ok(())
    }
}

/// Removes line breaks and tabs, optionally strips markup, and trims.
#[must_use]
pub fn normalize_claim_text(text: &str, strip_markup: bool) -> String {
    let mut out: String = text
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .collect();

    if strip_markup {
        out = COMMENT.replace_all(&out, "").into_owned();
        out = TAG.replace_all(&out, "").into_owned();
        for (entity, replacement) in ENTITIES {
            out = out.replace(entity, replacement);
        }
    }

    out.trim().to_string()
}

//! Approximate nearest-neighbor index over the vector store.
//!
//! The index is a forest of randomized partition trees. Each tree splits the
//! vector set recursively by the hyperplane equidistant between two randomly
//! sampled members until at most `leaf_capacity` ids remain. Queries walk all
//! trees at once through a shared frontier ordered by an optimistic distance
//! bound, collect leaf ids until the search budget is spent, and then rank the
//! candidates by their true Euclidean distance.
//!
//! # Lifecycle
//! An [`AnnIndex`] is immutable. It is built once from a full snapshot of the
//! vector store, written to a single binary file, and replaced wholesale when
//! the store changes.

mod build;
mod persist;
mod search;
mod tree;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::vector::{Distance, VectorDimension, VectorError, VectorId};

pub use build::build_index;
pub use persist::INDEX_FORMAT_VERSION;
pub use search::SearchStats;
pub use tree::{AnnTree, Leaf, NodeRef, SplitNode};

/// Distance metric an index was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Euclidean,
}

impl Metric {
    #[must_use]
    pub fn to_u32(self) -> u32 {
        match self {
            Metric::Euclidean => 0,
        }
    }

    #[must_use]
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Metric::Euclidean),
            _ => None,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// Parameters controlling forest construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildParams {
    /// Number of independently built trees.
    pub tree_count: usize,
    /// Maximum number of ids per leaf.
    pub leaf_capacity: usize,
    /// Base seed; `None` draws a fresh one per build.
    pub seed: Option<u64>,
}

impl BuildParams {
    pub fn validate(&self) -> Result<(), AnnError> {
        if self.tree_count == 0 {
            return Err(AnnError::InvalidParams(
                "tree_count must be at least 1".to_string(),
            ));
        }
        if self.tree_count > u32::MAX as usize {
            return Err(AnnError::InvalidParams(
                "tree_count must fit in 32 bits".to_string(),
            ));
        }
        if self.leaf_capacity == 0 {
            return Err(AnnError::InvalidParams(
                "leaf_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            tree_count: 10,
            leaf_capacity: 32,
            seed: None,
        }
    }
}

/// Parameters controlling a single k-NN query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Maximum number of ranked neighbors returned.
    pub max_results: usize,
    /// Maximum number of tree nodes visited while collecting candidates.
    pub search_budget: usize,
}

/// A ranked query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub id: VectorId,
    pub distance: Distance,
}

/// Errors raised by index construction, persistence, and search.
#[derive(Error, Debug)]
pub enum AnnError {
    #[error("Corrupt index: {reason}\nSuggestion: Delete the index file to force a rebuild")]
    CorruptIndex { reason: String },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Invalid index parameters: {0}")]
    InvalidParams(String),

    #[error("Failed to write index to '{path}': {source}")]
    Persist { path: PathBuf, source: io::Error },

    #[error("Failed to read index from '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },
}

impl AnnError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        AnnError::CorruptIndex {
            reason: reason.into(),
        }
    }
}

/// Immutable forest of randomized partition trees.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnIndex {
    dimension: VectorDimension,
    metric: Metric,
    leaf_capacity: usize,
    seed: u64,
    vector_count: u64,
    max_vector_id: Option<VectorId>,
    trees: Vec<AnnTree>,
}

impl AnnIndex {
    /// An index over nothing: every tree is a single empty leaf.
    #[must_use]
    pub fn empty(dimension: VectorDimension, params: &BuildParams, seed: u64) -> Self {
        let trees = (0..params.tree_count as u64)
            .map(|t| AnnTree::empty(build::tree_seed(seed, t)))
            .collect();
        Self {
            dimension,
            metric: Metric::Euclidean,
            leaf_capacity: params.leaf_capacity,
            seed,
            vector_count: 0,
            max_vector_id: None,
            trees,
        }
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    #[must_use]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Base seed the forest was built from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn trees(&self) -> &[AnnTree] {
        &self.trees
    }

    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Number of vectors the forest was built over.
    #[must_use]
    pub fn vector_count(&self) -> u64 {
        self.vector_count
    }

    /// Highest vector id the forest covers.
    #[must_use]
    pub fn max_vector_id(&self) -> Option<VectorId> {
        self.max_vector_id
    }
}

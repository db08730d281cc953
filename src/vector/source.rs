//! Read access to stored vectors by id.
//!
//! The ANN index keeps only ids in its leaves and fetches the actual vectors
//! through this trait when re-ranking candidates.

use std::collections::HashMap;

use crate::vector::types::{VectorDimension, VectorError, VectorId};

/// Anything that can hand back a stored vector by id.
pub trait VectorSource: Send + Sync {
    /// Dimension shared by every vector in the source.
    fn dimension(&self) -> VectorDimension;

    /// Returns the vector stored under `id`, if any.
    fn vector(&self, id: VectorId) -> Option<Vec<f32>>;
}

/// Heap-backed vector source, mostly useful for tests and benchmarks.
#[derive(Debug, Clone)]
pub struct InMemoryVectors {
    dimension: VectorDimension,
    vectors: HashMap<VectorId, Vec<f32>>,
}

impl InMemoryVectors {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    /// Builds a source from `(id, vector)` pairs, validating every dimension.
    pub fn from_pairs(
        dimension: VectorDimension,
        pairs: impl IntoIterator<Item = (VectorId, Vec<f32>)>,
    ) -> Result<Self, VectorError> {
        let mut source = Self::new(dimension);
        for (id, vector) in pairs {
            source.insert(id, vector)?;
        }
        Ok(source)
    }

    pub fn insert(&mut self, id: VectorId, vector: Vec<f32>) -> Result<(), VectorError> {
        self.dimension.validate_vector(&vector)?;
        self.vectors.insert(id, vector);
        Ok(())
    }

    /// All stored pairs sorted by id.
    #[must_use]
    pub fn pairs(&self) -> Vec<(VectorId, Vec<f32>)> {
        let mut pairs: Vec<_> = self
            .vectors
            .iter()
            .map(|(id, v)| (*id, v.clone()))
            .collect();
        pairs.sort_by_key(|(id, _)| *id);
        pairs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl VectorSource for InMemoryVectors {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn vector(&self, id: VectorId) -> Option<Vec<f32>> {
        self.vectors.get(&id).cloned()
    }
}

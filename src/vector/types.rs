//! Type-safe wrappers and core types for embedding vectors.
//!
//! Newtypes here keep vector ids, dimensions and distances from being
//! confused with the plain integers and floats they wrap.

use std::num::NonZeroU32;
use thiserror::Error;

/// Dimension of the sentence embeddings produced by the DistilBERT model
/// the claim corpus was built with.
pub const VECTOR_DIMENSION_768: usize = 768;

/// Type-safe wrapper for vector IDs.
///
/// Ids are assigned by the vector store starting at 1 and are never zero,
/// so zero can never be mistaken for a stored vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VectorId(NonZeroU32);

impl VectorId {
    /// Creates a new `VectorId` from a non-zero u32.
    ///
    /// Returns `None` if the provided ID is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Creates a new `VectorId` from a non-zero u32, panicking if zero.
    ///
    /// # Panics
    /// Panics if `id` is zero. Use `new()` for fallible construction.
    #[must_use]
    pub fn new_unchecked(id: u32) -> Self {
        Self(NonZeroU32::new(id).expect("VectorId cannot be zero"))
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.get().to_le_bytes()
    }

    /// Creates from little-endian bytes.
    ///
    /// Returns `None` if the bytes represent zero.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::new(u32::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Euclidean distance between two vectors.
///
/// Always finite and non-negative, which gives it a total order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance(f32);

impl Distance {
    /// Creates a new `Distance` with validation.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if !value.is_finite() {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Distance must be finite",
            });
        }
        if value < 0.0 {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Distance cannot be negative",
            });
        }
        Ok(Self(value))
    }

    /// The distance between a vector and itself.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Contiguous, inclusive span of vector ids.
///
/// Every claim owns exactly one range covering its main-sentence vector and
/// any sub-proposition vectors appended after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorRange {
    start: VectorId,
    end: VectorId,
}

impl VectorRange {
    /// Creates a range, returning `None` when `end` precedes `start`.
    #[must_use]
    pub fn new(start: VectorId, end: VectorId) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Range holding a single id.
    #[must_use]
    pub fn single(id: VectorId) -> Self {
        Self { start: id, end: id }
    }

    #[must_use]
    pub fn start(&self) -> VectorId {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> VectorId {
        self.end
    }

    /// Number of ids in the range; never zero.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.end.get() - self.start.get()) as usize + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn contains(&self, id: VectorId) -> bool {
        self.start <= id && id <= self.end
    }

    #[must_use]
    pub fn overlaps(&self, other: &VectorRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Iterates the ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = VectorId> + use<> {
        (self.start.get()..=self.end.get()).filter_map(VectorId::new)
    }
}

impl std::fmt::Display for VectorRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..={}]", self.start, self.end)
    }
}

/// Type-safe wrapper for vector dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        if dim > u32::MAX as usize {
            return Err(VectorError::InvalidDimension {
                dimension: dim,
                reason: "Vector dimension must fit in 32 bits",
            });
        }
        Ok(Self(dim))
    }

    /// Creates the standard 768-dimensional sentence embedding dimension.
    #[must_use]
    pub const fn dimension_768() -> Self {
        Self(VECTOR_DIMENSION_768)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(VectorError::NonFiniteComponent);
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Vector contains NaN or infinite components\nSuggestion: Check the embedding generator output"
    )]
    NonFiniteComponent,

    #[error("Invalid distance value: {value}\nReason: {reason}")]
    InvalidDistance { value: f32, reason: &'static str },

    #[error("Vector id space exhausted\nSuggestion: Rebuild the vector store into a new data directory")]
    IdExhausted,
}

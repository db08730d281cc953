//! Embedding vector storage and distance primitives.
//!
//! Vectors are appended to a memory-mapped file and addressed by dense,
//! monotonically increasing ids. The ANN index reads them back through the
//! [`VectorSource`] trait when re-ranking candidates.

mod distance;
mod source;
mod storage;
mod types;

pub use distance::{dot, euclidean, norm, squared_euclidean};
pub use source::{InMemoryVectors, VectorSource};
pub use storage::{
    TailReconciliation, VECTOR_FILE_NAME, VectorIter, VectorSnapshot, VectorStorageError,
    VectorStore,
};
pub use types::{
    Distance, VECTOR_DIMENSION_768, VectorDimension, VectorError, VectorId, VectorRange,
};

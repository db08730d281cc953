//! Multi-vector matching.
//!
//! A sentence arrives as several embeddings (the sentence itself plus any
//! propositions extracted from it). Each embedding is queried on its own;
//! a record matches if any one of them lands close enough to any of its
//! vectors.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use crate::ann::{AnnIndex, SearchParams};
use crate::error::MatchResult;
use crate::records::{MisinformationRecord, RecordStore};
use crate::vector::{VectorId, VectorSource};

/// Tunables for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    pub search: SearchParams,
    /// Neighbors farther than this are not matches.
    pub max_distance: f32,
}

/// Turns query embeddings into matched records.
///
/// Holds no state beyond its parameters; the index, vectors and records are
/// passed in so a caller can pin one consistent snapshot of each.
#[derive(Debug, Clone, Copy)]
pub struct MatchingPipeline {
    params: MatchParams,
}

impl MatchingPipeline {
    #[must_use]
    pub fn new(params: MatchParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> MatchParams {
        self.params
    }

    /// Union of vector ids within the distance threshold of any query.
    ///
    /// Every query is dimension-checked before any search runs.
    pub fn candidate_ids<V>(
        &self,
        index: &AnnIndex,
        source: &dyn VectorSource,
        queries: &[V],
    ) -> MatchResult<BTreeSet<VectorId>>
    where
        V: AsRef<[f32]> + Sync,
    {
        for query in queries {
            index.dimension().validate_vector(query.as_ref())?;
        }

        let per_query = queries
            .par_iter()
            .map(|query| index.query(query.as_ref(), self.params.search, source))
            .collect::<Result<Vec<_>, _>>()?;

        let max_distance = self.params.max_distance;
        let ids: BTreeSet<VectorId> = per_query
            .into_iter()
            .flatten()
            .filter(|n| n.distance.get() <= max_distance)
            .map(|n| n.id)
            .collect();

        debug!(
            "{} query vectors matched {} vectors within {max_distance}",
            queries.len(),
            ids.len()
        );
        Ok(ids)
    }

    /// Records owning at least one vector near any of `queries`, each once.
    pub fn match_vectors<V>(
        &self,
        index: &AnnIndex,
        source: &dyn VectorSource,
        records: &RecordStore,
        queries: &[V],
    ) -> MatchResult<Vec<MisinformationRecord>>
    where
        V: AsRef<[f32]> + Sync,
    {
        let ids = self.candidate_ids(index, source, queries)?;
        if ids.is_empty() {
            // Still fails on an uninitialized store
            records.len()?;
            return Ok(Vec::new());
        }
        Ok(records.resolve_by_vector_ids(ids)?)
    }
}

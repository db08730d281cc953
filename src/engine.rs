//! The matching engine: stores, index and pipeline wired together.
//!
//! Opening the engine settles any half-finished ingestion left by a crash,
//! then loads the persisted index or rebuilds it. Ingestion is a two-phase
//! write (stage vectors, append the record, commit vectors) followed by a
//! synchronous rebuild, so a claim is matchable as soon as `ingest` returns.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ann::AnnIndex;
use crate::config::Settings;
use crate::error::{MatchError, MatchResult};
use crate::index::{IndexHandle, IndexStats, LoadOutcome};
use crate::ingest::NewClaim;
use crate::matching::{MatchParams, MatchingPipeline, SentenceEmbeddings, SentenceMatches};
use crate::records::{ClaimMatch, RecordId, RecordStore};
use crate::vector::{
    TailReconciliation, VectorDimension, VectorRange, VectorSnapshot, VectorStore,
};

/// Result of a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub record_id: RecordId,
    pub vector_range: VectorRange,
}

/// Summary of the engine's on-disk and in-memory state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub data_dir: PathBuf,
    pub dimension: usize,
    pub vectors: usize,
    pub staged_vectors: usize,
    pub records: usize,
    pub index: IndexStats,
}

/// Owns every component needed to ingest claims and match sentences.
#[derive(Debug)]
pub struct MatchingEngine {
    data_dir: PathBuf,
    dimension: VectorDimension,
    vectors: VectorStore,
    records: RecordStore,
    index: IndexHandle,
    pipeline: MatchingPipeline,
    ingest_lock: Mutex<()>,
}

impl MatchingEngine {
    /// Opens (or creates) the stores under `settings.data_dir` and makes an
    /// index available.
    pub fn open(settings: &Settings) -> MatchResult<Self> {
        settings.validate()?;
        let matching = &settings.matching;
        let dimension = matching.dimension()?;
        let data_dir = settings.data_dir.clone();

        let vectors = VectorStore::open_or_create(&data_dir, dimension)?;
        let records = RecordStore::open(&data_dir)?;

        let reconciliation = vectors.reconcile_tail(records.last_vector_id()?)?;
        log_reconciliation(&reconciliation);

        let index_path = settings.index.persist.then(|| settings.index_path());
        let index = IndexHandle::new(
            dimension,
            matching.build_params(),
            settings.index.query_during_rebuild,
            index_path,
        );
        match index.load_or_build(&vectors.snapshot())? {
            LoadOutcome::Loaded => debug!("Using persisted index"),
            LoadOutcome::Rebuilt(reason) => debug!("Index rebuilt at open: {reason}"),
        }

        let pipeline = MatchingPipeline::new(MatchParams {
            search: matching.search_params(),
            max_distance: matching.max_distance_threshold,
        });

        info!(
            "Matching engine ready: {} records, {} vectors in {}",
            records.len()?,
            vectors.len(),
            data_dir.display()
        );

        Ok(Self {
            data_dir,
            dimension,
            vectors,
            records,
            index,
            pipeline,
            ingest_lock: Mutex::new(()),
        })
    }

    /// Adds a claim and rebuilds the index before returning.
    ///
    /// Nothing is written unless every vector has the configured dimension.
    /// If the record cannot be registered, the staged vectors are discarded
    /// and the store is left as it was. Once the record is durable the claim
    /// is never rolled back: if its vectors or the index cannot be brought
    /// up to date, [`MatchError::IngestIncomplete`] is returned and the next
    /// ingest, rebuild or open finishes the job.
    pub fn ingest(&self, claim: &NewClaim) -> MatchResult<IngestReceipt> {
        claim.validate(self.dimension)?;
        let claim_text = claim.normalized_text();

        let _writer = self.ingest_lock.lock();
        self.settle_tail()?;

        let range = self.vectors.stage(claim.vectors.as_slice())?;
        let record_id = match self.records.append(
            &claim_text,
            &claim.source_link,
            &claim.corrective_info,
            range,
        ) {
            Ok(id) => id,
            Err(e) => {
                if let Err(rollback) = self.vectors.rollback(range) {
                    warn!("Failed to roll back staged vectors {range}: {rollback}");
                }
                return Err(MatchError::IngestRolledBack {
                    cause: e.to_string(),
                });
            }
        };
        if let Err(e) = self.vectors.commit(range) {
            warn!("Committing vectors {range} of claim {record_id} failed: {e}");
            // The record owns the range, so the tail is published, never dropped
            if let Err(retry) = self.settle_tail() {
                return Err(MatchError::IngestIncomplete {
                    record_id,
                    cause: retry.to_string(),
                });
            }
        }

        info!(
            "Ingested claim {record_id} with {} vectors {range}",
            range.len()
        );

        self.index.mark_stale();
        if let Err(e) = self.index.rebuild(&self.vectors.snapshot()) {
            return Err(MatchError::IngestIncomplete {
                record_id,
                cause: e.to_string(),
            });
        }

        Ok(IngestReceipt {
            record_id,
            vector_range: range,
        })
    }

    /// Claims matched by any of `embeddings`, each once.
    pub fn match_vectors<V>(&self, embeddings: &[V]) -> MatchResult<Vec<ClaimMatch>>
    where
        V: AsRef<[f32]> + Sync,
    {
        let index = self.index.snapshot()?;
        self.match_with(&index, &self.vectors.snapshot(), embeddings)
    }

    /// Matches each sentence independently, keeping only sentences that hit
    /// at least one claim, in input order.
    ///
    /// Every sentence is matched against the same index and vector snapshot,
    /// taken once before the batch fans out.
    pub fn match_sentences(
        &self,
        sentences: &[SentenceEmbeddings],
    ) -> MatchResult<Vec<SentenceMatches>> {
        let index = self.index.snapshot()?;
        let source = self.vectors.snapshot();
        let matched = sentences
            .par_iter()
            .map(|s| {
                self.match_with(&index, &source, s.embeddings.as_slice())
                    .map(|results| SentenceMatches {
                        sentence: s.sentence.clone(),
                        results,
                    })
            })
            .collect::<MatchResult<Vec<_>>>()?;

        Ok(matched.into_iter().filter(|m| !m.results.is_empty()).collect())
    }

    /// Rebuilds the index from the current vector store.
    ///
    /// Vectors left staged by a failed ingestion are settled first.
    pub fn rebuild_index(&self) -> MatchResult<IndexStats> {
        let _writer = self.ingest_lock.lock();
        self.settle_tail()?;
        self.index.rebuild(&self.vectors.snapshot())?;
        Ok(self.index.stats())
    }


    pub fn status(&self) -> MatchResult<EngineStatus> {
        Ok(EngineStatus {
            data_dir: self.data_dir.clone(),
            dimension: self.dimension.get(),
            vectors: self.vectors.len(),
            staged_vectors: self.vectors.staged_len(),
            records: self.records.len()?,
            index: self.index.stats(),
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    #[must_use]
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    #[must_use]
    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    fn match_with<V>(
        &self,
        index: &AnnIndex,
        source: &VectorSnapshot,
        embeddings: &[V],
    ) -> MatchResult<Vec<ClaimMatch>>
    where
        V: AsRef<[f32]> + Sync,
    {
        let records = self
            .pipeline
            .match_vectors(index, source, &self.records, embeddings)?;

        let mut matches: Vec<ClaimMatch> = Vec::with_capacity(records.len());
        for record in records {
            let claim = ClaimMatch::from(record);
            if !matches.contains(&claim) {
                matches.push(claim);
            }
        }
        Ok(matches)
    }

    /// Publishes staged vectors a durable record owns and drops the rest.
    /// Callers hold the ingest lock.
    fn settle_tail(&self) -> MatchResult<()> {
        if self.vectors.staged_len() == 0 {
            return Ok(());
        }
        let reconciliation = self.vectors.reconcile_tail(self.records.last_vector_id()?)?;
        log_reconciliation(&reconciliation);
        Ok(())
    }
}

fn log_reconciliation(outcome: &TailReconciliation) {
    if let Some(range) = outcome.committed {
        warn!("Recovered vectors {range} owned by a record from an interrupted ingestion");
    }
    if let Some(range) = outcome.discarded {
        warn!("Discarded orphaned vectors {range} from an interrupted ingestion");
    }
}

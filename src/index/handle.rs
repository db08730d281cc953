//! Process-wide holder of the active forest.
//!
//! Queries grab an `Arc` to whichever forest is current and keep it for their
//! whole run; a rebuild constructs a new forest off to the side and swaps the
//! pointer in one step. Nobody ever sees a half-built tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use tracing::{info, warn};

use crate::ann::{AnnError, AnnIndex, BuildParams, build_index};
use crate::config::QueryDuringRebuild;
use crate::error::{MatchError, MatchResult};
use crate::vector::{VectorDimension, VectorSnapshot};

/// Why [`IndexHandle::load_or_build`] built instead of loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// No index file was configured or none existed yet.
    Missing,
    /// The file failed validation.
    Corrupt(String),
    /// The file covers a different set of vectors than the store holds.
    Stale { indexed: u64, stored: u64 },
    /// Tree count, leaf capacity or the configured seed changed since the
    /// file was written.
    ParamsChanged,
}

impl std::fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "no index file"),
            Self::Corrupt(reason) => write!(f, "corrupt index: {reason}"),
            Self::Stale { indexed, stored } => {
                write!(f, "index covers {indexed} vectors, store holds {stored}")
            }
            Self::ParamsChanged => write!(f, "build parameters changed"),
        }
    }
}

/// What [`IndexHandle::load_or_build`] ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Rebuilt(RebuildReason),
}

/// Point-in-time view of the handle for status output.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexStats {
    pub loaded: bool,
    pub tree_count: usize,
    pub indexed_vectors: u64,
    pub stale: bool,
    pub rebuilding: bool,
    pub rebuilds: u64,
}

/// Atomically swappable reference to the active [`AnnIndex`].
#[derive(Debug)]
pub struct IndexHandle {
    current: ArcSwapOption<AnnIndex>,
    /// Held for writing for the whole of a rebuild. Readers only touch it
    /// under [`QueryDuringRebuild::Wait`].
    gate: RwLock<()>,
    rebuilding: AtomicBool,
    stale: AtomicBool,
    rebuilds: AtomicU64,
    dimension: VectorDimension,
    params: BuildParams,
    policy: QueryDuringRebuild,
    index_path: Option<PathBuf>,
}

impl IndexHandle {
    /// An unloaded handle. `index_path` enables persisting and loading.
    #[must_use]
    pub fn new(
        dimension: VectorDimension,
        params: BuildParams,
        policy: QueryDuringRebuild,
        index_path: Option<PathBuf>,
    ) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            gate: RwLock::new(()),
            rebuilding: AtomicBool::new(false),
            stale: AtomicBool::new(false),
            rebuilds: AtomicU64::new(0),
            dimension,
            params,
            policy,
            index_path,
        }
    }

    /// The forest queries should run against.
    ///
    /// Under [`QueryDuringRebuild::Wait`] this blocks while a rebuild is
    /// running and then returns the new forest. Called from a rayon worker,
    /// the wait helps run pending pool jobs instead of parking the thread.
    pub fn snapshot(&self) -> MatchResult<Arc<AnnIndex>> {
        if self.policy == QueryDuringRebuild::Wait {
            let _gate = self.wait_for_rebuild();
            return self.current.load_full().ok_or(MatchError::IndexUnavailable);
        }
        self.current.load_full().ok_or(MatchError::IndexUnavailable)
    }

    /// Takes the rebuild gate for reading.
    ///
    /// A rebuild builds its trees on the global rayon pool, so a worker
    /// parked on the gate could starve the rebuild it is waiting for.
    fn wait_for_rebuild(&self) -> RwLockReadGuard<'_, ()> {
        if rayon::current_thread_index().is_none() {
            return self.gate.read();
        }
        loop {
            if let Some(guard) = self.gate.try_read() {
                return guard;
            }
            if !matches!(rayon::yield_now(), Some(rayon::Yield::Executed)) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Flags the current forest as out of date with the store.
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn policy(&self) -> QueryDuringRebuild {
        self.policy
    }

    #[must_use]
    pub fn index_path(&self) -> Option<&Path> {
        self.index_path.as_deref()
    }

    /// Puts `index` in place without building or persisting anything.
    pub fn install(&self, index: AnnIndex) -> Result<Arc<AnnIndex>, AnnError> {
        if index.dimension() != self.dimension {
            return Err(AnnError::corrupt(format!(
                "index dimension {} does not match configured {}",
                index.dimension(),
                self.dimension
            )));
        }
        let index = Arc::new(index);
        self.current.store(Some(Arc::clone(&index)));
        self.stale.store(false, Ordering::Release);
        Ok(index)
    }

    /// Builds a fresh forest over `vectors` and swaps it in.
    ///
    /// Queries already holding the old forest keep it. A failure to persist
    /// the new forest is logged and does not fail the rebuild.
    pub fn rebuild(&self, vectors: &VectorSnapshot) -> Result<Arc<AnnIndex>, AnnError> {
        let _gate = self.gate.write();
        self.rebuilding.store(true, Ordering::Release);
        let started = Instant::now();

        let built = build_index(self.dimension, vectors.iter(), &self.params);
        self.rebuilding.store(false, Ordering::Release);
        let index = Arc::new(built?);

        self.current.store(Some(Arc::clone(&index)));
        self.stale.store(false, Ordering::Release);
        let generation = self.rebuilds.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            "Swapped in rebuilt index #{generation} over {} vectors in {:.2?}",
            index.vector_count(),
            started.elapsed()
        );

        if let Some(path) = &self.index_path {
            if let Err(e) = index.save(path) {
                warn!("Rebuilt index is active but could not be persisted: {e}");
            }
        }
        Ok(index)
    }

    /// Loads the persisted forest, falling back to a rebuild when it is
    /// missing, corrupt, or out of step with `vectors`.
    pub fn load_or_build(&self, vectors: &VectorSnapshot) -> Result<LoadOutcome, AnnError> {
        let reason = match self.try_load(vectors) {
            Ok(index) => {
                self.install(index)?;
                return Ok(LoadOutcome::Loaded);
            }
            Err(reason) => reason,
        };

        match &reason {
            RebuildReason::Missing => info!("Building index: {reason}"),
            _ => warn!("Rebuilding index: {reason}"),
        }
        self.rebuild(vectors)?;
        Ok(LoadOutcome::Rebuilt(reason))
    }

    fn try_load(&self, vectors: &VectorSnapshot) -> Result<AnnIndex, RebuildReason> {
        let path = match &self.index_path {
            Some(path) if path.exists() => path,
            _ => return Err(RebuildReason::Missing),
        };

        let index = AnnIndex::load(path, self.dimension).map_err(|e| match e {
            AnnError::CorruptIndex { reason } => RebuildReason::Corrupt(reason),
            other => RebuildReason::Corrupt(other.to_string()),
        })?;

        let stored = vectors.len() as u64;
        if index.vector_count() != stored || index.max_vector_id() != vectors.last_id() {
            return Err(RebuildReason::Stale {
                indexed: index.vector_count(),
                stored,
            });
        }
        if index.tree_count() != self.params.tree_count
            || index.leaf_capacity() != self.params.leaf_capacity
            || self.params.seed.is_some_and(|seed| seed != index.seed())
        {
            return Err(RebuildReason::ParamsChanged);
        }

        info!(
            "Loaded index with {} trees over {stored} vectors from {}",
            index.tree_count(),
            path.display()
        );
        Ok(index)
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let current = self.current.load_full();
        IndexStats {
            loaded: current.is_some(),
            tree_count: current.as_ref().map_or(0, |i| i.tree_count()),
            indexed_vectors: current.as_ref().map_or(0, |i| i.vector_count()),
            stale: self.is_stale(),
            rebuilding: self.rebuilding.load(Ordering::Acquire),
            rebuilds: self.rebuilds.load(Ordering::Acquire),
        }
    }
}

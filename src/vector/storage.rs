//! Durable append-only storage for embedding vectors.
//!
//! Vectors live in a single file read through a memory map. Ids are dense:
//! the vector with id `n` sits at slot `n - 1`, so lookups are a single
//! offset computation.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic, version, dimension, committed vector count
//! - Entries: vector id (u32) followed by `dimension` f32 values, all
//!   little-endian
//!
//! # Commit Protocol
//!
//! Appends are two-phase. [`VectorStore::stage`] writes entries past the
//! committed tail and syncs them, but readers only ever see the first
//! `committed count` entries. [`VectorStore::commit`] publishes the tail by
//! rewriting the header count; [`VectorStore::rollback`] truncates it. A
//! tail left behind by a crash is settled by [`VectorStore::reconcile_tail`].

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::vector::source::VectorSource;
use crate::vector::types::{VectorDimension, VectorError, VectorId, VectorRange};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Byte offset of the committed count inside the header.
const COUNT_OFFSET: u64 = 12;

/// Magic bytes to identify vector storage files.
const MAGIC_BYTES: &[u8; 4] = b"MVEC";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Number of bytes per vector ID (u32).
const BYTES_PER_ID: usize = 4;

/// File name of the vector store inside the data directory.
pub const VECTOR_FILE_NAME: &str = "vectors.vec";

/// Errors specific to vector storage operations.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error: {0}\nSuggestion: Check disk space and file permissions")]
    Io(#[from] io::Error),

    #[error("Invalid storage format: {0}\nSuggestion: The vector file may be corrupted")]
    InvalidFormat(String),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Migrate the storage format or use a compatible version"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error(
        "Stored vectors have dimension {stored}, configuration expects {configured}\nSuggestion: Point data_dir at a store built with the same embedding model"
    )]
    StoredDimensionMismatch { stored: usize, configured: usize },

    #[error("Cannot stage an empty batch of vectors")]
    EmptyBatch,

    #[error("Staging conflict: {0}\nSuggestion: Commit or roll back the pending batch first")]
    StagingConflict(String),
}

/// Result of settling a staged tail found on disk at startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TailReconciliation {
    /// Staged vectors owned by a record that were published.
    pub committed: Option<VectorRange>,
    /// Staged vectors owned by nothing that were truncated.
    pub discarded: Option<VectorRange>,
}

impl TailReconciliation {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.committed.is_none() && self.discarded.is_none()
    }
}

/// Mutable writer state, guarded by the store's writer lock.
#[derive(Debug)]
struct Writer {
    file: File,
    committed: u32,
    staged: u32,
}

/// Read-only view of the committed vectors.
///
/// Snapshots are cheap to clone and stay valid while new vectors are being
/// appended; they simply do not see anything committed after they were taken.
#[derive(Clone)]
pub struct VectorSnapshot {
    mmap: Arc<Mmap>,
    count: u32,
    dimension: VectorDimension,
}

impl VectorSnapshot {
    /// Number of vectors visible in this snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Highest id visible in this snapshot.
    #[must_use]
    pub fn last_id(&self) -> Option<VectorId> {
        VectorId::new(self.count)
    }

    /// Iterates all `(id, vector)` pairs in id order.
    ///
    /// Each call starts a fresh pass over the snapshot.
    pub fn iter(&self) -> VectorIter<'_> {
        VectorIter {
            snapshot: self,
            next: 1,
        }
    }

    fn entry_size(&self) -> usize {
        entry_size(self.dimension)
    }

    fn read_slot(&self, id: u32) -> Option<Vec<f32>> {
        if id == 0 || id > self.count {
            return None;
        }
        let entry = self.entry_size();
        let offset = HEADER_SIZE + (id as usize - 1) * entry;
        let bytes = self.mmap.get(offset..offset + entry)?;

        let stored_id = u32::from_le_bytes(bytes[..BYTES_PER_ID].try_into().ok()?);
        if stored_id != id {
            warn!("Vector slot {id} holds id {stored_id}; treating as missing");
            return None;
        }

        Some(decode_vector(&bytes[BYTES_PER_ID..]))
    }
}

impl VectorSource for VectorSnapshot {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn vector(&self, id: VectorId) -> Option<Vec<f32>> {
        self.read_slot(id.get())
    }
}

impl std::fmt::Debug for VectorSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorSnapshot")
            .field("count", &self.count)
            .field("dimension", &self.dimension)
            .finish()
    }
}

/// Lazy iterator over a [`VectorSnapshot`].
pub struct VectorIter<'a> {
    snapshot: &'a VectorSnapshot,
    next: u32,
}

impl Iterator for VectorIter<'_> {
    type Item = (VectorId, Vec<f32>);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next <= self.snapshot.count {
            let id = self.next;
            self.next += 1;
            if let Some(vector) = self.snapshot.read_slot(id) {
                return Some((VectorId::new(id)?, vector));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.snapshot.count + 1).saturating_sub(self.next) as usize;
        (0, Some(remaining))
    }
}

/// Durable, append-only vector store.
///
/// Writes are serialized by an internal lock; reads go through snapshots and
/// never block on writers.
pub struct VectorStore {
    path: PathBuf,
    dimension: VectorDimension,
    writer: Mutex<Writer>,
    snapshot: RwLock<VectorSnapshot>,
    /// Number of upcoming header count writes to fail.
    #[cfg(test)]
    failing_publishes: std::sync::atomic::AtomicU32,
}

impl VectorStore {
    /// Opens the store in `dir`, creating an empty one if none exists.
    ///
    /// Fails if an existing file was written with a different dimension.
    pub fn open_or_create(
        dir: impl AsRef<Path>,
        dimension: VectorDimension,
    ) -> Result<Self, VectorStorageError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(VECTOR_FILE_NAME);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.metadata()?.len() == 0 {
            write_header(&mut file, dimension, 0)?;
            file.sync_all()?;
            info!("Created vector store at {}", path.display());
        }

        let mmap = map_file(&file)?;
        let (stored_dimension, committed) = read_header(&mmap)?;
        if stored_dimension != dimension {
            return Err(VectorStorageError::StoredDimensionMismatch {
                stored: stored_dimension.get(),
                configured: dimension.get(),
            });
        }

        let entry = entry_size(dimension);
        let committed_end = HEADER_SIZE + committed as usize * entry;
        if mmap.len() < committed_end {
            return Err(VectorStorageError::InvalidFormat(format!(
                "header claims {committed} vectors but file holds only {} bytes",
                mmap.len()
            )));
        }
        let staged = ((mmap.len() - committed_end) / entry) as u32;
        if staged > 0 {
            debug!("Found {staged} staged vectors past the committed tail");
        }

        info!(
            "Opened vector store at {} ({committed} vectors, dimension {dimension})",
            path.display()
        );

        Ok(Self {
            path,
            dimension,
            writer: Mutex::new(Writer {
                file,
                committed,
                staged,
            }),
            snapshot: RwLock::new(VectorSnapshot {
                mmap: Arc::new(mmap),
                count: committed,
                dimension,
            }),
            #[cfg(test)]
            failing_publishes: std::sync::atomic::AtomicU32::new(0),
        })
    }

    /// Appends a single vector and commits it.
    ///
    /// Returns the fresh id. On failure nothing becomes visible.
    pub fn append(&self, vector: &[f32]) -> Result<VectorId, VectorStorageError> {
        let range = self.stage(&[vector])?;
        if let Err(e) = self.commit(range) {
            if let Err(rollback) = self.rollback(range) {
                warn!("Failed to roll back staged vectors {range}: {rollback}");
            }
            return Err(e);
        }
        Ok(range.start())
    }

    /// Writes `vectors` past the committed tail without publishing them.
    ///
    /// Only one batch may be staged at a time.
    pub fn stage<V: AsRef<[f32]>>(
        &self,
        vectors: &[V],
    ) -> Result<VectorRange, VectorStorageError> {
        if vectors.is_empty() {
            return Err(VectorStorageError::EmptyBatch);
        }
        for vector in vectors {
            self.dimension.validate_vector(vector.as_ref())?;
        }

        let mut writer = self.writer.lock();
        if writer.staged > 0 {
            return Err(VectorStorageError::StagingConflict(format!(
                "{} vectors are already staged",
                writer.staged
            )));
        }

        let count = u32::try_from(vectors.len()).map_err(|_| VectorError::IdExhausted)?;
        let first = writer
            .committed
            .checked_add(1)
            .ok_or(VectorError::IdExhausted)?;
        let last = writer
            .committed
            .checked_add(count)
            .ok_or(VectorError::IdExhausted)?;

        let committed_end = self.byte_len(writer.committed);
        // Drop any torn bytes left by an interrupted write.
        writer.file.set_len(committed_end)?;
        writer.file.seek(SeekFrom::Start(committed_end))?;

        {
            let mut out = BufWriter::new(&writer.file);
            for (offset, vector) in vectors.iter().enumerate() {
                out.write_all(&(first + offset as u32).to_le_bytes())?;
                for &value in vector.as_ref() {
                    out.write_all(&value.to_le_bytes())?;
                }
            }
            out.flush()?;
        }
        writer.file.sync_data()?;
        writer.staged = count;

        let range = VectorRange::new(VectorId::new_unchecked(first), VectorId::new_unchecked(last))
            .ok_or_else(|| VectorStorageError::InvalidFormat("empty staged range".to_string()))?;
        debug!("Staged vectors {range}");
        Ok(range)
    }

    /// Publishes a staged batch, making it visible to new snapshots.
    pub fn commit(&self, range: VectorRange) -> Result<(), VectorStorageError> {
        let mut writer = self.writer.lock();
        Self::check_staged(&writer, range)?;

        let new_count = writer.committed + writer.staged;
        self.publish_count(&mut writer, new_count)?;
        writer.committed = new_count;
        writer.staged = 0;

        self.remap(&writer)?;
        debug!("Committed vectors {range}");
        Ok(())
    }

    /// Discards a staged batch.
    pub fn rollback(&self, range: VectorRange) -> Result<(), VectorStorageError> {
        let mut writer = self.writer.lock();
        Self::check_staged(&writer, range)?;

        writer.file.set_len(self.byte_len(writer.committed))?;
        writer.file.sync_data()?;
        writer.staged = 0;
        warn!("Rolled back staged vectors {range}");
        Ok(())
    }

    /// Settles a staged tail left behind by an interrupted ingestion.
    ///
    /// `owned_through` is the highest vector id any durable record claims.
    /// Staged vectors up to it are committed; anything after it is dropped.
    pub fn reconcile_tail(
        &self,
        owned_through: Option<VectorId>,
    ) -> Result<TailReconciliation, VectorStorageError> {
        let mut writer = self.writer.lock();
        let owned = owned_through.map_or(0, |id| id.get());
        let available = writer.committed + writer.staged;

        if owned > available {
            return Err(VectorStorageError::InvalidFormat(format!(
                "records reference vector {owned} but only {available} vectors exist"
            )));
        }

        let mut outcome = TailReconciliation::default();

        if owned > writer.committed {
            let start = VectorId::new_unchecked(writer.committed + 1);
            let end = VectorId::new_unchecked(owned);
            self.publish_count(&mut writer, owned)?;
            outcome.committed = VectorRange::new(start, end);
            let published = owned - writer.committed;
            writer.staged -= published;
            writer.committed = owned;
        }

        let file_len = writer.file.metadata()?.len();
        if writer.staged > 0 || file_len > self.byte_len(writer.committed) {
            if writer.staged > 0 {
                outcome.discarded = VectorRange::new(
                    VectorId::new_unchecked(writer.committed + 1),
                    VectorId::new_unchecked(writer.committed + writer.staged),
                );
            }
            writer.file.set_len(self.byte_len(writer.committed))?;
            writer.file.sync_data()?;
            writer.staged = 0;
        }

        if !outcome.is_clean() {
            warn!(
                "Reconciled vector tail: committed {:?}, discarded {:?}",
                outcome.committed, outcome.discarded
            );
        }
        self.remap(&writer)?;
        Ok(outcome)
    }

    /// Returns a read-only view of all committed vectors.
    #[must_use]
    pub fn snapshot(&self) -> VectorSnapshot {
        self.snapshot.read().clone()
    }

    /// Lazily iterable view of every committed vector.
    #[must_use]
    pub fn get_all(&self) -> VectorSnapshot {
        self.snapshot()
    }

    /// Number of committed vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writer.lock().committed as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of vectors written but not yet committed.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.writer.lock().staged as usize
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes the next `count` commits fail before touching the header.
    #[cfg(test)]
    pub(crate) fn fail_next_publishes(&self, count: u32) {
        self.failing_publishes
            .store(count, std::sync::atomic::Ordering::SeqCst);
    }

    // Private helper methods

    /// Durably rewrites the committed count in the header.
    fn publish_count(&self, writer: &mut Writer, count: u32) -> Result<(), io::Error> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let armed = self
                .failing_publishes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if armed {
                return Err(io::Error::other("header write failed"));
            }
        }
        update_header_count(&mut writer.file, count)?;
        writer.file.sync_data()
    }

    fn byte_len(&self, count: u32) -> u64 {
        (HEADER_SIZE + count as usize * entry_size(self.dimension)) as u64
    }

    fn check_staged(writer: &Writer, range: VectorRange) -> Result<(), VectorStorageError> {
        let expected_start = writer.committed + 1;
        if writer.staged == 0
            || range.start().get() != expected_start
            || range.len() != writer.staged as usize
        {
            return Err(VectorStorageError::StagingConflict(format!(
                "range {range} does not match the staged tail ({} vectors after {})",
                writer.staged, writer.committed
            )));
        }
        Ok(())
    }

    fn remap(&self, writer: &Writer) -> Result<(), VectorStorageError> {
        let mmap = map_file(&writer.file)?;
        *self.snapshot.write() = VectorSnapshot {
            mmap: Arc::new(mmap),
            count: writer.committed,
            dimension: self.dimension,
        };
        Ok(())
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.writer.try_lock() {
            Some(writer) => f
                .debug_struct("VectorStore")
                .field("path", &self.path)
                .field("dimension", &self.dimension)
                .field("committed", &writer.committed)
                .field("staged", &writer.staged)
                .finish(),
            None => write!(f, "VectorStore {{ path: {:?}, <locked> }}", self.path),
        }
    }
}

fn entry_size(dimension: VectorDimension) -> usize {
    BYTES_PER_ID + dimension.get() * BYTES_PER_F32
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_F32)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn map_file(file: &File) -> Result<Mmap, io::Error> {
    // The file is only ever appended to or truncated past the committed
    // region, and readers never touch bytes beyond it.
    unsafe { MmapOptions::new().map(file) }
}

fn write_header(file: &mut File, dimension: VectorDimension, count: u32) -> Result<(), io::Error> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(MAGIC_BYTES)?;
    file.write_all(&STORAGE_VERSION.to_le_bytes())?;
    file.write_all(&(dimension.get() as u32).to_le_bytes())?;
    file.write_all(&count.to_le_bytes())?;
    file.flush()
}

fn update_header_count(file: &mut File, count: u32) -> Result<(), io::Error> {
    file.seek(SeekFrom::Start(COUNT_OFFSET))?;
    file.write_all(&count.to_le_bytes())?;
    file.flush()
}

fn read_header(bytes: &[u8]) -> Result<(VectorDimension, u32), VectorStorageError> {
    if bytes.len() < HEADER_SIZE {
        return Err(VectorStorageError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }

    if &bytes[0..4] != MAGIC_BYTES {
        return Err(VectorStorageError::InvalidFormat(
            "Invalid magic bytes".to_string(),
        ));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != STORAGE_VERSION {
        return Err(VectorStorageError::VersionMismatch {
            expected: STORAGE_VERSION,
            actual: version,
        });
    }

    let dim_value = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let dimension = VectorDimension::new(dim_value as usize)?;
    let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    Ok((dimension, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dim(n: usize) -> VectorDimension {
        VectorDimension::new(n).unwrap()
    }

    #[test]
    fn test_append_assigns_monotonic_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();

        let a = store.append(&[0.0, 0.0]).unwrap();
        let b = store.append(&[1.0, 1.0]).unwrap();
        let c = store.append(&[10.0, 10.0]).unwrap();

        assert_eq!((a.get(), b.get(), c.get()), (1, 2, 3));
        assert_eq!(store.len(), 3);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.vector(b), Some(vec![1.0, 1.0]));
        assert_eq!(snapshot.vector(VectorId::new_unchecked(4)), None);
    }

    #[test]
    fn test_get_all_is_restartable() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(3)).unwrap();
        store.append(&[1.0, 2.0, 3.0]).unwrap();
        store.append(&[4.0, 5.0, 6.0]).unwrap();

        let all = store.get_all();
        let first: Vec<_> = all.iter().collect();
        let second: Vec<_> = all.iter().collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                (VectorId::new_unchecked(1), vec![1.0, 2.0, 3.0]),
                (VectorId::new_unchecked(2), vec![4.0, 5.0, 6.0]),
            ]
        );
    }

    #[test]
    fn test_dimension_validation() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(3)).unwrap();

        let result = store.append(&[1.0, 2.0]);
        assert!(matches!(
            result,
            Err(VectorStorageError::Vector(VectorError::DimensionMismatch { .. }))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_staged_vectors_invisible_until_commit() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
        store.append(&[0.0, 0.0]).unwrap();

        let range = store.stage(&[vec![1.0, 1.0], vec![2.0, 2.0]]).unwrap();
        assert_eq!((range.start().get(), range.end().get()), (2, 3));
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot().vector(range.start()), None);

        // A second batch cannot be staged on top of the first
        assert!(matches!(
            store.stage(&[vec![3.0, 3.0]]),
            Err(VectorStorageError::StagingConflict(_))
        ));

        store.commit(range).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.snapshot().vector(range.end()), Some(vec![2.0, 2.0]));
    }

    #[test]
    fn test_rollback_discards_staged_vectors() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
        store.append(&[0.0, 0.0]).unwrap();

        let range = store.stage(&[vec![1.0, 1.0]]).unwrap();
        store.rollback(range).unwrap();
        assert_eq!(store.staged_len(), 0);

        // Rolled-back ids were never visible, the next append takes the slot
        let id = store.append(&[5.0, 5.0]).unwrap();
        assert_eq!(id.get(), 2);
        assert_eq!(store.snapshot().vector(id), Some(vec![5.0, 5.0]));
    }

    #[test]
    fn test_failed_append_commit_leaves_store_usable() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
        store.append(&[0.0, 0.0]).unwrap();

        store.fail_next_publishes(1);
        assert!(matches!(
            store.append(&[1.0, 1.0]),
            Err(VectorStorageError::Io(_))
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.staged_len(), 0);

        // The failed slot is reused by the next append
        let id = store.append(&[2.0, 2.0]).unwrap();
        assert_eq!(id.get(), 2);
        assert_eq!(store.snapshot().vector(id), Some(vec![2.0, 2.0]));
    }

    #[test]
    fn test_reconcile_settles_tail_after_failed_commit() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();

        let range = store.stage(&[vec![1.0, 1.0], vec![2.0, 2.0]]).unwrap();
        store.fail_next_publishes(1);
        assert!(store.commit(range).is_err());
        assert_eq!(store.staged_len(), 2);

        let outcome = store.reconcile_tail(Some(range.end())).unwrap();
        assert_eq!(outcome.committed, Some(range));
        assert_eq!(store.len(), 2);
        assert_eq!(store.staged_len(), 0);
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
            store.append(&[1.0, 2.0]).unwrap();
            store.append(&[3.0, 4.0]).unwrap();
        }

        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
        assert_eq!(store.len(), 2);
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.vector(VectorId::new_unchecked(2)),
            Some(vec![3.0, 4.0])
        );
    }

    #[test]
    fn test_reopen_with_other_dimension_fails() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
            store.append(&[1.0, 2.0]).unwrap();
        }

        let result = VectorStore::open_or_create(temp_dir.path(), dim(4));
        assert!(matches!(
            result,
            Err(VectorStorageError::StoredDimensionMismatch {
                stored: 2,
                configured: 4
            })
        ));
    }

    #[test]
    fn test_reconcile_commits_owned_tail_and_drops_the_rest() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
            store.append(&[0.0, 0.0]).unwrap();
            // Simulate a crash after staging three vectors
            store
                .stage(&[vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]])
                .unwrap();
        }

        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.staged_len(), 3);

        let outcome = store
            .reconcile_tail(Some(VectorId::new_unchecked(3)))
            .unwrap();
        assert_eq!(
            outcome.committed.map(|r| (r.start().get(), r.end().get())),
            Some((2, 3))
        );
        assert_eq!(
            outcome.discarded.map(|r| (r.start().get(), r.end().get())),
            Some((4, 4))
        );
        assert_eq!(store.len(), 3);
        assert_eq!(store.staged_len(), 0);
        assert_eq!(
            store.snapshot().vector(VectorId::new_unchecked(3)),
            Some(vec![2.0, 2.0])
        );
    }

    #[test]
    fn test_reconcile_rejects_records_beyond_data() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
        store.append(&[0.0, 0.0]).unwrap();

        let result = store.reconcile_tail(Some(VectorId::new_unchecked(5)));
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));
    }

    #[test]
    fn test_clean_reconcile_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(2)).unwrap();
        store.append(&[0.0, 0.0]).unwrap();

        let outcome = store
            .reconcile_tail(Some(VectorId::new_unchecked(1)))
            .unwrap();
        assert!(outcome.is_clean());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_survives_later_appends() {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open_or_create(temp_dir.path(), dim(1)).unwrap();
        store.append(&[1.0]).unwrap();

        let before = store.snapshot();
        store.append(&[2.0]).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before.iter().count(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }
}

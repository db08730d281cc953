//! Durable store of misinformation records keyed by vector-id range.
//!
//! Records are appended to a log file as length-prefixed `bincode` frames and
//! mirrored in memory as a vector sorted by range start. Because ranges are
//! checked at append time to never overlap, resolving a vector id to its
//! owning record is a single binary search.
//!
//! # Log Format
//!
//! - Header (8 bytes): magic `MREC`, format version (u32 LE)
//! - Frames: payload length (u32 LE) followed by the encoded record
//!
//! A frame cut short by a crash is dropped on the next initialization. Any
//! other undecodable frame is reported as corruption and nothing is dropped.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::records::types::{MisinformationRecord, RecordId};
use crate::vector::{VectorId, VectorRange};

/// Current log format version.
const LOG_VERSION: u32 = 1;

/// Magic bytes to identify record log files.
const MAGIC_BYTES: &[u8; 4] = b"MREC";

const HEADER_SIZE: u64 = 8;

/// File name of the record log inside the data directory.
pub const RECORD_FILE_NAME: &str = "records.log";

/// Errors specific to record storage.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error(
        "Record store at '{path}' has not been initialized\nSuggestion: Call initialize() before reading or writing records"
    )]
    NotInitialized { path: PathBuf },

    #[error("IO error: {0}\nSuggestion: Check disk space and file permissions")]
    Io(#[from] io::Error),

    #[error("Record log is corrupted: {0}\nSuggestion: Restore the record log from a backup")]
    Corrupt(String),

    #[error(
        "Vector range {range} overlaps range {existing_range} of record {existing}\nSuggestion: Ranges must come from a single fresh vector append"
    )]
    OverlappingRange {
        range: VectorRange,
        existing: RecordId,
        existing_range: VectorRange,
    },

    #[error(
        "Vector range {range} starts before the last registered range ends at {last_end}\nSuggestion: Register records in vector-id order"
    )]
    OutOfOrderRange { range: VectorRange, last_end: VectorId },

    #[error("Failed to encode record: {0}")]
    Encode(String),

    #[error("Record id space exhausted")]
    IdExhausted,
}

/// On-disk representation of one record.
#[derive(Debug, Encode, Decode)]
struct RecordFrame {
    id: u32,
    claim_text: String,
    source_link: String,
    corrective_info: String,
    range_start: u32,
    range_end: u32,
}

impl From<&MisinformationRecord> for RecordFrame {
    fn from(record: &MisinformationRecord) -> Self {
        Self {
            id: record.id.get(),
            claim_text: record.claim_text.clone(),
            source_link: record.source_link.clone(),
            corrective_info: record.corrective_info.clone(),
            range_start: record.vector_range.start().get(),
            range_end: record.vector_range.end().get(),
        }
    }
}

impl TryFrom<RecordFrame> for MisinformationRecord {
    type Error = RecordStoreError;

    fn try_from(frame: RecordFrame) -> Result<Self, Self::Error> {
        let id = RecordId::new(frame.id)
            .ok_or_else(|| RecordStoreError::Corrupt("record with id 0".to_string()))?;
        let range = VectorId::new(frame.range_start)
            .zip(VectorId::new(frame.range_end))
            .and_then(|(start, end)| VectorRange::new(start, end))
            .ok_or_else(|| {
                RecordStoreError::Corrupt(format!(
                    "record {id} has invalid range {}..={}",
                    frame.range_start, frame.range_end
                ))
            })?;
        Ok(Self {
            id,
            claim_text: frame.claim_text,
            source_link: frame.source_link,
            corrective_info: frame.corrective_info,
            vector_range: range,
        })
    }
}

/// Durable record store.
///
/// Starts uninitialized; every operation fails with
/// [`RecordStoreError::NotInitialized`] until [`RecordStore::initialize`]
/// has loaded the log.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    writer: Mutex<Option<File>>,
    records: RwLock<Option<Vec<MisinformationRecord>>>,
}

impl RecordStore {
    /// Creates an uninitialized store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(RECORD_FILE_NAME),
            writer: Mutex::new(None),
            records: RwLock::new(None),
        }
    }

    /// Creates and initializes a store in one step.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, RecordStoreError> {
        let store = Self::new(dir);
        store.initialize()?;
        Ok(store)
    }

    /// Loads the log from disk, creating it if needed.
    ///
    /// Returns the number of records loaded. Calling this twice reloads.
    pub fn initialize(&self) -> Result<usize, RecordStoreError> {
        let mut writer = self.writer.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        if file.metadata()?.len() == 0 {
            file.write_all(MAGIC_BYTES)?;
            file.write_all(&LOG_VERSION.to_le_bytes())?;
            file.sync_all()?;
            info!("Created record log at {}", self.path.display());
        }

        let records = Self::load_frames(&mut file)?;
        verify_ranges(&records)?;

        let count = records.len();
        info!(
            "Loaded {count} misinformation records from {}",
            self.path.display()
        );
        *self.records.write() = Some(records);
        *writer = Some(file);
        Ok(count)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.records.read().is_some()
    }

    /// Registers a claim owning `range`.
    ///
    /// The range must lie strictly after every range already registered.
    /// The record is durable before this returns.
    pub fn append(
        &self,
        claim_text: &str,
        source_link: &str,
        corrective_info: &str,
        range: VectorRange,
    ) -> Result<RecordId, RecordStoreError> {
        let mut writer = self.writer.lock();
        let file = writer.as_mut().ok_or_else(|| self.not_initialized())?;

        let id = {
            let guard = self.records.read();
            let records = guard.as_ref().ok_or_else(|| self.not_initialized())?;
            check_append(records, range)?;
            let next = records.last().map_or(1, |r| r.id.get() + 1);
            RecordId::new(next).ok_or(RecordStoreError::IdExhausted)?
        };

        let record = MisinformationRecord {
            id,
            claim_text: claim_text.to_string(),
            source_link: source_link.to_string(),
            corrective_info: corrective_info.to_string(),
            vector_range: range,
        };

        let payload = bincode::encode_to_vec(RecordFrame::from(&record), bincode::config::standard())
            .map_err(|e| RecordStoreError::Encode(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| RecordStoreError::Encode("record exceeds 4 GiB".to_string()))?;

        let end = file.seek(SeekFrom::End(0))?;
        let write = (|| -> io::Result<()> {
            let mut frame = Vec::with_capacity(4 + payload.len());
            frame.extend_from_slice(&len.to_le_bytes());
            frame.extend_from_slice(&payload);
            file.write_all(&frame)?;
            file.sync_data()
        })();
        if let Err(e) = write {
            // Leave no partial frame behind
            let _ = file.set_len(end);
            return Err(e.into());
        }

        debug!("Registered record {id} owning vectors {range}");
        if let Some(records) = self.records.write().as_mut() {
            records.push(record);
        }
        Ok(id)
    }

    /// Returns every record whose range contains at least one of `ids`.
    ///
    /// Each record appears once, in record-id order, however many of its
    /// vectors were given.
    pub fn resolve_by_vector_ids(
        &self,
        ids: impl IntoIterator<Item = VectorId>,
    ) -> Result<Vec<MisinformationRecord>, RecordStoreError> {
        let guard = self.records.read();
        let records = guard.as_ref().ok_or_else(|| self.not_initialized())?;

        let mut found: BTreeMap<RecordId, &MisinformationRecord> = BTreeMap::new();
        for id in ids {
            if let Some(record) = find_owner(records, id) {
                found.entry(record.id).or_insert(record);
            }
        }

        Ok(found.into_values().cloned().collect())
    }

    /// Looks up a record by its id.
    pub fn get(&self, id: RecordId) -> Result<Option<MisinformationRecord>, RecordStoreError> {
        let guard = self.records.read();
        let records = guard.as_ref().ok_or_else(|| self.not_initialized())?;
        // Record ids are dense and ascending
        Ok(records
            .get(id.get() as usize - 1)
            .filter(|r| r.id == id)
            .cloned())
    }

    /// Number of registered records.
    pub fn len(&self) -> Result<usize, RecordStoreError> {
        let guard = self.records.read();
        Ok(guard.as_ref().ok_or_else(|| self.not_initialized())?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RecordStoreError> {
        Ok(self.len()? == 0)
    }

    /// Highest vector id owned by any record.
    pub fn last_vector_id(&self) -> Result<Option<VectorId>, RecordStoreError> {
        let guard = self.records.read();
        let records = guard.as_ref().ok_or_else(|| self.not_initialized())?;
        Ok(records.last().map(|r| r.vector_range.end()))
    }

    /// Copy of every record in range order.
    pub fn all(&self) -> Result<Vec<MisinformationRecord>, RecordStoreError> {
        let guard = self.records.read();
        Ok(guard.as_ref().ok_or_else(|| self.not_initialized())?.clone())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn not_initialized(&self) -> RecordStoreError {
        RecordStoreError::NotInitialized {
            path: self.path.clone(),
        }
    }

    fn load_frames(file: &mut File) -> Result<Vec<MisinformationRecord>, RecordStoreError> {
        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE as usize || &bytes[0..4] != MAGIC_BYTES {
            return Err(RecordStoreError::Corrupt("invalid header".to_string()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != LOG_VERSION {
            return Err(RecordStoreError::Corrupt(format!(
                "unsupported log version {version}, expected {LOG_VERSION}"
            )));
        }

        let mut records = Vec::new();
        let mut offset = HEADER_SIZE as usize;
        while offset < bytes.len() {
            let Some((frame, next)) = read_frame(&bytes, offset)? else {
                break;
            };
            records.push(MisinformationRecord::try_from(frame)?);
            offset = next;
        }

        if offset < bytes.len() {
            warn!(
                "Dropping {} bytes of incomplete record frame at end of log",
                bytes.len() - offset
            );
            file.set_len(offset as u64)?;
            file.sync_data()?;
        }

        Ok(records)
    }
}

/// Decodes the frame at `offset`, returning it with the offset of the next.
///
/// `Ok(None)` means the frame is the torn remainder of an interrupted final
/// write. A torn write only ever leaves a strict prefix of a frame at the end
/// of the log, so a bad frame with decodable data behind it is corruption.
fn read_frame(
    bytes: &[u8],
    offset: usize,
) -> Result<Option<(RecordFrame, usize)>, RecordStoreError> {
    let config = bincode::config::standard();
    let Some(len_bytes) = bytes.get(offset..offset + 4) else {
        return Ok(None);
    };
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    let start = offset + 4;
    let end = start.saturating_add(len);

    let Some(payload) = bytes.get(start..end) else {
        // Cut short, unless a whole record hides behind an oversized length
        let rest = &bytes[start..];
        return match bincode::decode_from_slice::<RecordFrame, _>(rest, config) {
            Ok(_) => Err(RecordStoreError::Corrupt(format!(
                "frame at byte {offset} declares {len} bytes but only {} remain",
                rest.len()
            ))),
            Err(_) => Ok(None),
        };
    };

    match bincode::decode_from_slice::<RecordFrame, _>(payload, config) {
        Ok((frame, used)) if used == len => Ok(Some((frame, end))),
        Ok((_, used)) => Err(RecordStoreError::Corrupt(format!(
            "frame at byte {offset} declares {len} bytes but its record uses {used}"
        ))),
        Err(_) if end == bytes.len() => Ok(None),
        Err(e) => Err(RecordStoreError::Corrupt(format!("frame at byte {offset}: {e}"))),
    }
}

/// Finds the record whose range contains `id`.
fn find_owner(records: &[MisinformationRecord], id: VectorId) -> Option<&MisinformationRecord> {
    let idx = records.partition_point(|r| r.vector_range.end() < id);
    records
        .get(idx)
        .filter(|r| r.vector_range.contains(id))
}

fn check_append(
    records: &[MisinformationRecord],
    range: VectorRange,
) -> Result<(), RecordStoreError> {
    let Some(last) = records.last() else {
        return Ok(());
    };
    if range.start() > last.vector_range.end() {
        return Ok(());
    }

    let idx = records.partition_point(|r| r.vector_range.end() < range.start());
    if let Some(existing) = records.get(idx).filter(|r| r.vector_range.overlaps(&range)) {
        return Err(RecordStoreError::OverlappingRange {
            range,
            existing: existing.id,
            existing_range: existing.vector_range,
        });
    }
    Err(RecordStoreError::OutOfOrderRange {
        range,
        last_end: last.vector_range.end(),
    })
}

/// Checks loaded records are in id order with strictly ascending,
/// non-overlapping ranges.
fn verify_ranges(records: &[MisinformationRecord]) -> Result<(), RecordStoreError> {
    for (idx, pair) in records.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.id.get() != prev.id.get() + 1 {
            return Err(RecordStoreError::Corrupt(format!(
                "record ids not dense at position {}",
                idx + 1
            )));
        }
        if next.vector_range.start() <= prev.vector_range.end() {
            return Err(RecordStoreError::Corrupt(format!(
                "record {} range {} overlaps record {} range {}",
                next.id, next.vector_range, prev.id, prev.vector_range
            )));
        }
    }
    if let Some(first) = records.first() {
        if first.id.get() != 1 {
            return Err(RecordStoreError::Corrupt(
                "first record id is not 1".to_string(),
            ));
        }
    }
    Ok(())
}

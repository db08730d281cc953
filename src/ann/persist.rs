//! Binary index file format.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header:   magic "MANN" | version u32 | dimension u32 | tree_count u32
//!           | metric u32 | leaf_capacity u32 | vector_count u64
//!           | max_vector_id u32 (0 = none) | seed u64
//! per tree: seed u64 | root u32 | split_count u32 | leaf_count u32
//!           | splits: normal [f32; dimension] | threshold f32 | left u32 | right u32
//!           | leaves: len u32 | ids [u32; len]
//! trailer:  SHA-256 of everything above
//! ```
//!
//! Loading validates the header against the configured dimension, the
//! checksum, and the shape of every tree before anything is returned.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use memmap2::MmapOptions;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::ann::tree::{AnnTree, Leaf, NodeRef, SplitNode};
use crate::ann::{AnnError, AnnIndex, Metric};
use crate::vector::{VectorDimension, VectorId};

/// Version written into the header of every index file.
pub const INDEX_FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"MANN";
const HEADER_SIZE: usize = 44;
const CHECKSUM_SIZE: usize = 32;

impl AnnIndex {
    /// Serializes the index into its binary file representation.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + CHECKSUM_SIZE);

        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dimension.get() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.trees.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.metric.to_u32().to_le_bytes());
        buf.extend_from_slice(&(self.leaf_capacity as u32).to_le_bytes());
        buf.extend_from_slice(&self.vector_count.to_le_bytes());
        buf.extend_from_slice(&self.max_vector_id.map_or(0, |id| id.get()).to_le_bytes());
        buf.extend_from_slice(&self.seed.to_le_bytes());

        for tree in &self.trees {
            buf.extend_from_slice(&tree.seed().to_le_bytes());
            buf.extend_from_slice(&tree.root().encode().to_le_bytes());
            buf.extend_from_slice(&(tree.splits().len() as u32).to_le_bytes());
            buf.extend_from_slice(&(tree.leaves().len() as u32).to_le_bytes());

            for split in tree.splits() {
                for value in &split.normal {
                    buf.extend_from_slice(&value.to_le_bytes());
                }
                buf.extend_from_slice(&split.threshold.to_le_bytes());
                buf.extend_from_slice(&split.left.encode().to_le_bytes());
                buf.extend_from_slice(&split.right.encode().to_le_bytes());
            }
            for leaf in tree.leaves() {
                buf.extend_from_slice(&(leaf.ids.len() as u32).to_le_bytes());
                for id in &leaf.ids {
                    buf.extend_from_slice(&id.to_bytes());
                }
            }
        }

        let checksum = Sha256::digest(&buf);
        buf.extend_from_slice(&checksum);
        buf
    }

    /// Parses an index, rejecting anything not built for `expected_dim`.
    pub fn from_bytes(bytes: &[u8], expected_dim: VectorDimension) -> Result<Self, AnnError> {
        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(AnnError::corrupt(format!(
                "file is {} bytes, shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(AnnError::corrupt("bad magic bytes"));
        }

        let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
        if Sha256::digest(body).as_slice() != trailer {
            return Err(AnnError::corrupt("checksum mismatch"));
        }

        let mut r = Reader::new(body, 4);
        let version = r.u32()?;
        if version != INDEX_FORMAT_VERSION {
            return Err(AnnError::corrupt(format!(
                "format version {version}, expected {INDEX_FORMAT_VERSION}"
            )));
        }

        let dimension = r.u32()? as usize;
        if dimension != expected_dim.get() {
            return Err(AnnError::corrupt(format!(
                "index dimension {dimension} does not match configured {expected_dim}"
            )));
        }

        let tree_count = r.u32()? as usize;
        if tree_count == 0 {
            return Err(AnnError::corrupt("index holds no trees"));
        }
        let raw_metric = r.u32()?;
        let metric = Metric::from_u32(raw_metric)
            .ok_or_else(|| AnnError::corrupt(format!("unknown metric {raw_metric}")))?;
        let leaf_capacity = r.u32()? as usize;
        let vector_count = r.u64()?;
        let max_vector_id = VectorId::new(r.u32()?);
        let seed = r.u64()?;

        let mut trees = Vec::with_capacity(tree_count.min(1024));
        for t in 0..tree_count {
            let tree = read_tree(&mut r, dimension)?;
            tree.check_structure()
                .map_err(|reason| AnnError::corrupt(format!("tree {t}: {reason}")))?;
            trees.push(tree);
        }

        if r.remaining() != 0 {
            return Err(AnnError::corrupt(format!(
                "{} unexpected trailing bytes",
                r.remaining()
            )));
        }

        Ok(Self {
            dimension: expected_dim,
            metric,
            leaf_capacity,
            seed,
            vector_count,
            max_vector_id,
            trees,
        })
    }

    /// Writes the index to `path` atomically: a sibling temp file is fully
    /// written and synced, then renamed over the target.
    pub fn save(&self, path: &Path) -> Result<(), AnnError> {
        let persist_err = |source| AnnError::Persist {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let bytes = self.to_bytes();
        let temp_path = path.with_extension("ann.tmp");
        {
            let mut file = File::create(&temp_path).map_err(persist_err)?;
            file.write_all(&bytes).map_err(persist_err)?;
            file.sync_all().map_err(persist_err)?;
        }
        fs::rename(&temp_path, path).map_err(persist_err)?;

        info!(
            "Saved index with {} trees ({} bytes) to {}",
            self.trees.len(),
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    /// Loads an index written by [`AnnIndex::save`].
    pub fn load(path: &Path, expected_dim: VectorDimension) -> Result<Self, AnnError> {
        let read_err = |source| AnnError::Read {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(read_err)?;
        let len = file.metadata().map_err(read_err)?.len();
        if len == 0 {
            return Err(AnnError::corrupt("index file is empty"));
        }

        let mmap = unsafe { MmapOptions::new().map(&file).map_err(read_err)? };
        let index = Self::from_bytes(&mmap, expected_dim)?;
        debug!(
            "Loaded index with {} trees over {} vectors from {}",
            index.trees.len(),
            index.vector_count,
            path.display()
        );
        Ok(index)
    }
}

fn read_tree(r: &mut Reader<'_>, dimension: usize) -> Result<AnnTree, AnnError> {
    let seed = r.u64()?;
    let root = NodeRef::decode(r.u32()?);
    let split_count = r.u32()? as usize;
    let leaf_count = r.u32()? as usize;

    // Each split takes at least 12 bytes; refuse counts the body cannot hold
    if split_count.saturating_mul(12 + 4 * dimension) > r.remaining() {
        return Err(AnnError::corrupt(format!(
            "split count {split_count} exceeds file size"
        )));
    }

    let mut splits = Vec::with_capacity(split_count);
    for _ in 0..split_count {
        let mut normal = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            normal.push(r.f32()?);
        }
        let threshold = r.f32()?;
        let left = NodeRef::decode(r.u32()?);
        let right = NodeRef::decode(r.u32()?);
        splits.push(SplitNode::new(normal, threshold, left, right));
    }

    if leaf_count.saturating_mul(4) > r.remaining() {
        return Err(AnnError::corrupt(format!(
            "leaf count {leaf_count} exceeds file size"
        )));
    }

    let mut leaves = Vec::with_capacity(leaf_count);
    for _ in 0..leaf_count {
        let len = r.u32()? as usize;
        if len.saturating_mul(4) > r.remaining() {
            return Err(AnnError::corrupt(format!("leaf of {len} ids exceeds file size")));
        }
        let mut ids = Vec::with_capacity(len);
        for _ in 0..len {
            let id = VectorId::new(r.u32()?)
                .ok_or_else(|| AnnError::corrupt("leaf holds vector id 0"))?;
            ids.push(id);
        }
        leaves.push(Leaf { ids });
    }

    Ok(AnnTree::from_parts(seed, root, splits, leaves))
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], AnnError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| AnnError::corrupt("unexpected end of file"))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, AnnError> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, AnnError> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32, AnnError> {
        self.take::<4>().map(f32::from_le_bytes)
    }
}

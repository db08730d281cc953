//! Forest construction.
//!
//! Trees are built independently, in parallel, each from its own seed derived
//! from the forest's base seed. A seeded build is fully deterministic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::ann::tree::{AnnTree, Leaf, NodeRef, SplitNode};
use crate::ann::{AnnError, AnnIndex, BuildParams, Metric};
use crate::vector::{VectorDimension, VectorId, dot, norm};

/// Random two-point splits tried before falling back to a median split.
const MAX_SPLIT_ATTEMPTS: usize = 8;

/// Derives the seed of tree `tree` from the forest's base seed (splitmix64).
pub(crate) fn tree_seed(base: u64, tree: u64) -> u64 {
    let mut z = base.wrapping_add(tree.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Builds a forest over `vectors`.
///
/// Every vector must match `dimension`. An empty input yields a forest of
/// empty trees rather than an error.
pub fn build_index(
    dimension: VectorDimension,
    vectors: impl IntoIterator<Item = (VectorId, Vec<f32>)>,
    params: &BuildParams,
) -> Result<AnnIndex, AnnError> {
    params.validate()?;

    let mut items: Vec<(VectorId, Vec<f32>)> = vectors.into_iter().collect();
    for (_, vector) in &items {
        dimension.validate_vector(vector)?;
    }
    items.sort_by_key(|(id, _)| *id);
    if items.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(AnnError::InvalidParams(
            "duplicate vector ids in build input".to_string(),
        ));
    }

    let seed = params.seed.unwrap_or_else(|| rand::rng().random());

    if items.is_empty() {
        info!("Building empty forest of {} trees", params.tree_count);
        return Ok(AnnIndex::empty(dimension, params, seed));
    }

    let trees: Vec<AnnTree> = (0..params.tree_count as u64)
        .into_par_iter()
        .map(|t| TreeBuilder::new(&items, params.leaf_capacity, tree_seed(seed, t)).build())
        .collect();

    let max_depth = trees.iter().map(AnnTree::depth).max().unwrap_or(0);
    let nodes: usize = trees.iter().map(AnnTree::node_count).sum();
    info!(
        "Built forest of {} trees over {} vectors ({nodes} nodes, max depth {max_depth})",
        trees.len(),
        items.len()
    );

    Ok(AnnIndex {
        dimension,
        metric: Metric::Euclidean,
        leaf_capacity: params.leaf_capacity,
        seed,
        vector_count: items.len() as u64,
        max_vector_id: items.last().map(|(id, _)| *id),
        trees,
    })
}

/// Where a freshly built node gets attached.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Root,
    Left(usize),
    Right(usize),
}

/// Builds one tree. Members are positions into the shared item slice.
struct TreeBuilder<'a> {
    items: &'a [(VectorId, Vec<f32>)],
    leaf_capacity: usize,
    seed: u64,
    rng: StdRng,
    splits: Vec<SplitNode>,
    leaves: Vec<Leaf>,
    fallbacks: usize,
}

impl<'a> TreeBuilder<'a> {
    fn new(items: &'a [(VectorId, Vec<f32>)], leaf_capacity: usize, seed: u64) -> Self {
        Self {
            items,
            leaf_capacity,
            seed,
            rng: StdRng::seed_from_u64(seed),
            splits: Vec::new(),
            leaves: Vec::new(),
            fallbacks: 0,
        }
    }

    fn build(mut self) -> AnnTree {
        let mut root = NodeRef::Leaf(0);
        let mut pending = vec![((0..self.items.len()).collect::<Vec<usize>>(), Slot::Root)];

        // Explicit stack keeps deep, unlucky partitions off the call stack
        while let Some((members, slot)) = pending.pop() {
            let node = if members.len() <= self.leaf_capacity {
                let idx = self.leaves.len() as u32;
                self.leaves.push(Leaf {
                    ids: members.iter().map(|&m| self.items[m].0).collect(),
                });
                NodeRef::Leaf(idx)
            } else {
                let (normal, threshold, left, right) = self.split(&members);
                let idx = self.splits.len();
                // Children are patched in when they are built
                self.splits.push(SplitNode::new(
                    normal,
                    threshold,
                    NodeRef::Leaf(u32::MAX),
                    NodeRef::Leaf(u32::MAX),
                ));
                pending.push((right, Slot::Right(idx)));
                pending.push((left, Slot::Left(idx)));
                NodeRef::Split(idx as u32)
            };

            match slot {
                Slot::Root => root = node,
                Slot::Left(parent) => self.splits[parent].left = node,
                Slot::Right(parent) => self.splits[parent].right = node,
            }
        }

        if self.fallbacks > 0 {
            debug!(
                "Tree {:#x} used {} median fallback splits",
                self.seed, self.fallbacks
            );
        }
        AnnTree::from_parts(self.seed, root, self.splits, self.leaves)
    }

    /// Splits `members` (more than `leaf_capacity`, so at least two) into
    /// two non-empty halves.
    fn split(&mut self, members: &[usize]) -> (Vec<f32>, f32, Vec<usize>, Vec<usize>) {
        let mut fallback_normal = None;

        for _ in 0..MAX_SPLIT_ATTEMPTS {
            let (a, b) = self.sample_pair(members);
            let (va, vb) = (&self.items[a].1, &self.items[b].1);

            let normal: Vec<f32> = va.iter().zip(vb).map(|(x, y)| x - y).collect();
            if norm(&normal) == 0.0 {
                continue;
            }
            let midpoint: Vec<f32> = va.iter().zip(vb).map(|(x, y)| (x + y) * 0.5).collect();
            let threshold = dot(&normal, &midpoint);

            let (left, right): (Vec<usize>, Vec<usize>) = members
                .iter()
                .copied()
                .partition(|&m| dot(&self.items[m].1, &normal) - threshold <= 0.0);

            if !left.is_empty() && !right.is_empty() {
                return (normal, threshold, left, right);
            }
            fallback_normal = Some(normal);
        }

        self.fallbacks += 1;
        let normal = fallback_normal.unwrap_or_else(|| self.random_axis());
        self.median_split(members, normal)
    }

    /// Splits by rank of the projections onto `normal`, half on each side.
    fn median_split(
        &self,
        members: &[usize],
        normal: Vec<f32>,
    ) -> (Vec<f32>, f32, Vec<usize>, Vec<usize>) {
        let mut projected: Vec<(f32, usize)> = members
            .iter()
            .map(|&m| (dot(&self.items[m].1, &normal), m))
            .collect();
        projected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mid = projected.len() / 2;
        let threshold = (projected[mid - 1].0 + projected[mid].0) * 0.5;
        let left = projected[..mid].iter().map(|&(_, m)| m).collect();
        let right = projected[mid..].iter().map(|&(_, m)| m).collect();
        (normal, threshold, left, right)
    }

    /// Two distinct members, uniformly at random.
    fn sample_pair(&mut self, members: &[usize]) -> (usize, usize) {
        let n = members.len();
        let i = self.rng.random_range(0..n);
        let mut j = self.rng.random_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        (members[i], members[j])
    }

    fn random_axis(&mut self) -> Vec<f32> {
        let dim = self.items[0].1.len();
        let mut axis = vec![0.0; dim];
        axis[self.rng.random_range(0..dim)] = 1.0;
        axis
    }
}

//! Node layout of a single randomized partition tree.
//!
//! Internal nodes and leaves live in two flat arenas and reference each
//! other through [`NodeRef`], which keeps a tree cheap to clone, to walk
//! without recursion, and to write out as two contiguous blocks.

use crate::vector::{VectorId, dot, norm};

/// High bit marking a serialized [`NodeRef`] as a leaf.
pub(crate) const LEAF_FLAG: u32 = 1 << 31;

/// Reference to a node inside one tree's arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    Split(u32),
    Leaf(u32),
}

impl NodeRef {
    /// Packs the reference into a u32, leaves tagged with [`LEAF_FLAG`].
    #[must_use]
    pub fn encode(self) -> u32 {
        match self {
            NodeRef::Split(idx) => idx,
            NodeRef::Leaf(idx) => idx | LEAF_FLAG,
        }
    }

    #[must_use]
    pub fn decode(raw: u32) -> Self {
        if raw & LEAF_FLAG != 0 {
            NodeRef::Leaf(raw & !LEAF_FLAG)
        } else {
            NodeRef::Split(raw)
        }
    }
}

/// Internal node: a hyperplane `normal · v = threshold`.
///
/// Vectors with a positive margin go right, everything else left.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitNode {
    pub normal: Vec<f32>,
    pub threshold: f32,
    pub left: NodeRef,
    pub right: NodeRef,
    normal_norm: f32,
}

impl SplitNode {
    #[must_use]
    pub fn new(normal: Vec<f32>, threshold: f32, left: NodeRef, right: NodeRef) -> Self {
        let normal_norm = norm(&normal);
        Self {
            normal,
            threshold,
            left,
            right,
            normal_norm,
        }
    }

    /// Signed offset of `vector` from the hyperplane, in units of `|normal|`.
    #[inline]
    #[must_use]
    pub fn margin(&self, vector: &[f32]) -> f32 {
        dot(vector, &self.normal) - self.threshold
    }

    /// Euclidean distance from `vector` to the hyperplane.
    #[inline]
    #[must_use]
    pub fn plane_distance(&self, margin: f32) -> f32 {
        if self.normal_norm > 0.0 {
            margin.abs() / self.normal_norm
        } else {
            0.0
        }
    }

    /// Child on the side of `margin`, then the other one.
    #[inline]
    #[must_use]
    pub fn sides(&self, margin: f32) -> (NodeRef, NodeRef) {
        if margin > 0.0 {
            (self.right, self.left)
        } else {
            (self.left, self.right)
        }
    }
}

/// Leaf: at most `leaf_capacity` vector ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Leaf {
    pub ids: Vec<VectorId>,
}

/// One independently built tree of the forest. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnTree {
    seed: u64,
    root: NodeRef,
    splits: Vec<SplitNode>,
    leaves: Vec<Leaf>,
}

impl AnnTree {
    pub(crate) fn from_parts(
        seed: u64,
        root: NodeRef,
        splits: Vec<SplitNode>,
        leaves: Vec<Leaf>,
    ) -> Self {
        Self {
            seed,
            root,
            splits,
            leaves,
        }
    }

    /// A tree over no vectors: a single empty leaf.
    #[must_use]
    pub fn empty(seed: u64) -> Self {
        Self::from_parts(seed, NodeRef::Leaf(0), Vec::new(), vec![Leaf::default()])
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn root(&self) -> NodeRef {
        self.root
    }

    #[must_use]
    pub fn splits(&self) -> &[SplitNode] {
        &self.splits
    }

    #[must_use]
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    #[must_use]
    pub fn split(&self, idx: u32) -> Option<&SplitNode> {
        self.splits.get(idx as usize)
    }

    #[must_use]
    pub fn leaf(&self, idx: u32) -> Option<&Leaf> {
        self.leaves.get(idx as usize)
    }

    /// Total number of nodes, internal and leaf.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.splits.len() + self.leaves.len()
    }

    /// Number of vector ids held across all leaves.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.leaves.iter().map(|l| l.ids.len()).sum()
    }

    /// Length of the longest root-to-leaf path, counted in nodes.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            match node {
                NodeRef::Leaf(_) => deepest = deepest.max(depth),
                NodeRef::Split(idx) => {
                    if let Some(split) = self.split(idx) {
                        stack.push((split.left, depth + 1));
                        stack.push((split.right, depth + 1));
                    }
                }
            }
        }
        deepest
    }

    /// Checks every arena slot is referenced exactly once, starting from the
    /// root, so traversal can neither loop nor dangle.
    pub(crate) fn check_structure(&self) -> Result<(), String> {
        let mut split_seen = vec![false; self.splits.len()];
        let mut leaf_seen = vec![false; self.leaves.len()];

        let mut mark = |node: NodeRef| -> Result<(), String> {
            let (seen, idx, kind) = match node {
                NodeRef::Split(idx) => (&mut split_seen, idx, "split"),
                NodeRef::Leaf(idx) => (&mut leaf_seen, idx, "leaf"),
            };
            match seen.get_mut(idx as usize) {
                None => Err(format!("{kind} reference {idx} out of range")),
                Some(true) => Err(format!("{kind} {idx} referenced twice")),
                Some(flag) => {
                    *flag = true;
                    Ok(())
                }
            }
        };

        mark(self.root)?;
        for split in &self.splits {
            mark(split.left)?;
            mark(split.right)?;
        }

        if split_seen.iter().chain(&leaf_seen).any(|seen| !seen) {
            return Err("tree contains unreachable nodes".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> AnnTree {
        // root splits on x at 5.0: left leaf {1, 2}, right leaf {3}
        let root = SplitNode::new(vec![1.0, 0.0], 5.0, NodeRef::Leaf(0), NodeRef::Leaf(1));
        AnnTree::from_parts(
            7,
            NodeRef::Split(0),
            vec![root],
            vec![
                Leaf {
                    ids: vec![VectorId::new_unchecked(1), VectorId::new_unchecked(2)],
                },
                Leaf {
                    ids: vec![VectorId::new_unchecked(3)],
                },
            ],
        )
    }

    #[test]
    fn test_node_ref_encoding() {
        for node in [NodeRef::Split(0), NodeRef::Split(41), NodeRef::Leaf(0), NodeRef::Leaf(9)] {
            assert_eq!(NodeRef::decode(node.encode()), node);
        }
        assert_eq!(NodeRef::Leaf(3).encode(), 3 | LEAF_FLAG);
    }

    #[test]
    fn test_split_sides_and_distance() {
        let split = SplitNode::new(vec![2.0, 0.0], 10.0, NodeRef::Leaf(0), NodeRef::Leaf(1));

        let margin = split.margin(&[8.0, 3.0]);
        assert_eq!(margin, 6.0);
        assert_eq!(split.sides(margin), (NodeRef::Leaf(1), NodeRef::Leaf(0)));
        assert_eq!(split.plane_distance(margin), 3.0);

        // Points on the plane go left
        assert_eq!(split.sides(split.margin(&[5.0, 0.0])).0, NodeRef::Leaf(0));
    }

    #[test]
    fn test_tree_metrics() {
        let tree = small_tree();
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.item_count(), 3);
        assert_eq!(tree.depth(), 2);
        assert!(tree.check_structure().is_ok());

        let empty = AnnTree::empty(1);
        assert_eq!(empty.item_count(), 0);
        assert_eq!(empty.depth(), 1);
        assert!(empty.check_structure().is_ok());
    }

    #[test]
    fn test_structure_check_catches_shared_nodes() {
        let root = SplitNode::new(vec![1.0], 0.0, NodeRef::Leaf(0), NodeRef::Leaf(0));
        let tree = AnnTree::from_parts(0, NodeRef::Split(0), vec![root], vec![Leaf::default()]);
        assert!(tree.check_structure().is_err());

        let root = SplitNode::new(vec![1.0], 0.0, NodeRef::Leaf(0), NodeRef::Split(0));
        let tree = AnnTree::from_parts(0, NodeRef::Split(0), vec![root], vec![Leaf::default()]);
        assert!(tree.check_structure().is_err());
    }
}

//! Approximate k-NN search over the forest.
//!
//! Candidate generation shares one frontier across all trees, ordered by the
//! smallest distance the query could still have to anything under a node.
//! Descent is greedy toward the query's side of each hyperplane; the other
//! side is parked on the frontier with a bound no smaller than its parent's.
//! The final ranking is exact: every candidate is re-scored against its
//! stored vector.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

use tracing::{debug, warn};

use crate::ann::tree::NodeRef;
use crate::ann::{AnnError, AnnIndex, Neighbor, SearchParams};
use crate::vector::{VectorId, VectorSource, euclidean};

/// Work done by a single query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Tree nodes visited during candidate generation.
    pub visited: usize,
    /// Distinct ids collected from leaves.
    pub candidates: usize,
    /// Candidates whose stored vector could not be fetched.
    pub missing: usize,
}

/// Frontier entry; ordered by bound, ties broken by position for determinism.
#[derive(Debug, Clone, Copy)]
struct Pending {
    bound: f32,
    tree: usize,
    node: NodeRef,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then(self.tree.cmp(&other.tree))
            .then(self.node.cmp(&other.node))
    }
}

impl AnnIndex {
    /// Returns up to `params.max_results` neighbors of `query`, nearest first.
    ///
    /// Vectors are fetched from `source` for re-ranking; ids the source no
    /// longer knows are skipped. A zero budget visits nothing and returns an
    /// empty list.
    pub fn query(
        &self,
        query: &[f32],
        params: SearchParams,
        source: &dyn VectorSource,
    ) -> Result<Vec<Neighbor>, AnnError> {
        self.query_with_stats(query, params, source)
            .map(|(neighbors, _)| neighbors)
    }

    /// Like [`AnnIndex::query`], also reporting how much work was done.
    pub fn query_with_stats(
        &self,
        query: &[f32],
        params: SearchParams,
        source: &dyn VectorSource,
    ) -> Result<(Vec<Neighbor>, SearchStats), AnnError> {
        self.dimension.validate_vector(query)?;
        if source.dimension() != self.dimension {
            return Err(AnnError::InvalidParams(format!(
                "vector source has dimension {}, index has {}",
                source.dimension(),
                self.dimension
            )));
        }

        let mut stats = SearchStats::default();
        if params.max_results == 0 || params.search_budget == 0 {
            return Ok((Vec::new(), stats));
        }

        let candidates = self.collect_candidates(query, params.search_budget, &mut stats);
        stats.candidates = candidates.len();

        let mut ranked: Vec<Neighbor> = Vec::with_capacity(candidates.len());
        for id in candidates {
            match source.vector(id) {
                Some(vector) => ranked.push(Neighbor {
                    id,
                    distance: euclidean(query, &vector),
                }),
                None => stats.missing += 1,
            }
        }
        if stats.missing > 0 {
            warn!(
                "{} candidate ids missing from vector source during re-rank",
                stats.missing
            );
        }

        ranked.sort_by(|a, b| a.distance.cmp(&b.distance).then(a.id.cmp(&b.id)));
        ranked.truncate(params.max_results);

        debug!(
            "ANN query visited {} nodes, {} candidates, returned {}",
            stats.visited,
            stats.candidates,
            ranked.len()
        );
        Ok((ranked, stats))
    }

    fn collect_candidates(
        &self,
        query: &[f32],
        budget: usize,
        stats: &mut SearchStats,
    ) -> BTreeSet<VectorId> {
        let mut candidates = BTreeSet::new();
        let mut frontier: BinaryHeap<Reverse<Pending>> = self
            .trees
            .iter()
            .enumerate()
            .map(|(tree, t)| {
                Reverse(Pending {
                    bound: 0.0,
                    tree,
                    node: t.root(),
                })
            })
            .collect();

        'frontier: while let Some(Reverse(entry)) = frontier.pop() {
            let tree = &self.trees[entry.tree];
            let mut node = entry.node;

            loop {
                if stats.visited >= budget {
                    break 'frontier;
                }
                stats.visited += 1;

                match node {
                    NodeRef::Leaf(idx) => {
                        if let Some(leaf) = tree.leaf(idx) {
                            candidates.extend(leaf.ids.iter().copied());
                        }
                        break;
                    }
                    NodeRef::Split(idx) => {
                        let Some(split) = tree.split(idx) else {
                            break;
                        };
                        let margin = split.margin(query);
                        let (near, far) = split.sides(margin);
                        frontier.push(Reverse(Pending {
                            bound: entry.bound.max(split.plane_distance(margin)),
                            tree: entry.tree,
                            node: far,
                        }));
                        node = near;
                    }
                }
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::{BuildParams, build_index};
    use crate::vector::{InMemoryVectors, VectorDimension};

    fn id(n: u32) -> VectorId {
        VectorId::new_unchecked(n)
    }

    fn dataset(n: u32) -> Vec<(VectorId, Vec<f32>)> {
        (1..=n)
            .map(|i| {
                let f = i as f32;
                (id(i), vec![(f * 0.37).sin() * 10.0, (f * 0.11).cos() * 10.0, f * 0.05])
            })
            .collect()
    }

    fn setup(n: u32, leaf_capacity: usize) -> (AnnIndex, InMemoryVectors) {
        let dim = VectorDimension::new(3).unwrap();
        let data = dataset(n);
        let params = BuildParams {
            tree_count: 5,
            leaf_capacity,
            seed: Some(1234),
        };
        let index = build_index(dim, data.clone(), &params).unwrap();
        let source = InMemoryVectors::from_pairs(dim, data).unwrap();
        (index, source)
    }

    fn ample(max_results: usize) -> SearchParams {
        SearchParams {
            max_results,
            search_budget: usize::MAX,
        }
    }

    #[test]
    fn test_self_query_returns_itself_first() {
        let (index, source) = setup(500, 8);
        for (vid, vector) in dataset(500).into_iter().step_by(37) {
            let result = index.query(&vector, ample(3), &source).unwrap();
            assert_eq!(result[0].id, vid);
            assert_eq!(result[0].distance.get(), 0.0);
        }
    }

    #[test]
    fn test_unlimited_budget_is_exact() {
        let (index, source) = setup(300, 4);
        let query: [f32; 3] = [1.0, -2.0, 4.0];

        let mut expected: Vec<(f32, u32)> = dataset(300)
            .iter()
            .map(|(vid, v)| (euclidean(&query, v).get(), vid.get()))
            .collect();
        expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let (result, stats) = index.query_with_stats(&query, ample(10), &source).unwrap();
        assert_eq!(stats.candidates, 300);
        let got: Vec<u32> = result.iter().map(|n| n.id.get()).collect();
        let want: Vec<u32> = expected.iter().take(10).map(|e| e.1).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_results_sorted_and_truncated() {
        let (index, source) = setup(200, 8);
        let result = index.query(&[0.0, 0.0, 0.0], ample(7), &source).unwrap();
        assert_eq!(result.len(), 7);
        assert!(result.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_budget_bounds_visited_nodes() {
        let (index, source) = setup(500, 4);
        let params = SearchParams {
            max_results: 5,
            search_budget: 12,
        };
        let (_, stats) = index
            .query_with_stats(&[0.5, 0.5, 0.5], params, &source)
            .unwrap();
        assert!(stats.visited <= 12);
        assert!(stats.candidates < 500);
    }

    #[test]
    fn test_zero_budget_returns_empty() {
        let (index, source) = setup(50, 4);
        let params = SearchParams {
            max_results: 5,
            search_budget: 0,
        };
        let (result, stats) = index
            .query_with_stats(&[0.0, 0.0, 0.0], params, &source)
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(stats.visited, 0);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let (index, source) = setup(20, 4);
        assert!(matches!(
            index.query(&[0.0, 0.0], ample(1), &source),
            Err(AnnError::Vector(_))
        ));
    }

    #[test]
    fn test_missing_vectors_are_skipped() {
        let (index, _) = setup(30, 4);
        let dim = VectorDimension::new(3).unwrap();
        let partial =
            InMemoryVectors::from_pairs(dim, dataset(30).into_iter().take(10)).unwrap();

        let (result, stats) = index
            .query_with_stats(&[0.0, 0.0, 0.0], ample(30), &partial)
            .unwrap();
        assert_eq!(result.len(), 10);
        assert_eq!(stats.missing, 20);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let dim = VectorDimension::new(2).unwrap();
        let index = AnnIndex::empty(dim, &BuildParams::default(), 0);
        let source = InMemoryVectors::new(dim);
        assert!(index.query(&[1.0, 1.0], ample(5), &source).unwrap().is_empty());
    }
}

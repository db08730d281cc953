#![allow(dead_code)]

use std::path::PathBuf;

use misinfo_matcher::{MatchingEngine, NewClaim, Settings};
use tempfile::TempDir;

pub const DIM: usize = 4;

/// An isolated data directory with small, deterministic index settings.
pub struct TestCorpus {
    pub dir: TempDir,
    pub settings: Settings,
}

impl TestCorpus {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut settings = Settings::default();
        settings.data_dir = dir.path().join("data");
        settings.matching.vector_dimension = DIM;
        settings.matching.tree_count = 4;
        settings.matching.leaf_capacity = 2;
        settings.matching.max_distance_threshold = 1.0;
        settings.matching.seed = Some(42);
        Self { dir, settings }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.settings.data_dir.clone()
    }

    pub fn engine(&self) -> MatchingEngine {
        MatchingEngine::open(&self.settings).expect("Failed to open engine")
    }
}

/// A point far from every other `point(n)` for distinct `n`.
pub fn point(n: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[n % DIM] = 10.0 * (1 + n / DIM) as f32;
    v
}

/// `point(n)` nudged by `offset` along the first axis.
pub fn near(n: usize, offset: f32) -> Vec<f32> {
    let mut v = point(n);
    v[0] += offset;
    v
}

pub fn claim(n: usize) -> NewClaim {
    NewClaim::new(
        format!("claim {n}"),
        format!("https://factcheck.example/{n}"),
        format!("correction {n}"),
        vec![point(n)],
    )
}

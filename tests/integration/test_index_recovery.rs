//! The engine falls back to a rebuild whenever the persisted index is unusable.

use std::fs;

use misinfo_matcher::{AnnError, AnnIndex, VectorDimension};

use crate::common::{DIM, TestCorpus, claim, near};

fn seeded(corpus: &TestCorpus, claims: usize) {
    let engine = corpus.engine();
    for n in 0..claims {
        engine.ingest(&claim(n)).unwrap();
    }
}

#[test]
fn test_garbage_index_file_is_rebuilt() {
    let corpus = TestCorpus::new();
    seeded(&corpus, 3);

    let index_path = corpus.settings.index_path();
    fs::write(&index_path, b"definitely not a forest").unwrap();

    let engine = corpus.engine();
    let stats = engine.status().unwrap().index;
    assert!(stats.loaded);
    assert_eq!(stats.rebuilds, 1);
    assert_eq!(stats.indexed_vectors, 3);
    assert_eq!(engine.match_vectors(&[near(2, 0.1)]).unwrap()[0].claim_text, "claim 2");

    // The rebuilt forest replaced the garbage on disk
    let reloaded = AnnIndex::load(&index_path, VectorDimension::new(DIM).unwrap()).unwrap();
    assert_eq!(reloaded.vector_count(), 3);
}

#[test]
fn test_truncated_index_file_is_rebuilt() {
    let corpus = TestCorpus::new();
    seeded(&corpus, 2);

    let index_path = corpus.settings.index_path();
    let bytes = fs::read(&index_path).unwrap();
    fs::write(&index_path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(
        AnnIndex::load(&index_path, VectorDimension::new(DIM).unwrap()),
        Err(AnnError::CorruptIndex { .. })
    ));

    let engine = corpus.engine();
    assert_eq!(engine.status().unwrap().index.rebuilds, 1);
    assert_eq!(engine.match_vectors(&[near(0, 0.1)]).unwrap().len(), 1);
}

#[test]
fn test_missing_index_file_is_rebuilt() {
    let corpus = TestCorpus::new();
    seeded(&corpus, 2);
    fs::remove_file(corpus.settings.index_path()).unwrap();

    let engine = corpus.engine();
    assert_eq!(engine.status().unwrap().index.rebuilds, 1);
    assert!(corpus.settings.index_path().exists());
}

#[test]
fn test_changed_tree_count_forces_rebuild() {
    let mut corpus = TestCorpus::new();
    seeded(&corpus, 2);

    corpus.settings.matching.tree_count = 7;
    let engine = corpus.engine();
    let stats = engine.status().unwrap().index;
    assert_eq!(stats.rebuilds, 1);
    assert_eq!(stats.tree_count, 7);
}

#[test]
fn test_manual_rebuild_keeps_results() {
    let corpus = TestCorpus::new();
    seeded(&corpus, 4);
    let engine = corpus.engine();

    let before = engine.match_vectors(&[near(3, 0.2)]).unwrap();
    let stats = engine.rebuild_index().unwrap();
    let after = engine.match_vectors(&[near(3, 0.2)]).unwrap();

    assert_eq!(stats.rebuilds, 1);
    assert_eq!(before, after);
}

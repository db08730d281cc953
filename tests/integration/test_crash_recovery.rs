//! Interrupted ingestions leave no orphaned vectors behind.

use misinfo_matcher::{RecordStore, VectorDimension, VectorStore};

use crate::common::{DIM, TestCorpus, claim, near, point};

fn dim() -> VectorDimension {
    VectorDimension::new(DIM).unwrap()
}

#[test]
fn test_staged_vectors_without_record_are_discarded() {
    let corpus = TestCorpus::new();
    {
        let engine = corpus.engine();
        engine.ingest(&claim(0)).unwrap();
    }

    // Crash after staging, before the record was written
    {
        let vectors = VectorStore::open_or_create(corpus.data_dir(), dim()).unwrap();
        vectors.stage(&[point(1), point(2)]).unwrap();
    }

    let engine = corpus.engine();
    let status = engine.status().unwrap();
    assert_eq!(status.vectors, 1);
    assert_eq!(status.staged_vectors, 0);
    assert_eq!(status.records, 1);

    assert!(engine.match_vectors(&[point(1)]).unwrap().is_empty());

    // The discarded ids are reused by the next claim
    let receipt = engine.ingest(&claim(1)).unwrap();
    assert_eq!(receipt.vector_range.start().get(), 2);
}

#[test]
fn test_staged_vectors_with_record_are_committed() {
    let corpus = TestCorpus::new();
    {
        let engine = corpus.engine();
        engine.ingest(&claim(0)).unwrap();
    }

    // Crash after the record was written, before the vectors were committed
    {
        let vectors = VectorStore::open_or_create(corpus.data_dir(), dim()).unwrap();
        let range = vectors.stage(&[point(1), point(2)]).unwrap();
        let records = RecordStore::open(corpus.data_dir()).unwrap();
        records
            .append("recovered", "https://factcheck.example/r", "fixed", range)
            .unwrap();
    }

    let engine = corpus.engine();
    let status = engine.status().unwrap();
    assert_eq!(status.vectors, 3);
    assert_eq!(status.records, 2);
    assert_eq!(status.index.indexed_vectors, 3);

    let matches = engine.match_vectors(&[near(2, 0.4)]).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].claim_text, "recovered");
}

#[test]
fn test_every_vector_belongs_to_a_record() {
    let corpus = TestCorpus::new();
    let engine = corpus.engine();
    for n in 0..4 {
        engine.ingest(&claim(n)).unwrap();
    }

    let ids: Vec<_> = engine.vectors().get_all().iter().map(|(id, _)| id).collect();
    let resolved = engine.records().resolve_by_vector_ids(ids.clone()).unwrap();
    assert_eq!(ids.len(), 4);
    assert_eq!(resolved.len(), 4);
}

//! Queries keep working while claims are ingested and the index is rebuilt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use misinfo_matcher::{QueryDuringRebuild, SentenceEmbeddings};
use rayon::prelude::*;

use crate::common::{TestCorpus, claim, near};

const CLAIMS: usize = 12;

fn ingest_while_querying(corpus: &TestCorpus) {
    let engine = corpus.engine();
    engine.ingest(&claim(0)).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut queries = 0usize;
                while !done.load(Ordering::Acquire) || queries == 0 {
                    let matches = engine.match_vectors(&[near(0, 0.1)]).unwrap();
                    // claim 0 was indexed before any reader started
                    assert_eq!(matches.len(), 1);
                    assert_eq!(matches[0].claim_text, "claim 0");
                    queries += 1;
                }
            });
        }

        s.spawn(|| {
            for n in 1..CLAIMS {
                engine.ingest(&claim(n)).unwrap();
            }
            done.store(true, Ordering::Release);
        });
    });

    let status = engine.status().unwrap();
    assert_eq!(status.records, CLAIMS);
    assert_eq!(status.index.indexed_vectors, CLAIMS as u64);
    for n in 0..CLAIMS {
        let matches = engine.match_vectors(&[near(n, 0.1)]).unwrap();
        assert_eq!(matches[0].claim_text, format!("claim {n}"));
    }
}

#[test]
fn test_stale_policy_serves_previous_index() {
    let corpus = TestCorpus::new();
    assert_eq!(corpus.settings.index.query_during_rebuild, QueryDuringRebuild::Stale);
    ingest_while_querying(&corpus);
}

#[test]
fn test_wait_policy_blocks_until_rebuilt() {
    let mut corpus = TestCorpus::new();
    corpus.settings.index.query_during_rebuild = QueryDuringRebuild::Wait;
    ingest_while_querying(&corpus);
}

#[test]
fn test_concurrent_ingestion_assigns_disjoint_ranges() {
    let corpus = TestCorpus::new();
    let engine = corpus.engine();

    let receipts: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|n| {
                let engine = &engine;
                s.spawn(move || engine.ingest(&claim(n)).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut starts: Vec<u32> = receipts.iter().map(|r| r.vector_range.start().get()).collect();
    starts.sort_unstable();
    assert_eq!(starts, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(engine.status().unwrap().records, 6);
}

#[test]
fn test_wait_policy_batch_matching_during_rebuilds() {
    let mut corpus = TestCorpus::new();
    corpus.settings.index.query_during_rebuild = QueryDuringRebuild::Wait;
    let engine = corpus.engine();
    for n in 0..CLAIMS {
        engine.ingest(&claim(n)).unwrap();
    }

    // Far more sentences than pool threads, so every worker is busy matching
    let sentences: Vec<SentenceEmbeddings> = (0..256)
        .map(|i| SentenceEmbeddings {
            sentence: format!("sentence {i}"),
            embeddings: vec![near(i % CLAIMS, 0.1)],
        })
        .collect();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..20 {
                engine.rebuild_index().unwrap();
            }
            done.store(true, Ordering::Release);
        });

        s.spawn(|| {
            let mut rounds = 0usize;
            while !done.load(Ordering::Acquire) || rounds == 0 {
                let matched = engine.match_sentences(&sentences).unwrap();
                assert_eq!(matched.len(), sentences.len());
                rounds += 1;
            }
        });

        // Callers may also fan out on the pool themselves
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                let hits: usize = (0..CLAIMS * 8)
                    .into_par_iter()
                    .map(|i| engine.match_vectors(&[near(i % CLAIMS, 0.1)]).unwrap().len())
                    .sum();
                assert_eq!(hits, CLAIMS * 8);
            }
        });
    });

    // One build at open, one per ingest, then the explicit rebuilds
    assert_eq!(engine.status().unwrap().index.rebuilds, 1 + CLAIMS as u64 + 20);
}

//! End-to-end ingestion and matching through the engine.

use misinfo_matcher::{MatchError, NewClaim, SentenceEmbeddings};

use crate::common::{DIM, TestCorpus, claim, near, point};

#[test]
fn test_ingested_claims_are_matchable_immediately() {
    let corpus = TestCorpus::new();
    let engine = corpus.engine();

    for n in 0..6 {
        engine.ingest(&claim(n)).unwrap();
    }

    for n in 0..6 {
        let matches = engine.match_vectors(&[near(n, 0.5)]).unwrap();
        assert_eq!(matches.len(), 1, "claim {n} should match its own neighborhood");
        assert_eq!(matches[0].claim_text, format!("claim {n}"));
        assert_eq!(matches[0].source_link, format!("https://factcheck.example/{n}"));
    }

    let status = engine.status().unwrap();
    assert_eq!(status.records, 6);
    assert_eq!(status.vectors, 6);
    assert_eq!(status.index.indexed_vectors, 6);
    assert!(!status.index.stale);
}

#[test]
fn test_proposition_vectors_match_their_claim() {
    let corpus = TestCorpus::new();
    let engine = corpus.engine();

    // Sentence vector at point(0), one proposition at point(1)
    let receipt = engine
        .ingest(&NewClaim::new(
            "Vaccines contain microchips",
            "https://factcheck.example/chips",
            "No vaccine contains electronics",
            vec![point(0), point(1)],
        ))
        .unwrap();
    assert_eq!(receipt.vector_range.len(), 2);
    engine.ingest(&claim(2)).unwrap();

    // Only the proposition is close
    let matches = engine.match_vectors(&[near(1, 0.3)]).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].claim_text, "Vaccines contain microchips");

    // Both vectors close: still one result
    let matches = engine.match_vectors(&[point(0), point(1)]).unwrap();
    assert_eq!(matches.len(), 1);
}

#[test]
fn test_claim_text_is_normalized_on_ingest() {
    let corpus = TestCorpus::new();
    let engine = corpus.engine();

    let raw = NewClaim::new(
        "<p>The moon\n is &amp; cheese</p>\t",
        "https://factcheck.example/moon",
        "It is rock",
        vec![point(0)],
    )
    .with_strip_markup(true);
    engine.ingest(&raw).unwrap();

    let matches = engine.match_vectors(&[point(0)]).unwrap();
    assert_eq!(matches[0].claim_text, "The moon is & cheese");
}

#[test]
fn test_batch_matching_keeps_only_hits_in_order() {
    let corpus = TestCorpus::new();
    let engine = corpus.engine();
    engine.ingest(&claim(0)).unwrap();
    engine.ingest(&claim(1)).unwrap();

    let far = vec![-50.0; DIM];
    let sentences = vec![
        SentenceEmbeddings {
            sentence: "second claim repeated".to_string(),
            embeddings: vec![far.clone(), near(1, 0.2)],
        },
        SentenceEmbeddings {
            sentence: "unrelated".to_string(),
            embeddings: vec![far],
        },
        SentenceEmbeddings {
            sentence: "first claim repeated".to_string(),
            embeddings: vec![near(0, 0.2)],
        },
    ];

    let matched = engine.match_sentences(&sentences).unwrap();
    let order: Vec<&str> = matched.iter().map(|m| m.sentence.as_str()).collect();
    assert_eq!(order, vec!["second claim repeated", "first claim repeated"]);
    assert_eq!(matched[0].results[0].claim_text, "claim 1");
    assert_eq!(matched[1].results[0].claim_text, "claim 0");
}

#[test]
fn test_bad_dimension_is_rejected_everywhere() {
    let corpus = TestCorpus::new();
    let engine = corpus.engine();
    engine.ingest(&claim(0)).unwrap();

    let short = vec![1.0f32; DIM - 1];
    assert!(matches!(
        engine.match_vectors(&[point(0), short.clone()]),
        Err(MatchError::Vector(_))
    ));

    let bad = NewClaim::new("x", "y", "z", vec![short]);
    assert!(engine.ingest(&bad).is_err());
    assert_eq!(engine.status().unwrap().vectors, 1);
}

#[test]
fn test_claims_survive_reopen() {
    let corpus = TestCorpus::new();
    {
        let engine = corpus.engine();
        engine.ingest(&claim(0)).unwrap();
        engine.ingest(&claim(1)).unwrap();
    }

    let engine = corpus.engine();
    let status = engine.status().unwrap();
    assert_eq!(status.records, 2);
    assert_eq!(status.index.rebuilds, 0, "persisted index should be reused");

    let matches = engine.match_vectors(&[near(1, 0.1)]).unwrap();
    assert_eq!(matches[0].corrective_info, "correction 1");

    // New ids continue after the reopened tail
    let receipt = engine.ingest(&claim(2)).unwrap();
    assert_eq!(receipt.vector_range.start().get(), 3);
    assert_eq!(receipt.record_id.get(), 3);
}

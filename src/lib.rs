/// The main library module for the misinformation claim matcher
pub mod ann;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod io;
pub mod matching;
pub mod records;
pub mod vector;

// Explicit exports for better API clarity
pub use ann::{AnnError, AnnIndex, BuildParams, Metric, Neighbor, SearchParams, build_index};
pub use config::{QueryDuringRebuild, Settings};
pub use engine::{EngineStatus, IngestReceipt, MatchingEngine};
pub use error::{MatchError, MatchResult};
pub use index::{IndexHandle, IndexStats, LoadOutcome, RebuildReason};
pub use ingest::{NewClaim, normalize_claim_text};
pub use matching::{MatchParams, MatchingPipeline, SentenceEmbeddings, SentenceMatches};
pub use records::{ClaimMatch, MisinformationRecord, RecordId, RecordStore, RecordStoreError};
pub use vector::{
    VectorDimension, VectorId, VectorRange, VectorSnapshot, VectorSource, VectorStore,
};

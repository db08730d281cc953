//! Lifecycle of the active ANN index: load, rebuild, swap.

mod handle;

pub use handle::{IndexHandle, IndexStats, LoadOutcome, RebuildReason};

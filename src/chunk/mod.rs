//! Bulk-request decomposition.
//!
//! A single "give me 50 users" request rarely fits one upstream call's
//! output-token budget. [`planner::ChunkPlanner`] estimates per-item cost
//! from the requested shape and sizes the chunks; [`executor::ChunkExecutor`]
//! drives the plan in strict order, threading a consistency summary of
//! prior chunks into each subsequent call so identifiers and style stay
//! coherent across the combined result.

pub mod executor;
pub mod planner;

pub use executor::{ChunkExecutor, ChunkRequest};
pub use planner::{ChunkPlanner, ChunkingStrategy, ShapeComplexity};

use std::hash::{DefaultHasher, Hash, Hasher};

/// Hash key for per-shape memoization.
pub(crate) fn shape_hash(shape: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    shape.hash(&mut hasher);
    hasher.finish()
}

//! The memory engine: entities, scoring, the tiered store, lifecycle sweeps,
//! and retrieval.

pub mod lifecycle;
pub mod scoring;
pub mod search;
pub mod store;
pub mod types;

pub use search::{SearchHit, SearchOptions};
pub use store::{InsertOutcome, MemoryStore};
pub use types::{Category, Emotion, Layer, Memory, MigrationRecord, TemporalPattern};

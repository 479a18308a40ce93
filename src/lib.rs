//! Strata: a bounded, layered memory engine for conversational agents.
//!
//! Content flows through four tiers modeled on human memory consolidation:
//!
//! | Tier | Capacity (default) | Decay unit | Holds |
//! |------|-------------------|------------|-------|
//! | `sensory` | 64 | minutes | raw recent input |
//! | `short_term` | 256 | hours | working context |
//! | `long_term` | 1024 | days | consolidated, vectorized knowledge |
//! | `deep_archive` | 4096 | none | durable milestones |
//!
//! Migration is forward-only and driven by importance scores; every tier is
//! capacity-bounded with lowest-composite-score eviction, so the engine's
//! footprint never grows without bound. Retrieval blends vector similarity
//! over embedded memories with a keyword pass over entities that have no
//! vector yet. Conversations are isolated scopes: switching persists the
//! current working set through a pluggable key-value collaborator and loads
//! the target's.
//!
//! The engine itself is synchronous. The only async component is the optional
//! [`scheduler::MaintenanceScheduler`], which periodically runs decay,
//! migration, conflict-resolution, compression, and expiry sweeps.
//!
//! ```no_run
//! use strata::config::StrataConfig;
//! use strata::events::NullSink;
//! use strata::memory::SearchOptions;
//! use strata::persist::MemoryKv;
//! use strata::subsystem::MemorySubsystem;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut engine = MemorySubsystem::new(
//!     StrataConfig::load()?,
//!     Box::new(MemoryKv::new()),
//!     Box::new(NullSink),
//! )?;
//!
//! engine.add_memory("We agreed to ship the beta on March 1st.", "decision", "user");
//! let hits = engine.search("when does the beta ship", &SearchOptions::default());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod events;
pub mod index;
pub mod memory;
pub mod persist;
pub mod scheduler;
pub mod subsystem;

pub use config::StrataConfig;
pub use error::{Result, StrataError};
pub use events::{EventSink, MemoryEvent, NullSink, RecordingSink};
pub use memory::{Category, Emotion, Layer, Memory, SearchHit, SearchOptions, TemporalPattern};
pub use subsystem::{MaintenanceReport, MemorySubsystem, StoreStats, TierStats};

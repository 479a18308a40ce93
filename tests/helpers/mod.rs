#![allow(dead_code)]

use std::sync::Arc;

use strata::config::StrataConfig;
use strata::events::{NullSink, RecordingSink};
use strata::memory::types::{Layer, Memory};
use strata::persist::MemoryKv;
use strata::subsystem::MemorySubsystem;
use tracing_subscriber::EnvFilter;

/// Capture engine logs in test output; `RUST_LOG` picks the level.
/// Safe to call from every test, only the first call wins.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Engine on in-memory persistence with a shared recording sink.
pub fn engine(config: StrataConfig) -> (MemorySubsystem, Arc<RecordingSink>) {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let engine = MemorySubsystem::new(
        config,
        Box::new(MemoryKv::new()),
        Box::new(Arc::clone(&sink)),
    )
    .expect("default config is valid");
    (engine, sink)
}

/// Engine that discards events.
pub fn quiet_engine(config: StrataConfig) -> MemorySubsystem {
    init_tracing();
    MemorySubsystem::new(config, Box::new(MemoryKv::new()), Box::new(NullSink))
        .expect("default config is valid")
}

/// Tiny tiers so capacity behavior is reachable with a handful of inserts.
pub fn small_tier_config() -> StrataConfig {
    let mut config = StrataConfig::default();
    config.tiers.sensory_capacity = 2;
    config.tiers.short_term_capacity = 2;
    config.tiers.long_term_capacity = 2;
    config.tiers.deep_archive_capacity = 4;
    config
}

/// Promotion thresholds pushed near 1.0 so ingested content stays sensory.
pub fn no_promotion_config() -> StrataConfig {
    let mut config = small_tier_config();
    config.promotion.sensory_to_short = 0.97;
    config.promotion.short_to_long = 0.98;
    config.promotion.long_to_archive = 0.99;
    config
}

/// A memory with everything interesting pinned, for store-level tests.
pub fn memory_with(content: &str, importance: f64, layer: Layer) -> Memory {
    let mut memory = Memory::new(content, "message", "user", "chat-1");
    memory.importance = importance;
    memory.layer = layer;
    memory
}

/// Shift a memory's clocks `days` into the past.
pub fn backdate(memory: &mut Memory, days: i64) {
    let delta = chrono::Duration::days(days);
    memory.timestamp -= delta;
    memory.recency_updated_at -= delta;
}

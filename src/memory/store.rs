//! Four capacity-bounded tiers plus a global id index.
//!
//! The store is the single owner of every resident [`Memory`]. Its contract:
//! a memory lives in exactly one tier, that tier matches the memory's `layer`
//! field, no tier ever exceeds its capacity, and migration moves entities
//! forward only. Eviction under capacity pressure removes the single
//! lowest-scoring resident.

use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

use super::types::{Layer, Memory, MigrationRecord};
use crate::config::TierConfig;

// Composite eviction score weights. The sensory tier has no relevance signal
// yet, so it weighs only importance and recency.
const SENSORY_WEIGHTS: (f64, f64, f64) = (0.6, 0.4, 0.0);
const DEEP_WEIGHTS: (f64, f64, f64) = (0.5, 0.3, 0.2);

/// Outcome of an insert.
#[derive(Debug)]
pub enum InsertOutcome {
    /// Stored; `evicted` carries the memory pushed out to make room, if any.
    Stored { evicted: Option<Memory> },
    /// The tier has zero usable capacity for this entity.
    Rejected,
}

pub struct MemoryStore {
    tiers: [HashMap<String, Memory>; 4],
    /// Global id → tier index for O(1) lookup.
    locations: HashMap<String, Layer>,
    /// Arena of immutable migration records; memories reference entries by
    /// index through `Memory::history`.
    migration_log: Vec<MigrationRecord>,
    capacities: TierConfig,
}

impl MemoryStore {
    pub fn new(capacities: TierConfig) -> Self {
        Self {
            tiers: Default::default(),
            locations: HashMap::new(),
            migration_log: Vec::new(),
            capacities,
        }
    }

    fn tier(&self, layer: Layer) -> &HashMap<String, Memory> {
        &self.tiers[layer.rank()]
    }

    fn tier_mut(&mut self, layer: Layer) -> &mut HashMap<String, Memory> {
        &mut self.tiers[layer.rank()]
    }

    pub fn len(&self, layer: Layer) -> usize {
        self.tier(layer).len()
    }

    pub fn total_len(&self) -> usize {
        self.tiers.iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    pub fn capacity(&self, layer: Layer) -> usize {
        self.capacities.capacity(layer)
    }

    /// Insert into `layer`, evicting the lowest-scoring resident first if the
    /// tier is at capacity. The memory's `layer` field is forced into
    /// agreement with its physical placement.
    pub fn insert(&mut self, layer: Layer, mut memory: Memory) -> InsertOutcome {
        let capacity = self.capacity(layer);
        if capacity == 0 {
            return InsertOutcome::Rejected;
        }

        let evicted = if self.len(layer) >= capacity {
            self.evict(layer)
        } else {
            None
        };

        memory.layer = layer;
        self.locations.insert(memory.id.clone(), layer);
        self.tier_mut(layer).insert(memory.id.clone(), memory);

        InsertOutcome::Stored { evicted }
    }

    /// Remove and return the lowest composite-scoring resident of `layer`.
    pub fn evict(&mut self, layer: Layer) -> Option<Memory> {
        let victim_id = self
            .tier(layer)
            .values()
            .min_by(|a, b| {
                eviction_score(a)
                    .partial_cmp(&eviction_score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|m| m.id.clone())?;

        debug!(id = %victim_id, layer = %layer, "evicting lowest-scoring memory");
        self.remove(&victim_id)
    }

    pub fn get(&self, id: &str) -> Option<&Memory> {
        let layer = *self.locations.get(id)?;
        self.tier(layer).get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Memory> {
        let layer = *self.locations.get(id)?;
        self.tiers[layer.rank()].get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.locations.contains_key(id)
    }

    /// Remove from both the tier collection and the global index.
    pub fn remove(&mut self, id: &str) -> Option<Memory> {
        let layer = self.locations.remove(id)?;
        self.tier_mut(layer).remove(id)
    }

    /// Move a memory one or more tiers forward, recording the migration in
    /// the arena. Backward movement is refused; there is no demotion path.
    pub fn promote(&mut self, id: &str, to: Layer) -> bool {
        let Some(&from) = self.locations.get(id) else {
            return false;
        };
        if to.rank() <= from.rank() {
            return false;
        }

        let Some(mut memory) = self.tier_mut(from).remove(id) else {
            return false;
        };

        let record_index = self.migration_log.len() as u32;
        self.migration_log.push(MigrationRecord {
            memory_id: id.to_string(),
            from,
            to,
            at: Utc::now(),
        });
        memory.history.push(record_index);
        memory.layer = to;

        self.locations.insert(id.to_string(), to);
        self.tier_mut(to).insert(id.to_string(), memory);
        true
    }

    /// Iterate residents of one tier.
    pub fn all_of(&self, layer: Layer) -> impl Iterator<Item = &Memory> {
        self.tier(layer).values()
    }

    /// Iterate every resident across all tiers.
    pub fn iter_all(&self) -> impl Iterator<Item = &Memory> {
        self.tiers.iter().flat_map(|t| t.values())
    }

    /// Resident ids of one tier; sweeps snapshot these and re-validate
    /// presence before mutating, since ingestion may interleave.
    pub fn ids_of(&self, layer: Layer) -> Vec<String> {
        self.tier(layer).keys().cloned().collect()
    }

    pub fn migration_log(&self) -> &[MigrationRecord] {
        &self.migration_log
    }

    pub fn migration_record(&self, index: u32) -> Option<&MigrationRecord> {
        self.migration_log.get(index as usize)
    }

    /// Restore a persisted migration log (conversation switch-in).
    pub fn restore_migration_log(&mut self, log: Vec<MigrationRecord>) {
        self.migration_log = log;
    }

    /// Drop every resident and the arena. Conversation switch-out.
    pub fn clear(&mut self) {
        for tier in &mut self.tiers {
            tier.clear();
        }
        self.locations.clear();
        self.migration_log.clear();
    }
}

/// Composite score used to pick eviction victims — lower goes first.
fn eviction_score(memory: &Memory) -> f64 {
    let (wi, wr, wv) = if memory.layer == Layer::Sensory {
        SENSORY_WEIGHTS
    } else {
        DEEP_WEIGHTS
    };
    memory.importance * wi + memory.recency * wr + memory.relevance * wv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> MemoryStore {
        MemoryStore::new(TierConfig {
            sensory_capacity: 2,
            short_term_capacity: 2,
            long_term_capacity: 2,
            deep_archive_capacity: 2,
        })
    }

    fn memory(content: &str, importance: f64) -> Memory {
        let mut m = Memory::new(content, "message", "user", "chat-1");
        m.importance = importance;
        m
    }

    #[test]
    fn insert_respects_capacity() {
        let mut store = small_store();
        for i in 0..5 {
            store.insert(Layer::Sensory, memory(&format!("m{i}"), 0.5));
            assert!(store.len(Layer::Sensory) <= 2);
        }
    }

    #[test]
    fn eviction_removes_lowest_composite_score() {
        let mut store = small_store();
        let m1 = memory("keep high", 0.9);
        let m2 = memory("evict low", 0.5);
        let m3 = memory("keep mid", 0.7);
        let (id1, id2, id3) = (m1.id.clone(), m2.id.clone(), m3.id.clone());

        store.insert(Layer::Sensory, m1);
        store.insert(Layer::Sensory, m2);
        let outcome = store.insert(Layer::Sensory, m3);

        match outcome {
            InsertOutcome::Stored { evicted: Some(e) } => assert_eq!(e.id, id2),
            other => panic!("expected eviction, got {other:?}"),
        }
        assert!(store.contains(&id1));
        assert!(store.contains(&id3));
        assert!(!store.contains(&id2));
    }

    #[test]
    fn single_residency_holds_through_promotion() {
        let mut store = small_store();
        let m = memory("promoted", 0.9);
        let id = m.id.clone();
        store.insert(Layer::Sensory, m);

        assert!(store.promote(&id, Layer::ShortTerm));
        assert_eq!(store.len(Layer::Sensory), 0);
        assert_eq!(store.len(Layer::ShortTerm), 1);
        assert_eq!(store.get(&id).unwrap().layer, Layer::ShortTerm);
    }

    #[test]
    fn promotion_is_forward_only() {
        let mut store = small_store();
        let m = memory("no demotion", 0.9);
        let id = m.id.clone();
        store.insert(Layer::LongTerm, m);

        assert!(!store.promote(&id, Layer::ShortTerm));
        assert!(!store.promote(&id, Layer::LongTerm));
        assert_eq!(store.get(&id).unwrap().layer, Layer::LongTerm);
        assert!(store.promote(&id, Layer::DeepArchive));
    }

    #[test]
    fn promotion_writes_arena_record() {
        let mut store = small_store();
        let m = memory("with history", 0.9);
        let id = m.id.clone();
        store.insert(Layer::Sensory, m);
        store.promote(&id, Layer::ShortTerm);
        store.promote(&id, Layer::LongTerm);

        let history = &store.get(&id).unwrap().history;
        assert_eq!(history.len(), 2);
        let first = store.migration_record(history[0]).unwrap();
        assert_eq!(first.from, Layer::Sensory);
        assert_eq!(first.to, Layer::ShortTerm);
        let second = store.migration_record(history[1]).unwrap();
        assert_eq!(second.from, Layer::ShortTerm);
        assert_eq!(second.to, Layer::LongTerm);
    }

    #[test]
    fn remove_updates_both_structures() {
        let mut store = small_store();
        let m = memory("gone", 0.5);
        let id = m.id.clone();
        store.insert(Layer::Sensory, m);

        let removed = store.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(!store.contains(&id));
        assert_eq!(store.len(Layer::Sensory), 0);
        assert!(store.remove(&id).is_none());
    }

    #[test]
    fn layer_field_always_matches_container() {
        let mut store = small_store();
        let mut m = memory("mislabeled", 0.5);
        m.layer = Layer::DeepArchive; // wrong on purpose
        let id = m.id.clone();
        store.insert(Layer::ShortTerm, m);

        assert_eq!(store.get(&id).unwrap().layer, Layer::ShortTerm);
        for resident in store.all_of(Layer::ShortTerm) {
            assert_eq!(resident.layer, Layer::ShortTerm);
        }
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = small_store();
        let m = memory("a", 0.9);
        let id = m.id.clone();
        store.insert(Layer::Sensory, m);
        store.promote(&id, Layer::ShortTerm);

        store.clear();
        assert!(store.is_empty());
        assert!(store.migration_log().is_empty());
        assert!(!store.contains(&id));
    }
}

//! The engine facade: ingestion, retrieval, maintenance, and conversation
//! scoping, wired to its collaborators through constructor injection.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StrataConfig;
use crate::embedding::Vectorizer;
use crate::error::Result;
use crate::events::{EventSink, MemoryEvent};
use crate::index::SemanticIndex;
use crate::memory::lifecycle::{
    self, CompressionReport, ConflictReport, DecayReport, ExpiryReport, MigrationReport,
};
use crate::memory::scoring;
use crate::memory::search::{self, SearchHit, SearchOptions};
use crate::memory::store::{InsertOutcome, MemoryStore};
use crate::memory::types::{Layer, Memory, MigrationRecord};
use crate::persist::KvStore;

const DEFAULT_CHAT: &str = "default";

/// Everything one maintenance cycle did.
#[derive(Debug, Default, Serialize)]
pub struct MaintenanceReport {
    pub decay: DecayReport,
    pub migration: MigrationReport,
    pub conflict: ConflictReport,
    pub compression: CompressionReport,
    pub expiry: ExpiryReport,
    /// True when another cycle was already in flight and this one did nothing.
    pub skipped: bool,
}

/// Occupancy and capacity of one tier.
#[derive(Debug, Serialize)]
pub struct TierStats {
    pub resident: usize,
    pub capacity: usize,
}

/// Per-tier resident counts plus engine state, for callers and dashboards.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub sensory: TierStats,
    pub short_term: TierStats,
    pub long_term: TierStats,
    pub deep_archive: TierStats,
    pub total: usize,
    pub indexed: usize,
    pub cached_vectors: usize,
    /// Residents flagged by conflict resolution as contradicted.
    pub outdated: usize,
    /// Residents carrying merged-in provenance.
    pub merged: usize,
    pub active_chat: String,
    pub epoch: u64,
}

/// Snapshot persisted per chat and tier.
#[derive(Serialize, serde::Deserialize)]
struct TierSnapshot {
    memories: Vec<Memory>,
}

pub struct MemorySubsystem {
    config: StrataConfig,
    store: MemoryStore,
    index: SemanticIndex,
    vectorizer: Vectorizer,
    kv: Box<dyn KvStore>,
    sink: Box<dyn EventSink>,
    active_chat: String,
    maintenance_running: bool,
    /// Bumped on every conversation switch so stale cross-scope work can be
    /// detected by schedulers holding an old snapshot.
    epoch: u64,
}

impl MemorySubsystem {
    /// Build an engine from validated configuration plus its two injected
    /// collaborators. Loads any persisted state for the default conversation.
    pub fn new(
        config: StrataConfig,
        kv: Box<dyn KvStore>,
        sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let vectorizer = Vectorizer::from_config(&config.embedding)?;

        let mut subsystem = Self {
            store: MemoryStore::new(config.tiers.clone()),
            index: SemanticIndex::new(),
            vectorizer,
            config,
            kv,
            sink,
            active_chat: DEFAULT_CHAT.to_string(),
            maintenance_running: false,
            epoch: 0,
        };
        subsystem.load_active_chat();
        Ok(subsystem)
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn active_chat(&self) -> &str {
        &self.active_chat
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Ingest one piece of content. Returns the stored (or deduplicated)
    /// memory's id, or `None` when the admissibility filter rejected it.
    pub fn add_memory(&mut self, content: &str, kind: &str, source: &str) -> Option<String> {
        self.add_memory_with(content, kind, source, serde_json::Map::new())
    }

    /// [`add_memory`] with caller-supplied metadata attached to the entity.
    ///
    /// [`add_memory`]: Self::add_memory
    pub fn add_memory_with(
        &mut self,
        content: &str,
        kind: &str,
        source: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Option<String> {
        let content = content.trim();
        if !self.admissible(content) {
            return None;
        }

        let category = scoring::classify_category(content);

        // Near-duplicate of an existing same-category memory: reinforce it
        // instead of adding a second copy.
        let duplicate = self
            .store
            .iter_all()
            .filter(|m| m.category == category && !m.outdated)
            .find(|m| {
                scoring::token_overlap(content, &m.content)
                    > self.config.compression.similarity_threshold
            })
            .map(|m| m.id.clone());
        if let Some(id) = duplicate {
            if let Some(existing) = self.store.get_mut(&id) {
                existing.importance = crate::memory::types::clamp01(existing.importance + 0.1);
                existing.access_count += 1;
                existing.last_accessed = Some(chrono::Utc::now());
            }
            debug!(id, "duplicate content reinforced existing memory");
            return Some(id);
        }

        let mut memory = Memory::new(content, kind, source, &self.active_chat);
        memory.importance = scoring::quick_score(content, kind);
        memory.category = category;
        memory.emotion = scoring::classify_emotion(content);
        memory.metadata = metadata;
        let id = memory.id.clone();
        let importance = memory.importance;

        match self.store.insert(Layer::Sensory, memory) {
            InsertOutcome::Stored { evicted } => {
                if let Some(evicted) = evicted {
                    self.index.remove(&evicted.id);
                }
            }
            InsertOutcome::Rejected => return None,
        }

        // High-signal content skips the sensory waiting room.
        let mut layer = Layer::Sensory;
        if importance >= self.config.promotion.sensory_to_short {
            if self.store.len(Layer::ShortTerm) >= self.store.capacity(Layer::ShortTerm) {
                if let Some(displaced) = self.store.evict(Layer::ShortTerm) {
                    self.index.remove(&displaced.id);
                }
            }
            if self.store.promote(&id, Layer::ShortTerm) {
                layer = Layer::ShortTerm;
            }
        }

        self.sink.emit(MemoryEvent::Added {
            id: id.clone(),
            layer,
        });
        Some(id)
    }

    fn admissible(&self, content: &str) -> bool {
        if content.chars().count() < self.config.ingest.min_content_chars {
            debug!("content below minimum length, rejected");
            return false;
        }
        if self
            .config
            .ingest
            .excluded_patterns
            .iter()
            .any(|p| content.contains(p.as_str()))
        {
            debug!("content matched excluded pattern, rejected");
            return false;
        }
        true
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    pub fn search(&mut self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        search::search(
            &mut self.store,
            &self.index,
            &mut self.vectorizer,
            query,
            options,
        )
    }

    pub fn get(&self, id: &str) -> Option<&Memory> {
        self.store.get(id)
    }

    /// Migration history of one memory, resolved from the store's arena.
    pub fn history_of(&self, id: &str) -> Vec<MigrationRecord> {
        let Some(memory) = self.store.get(id) else {
            return Vec::new();
        };
        memory
            .history
            .iter()
            .filter_map(|&i| self.store.migration_record(i).cloned())
            .collect()
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Run one full maintenance cycle. Re-entrant calls are skipped; the
    /// report says so rather than blocking.
    pub fn run_maintenance(&mut self) -> MaintenanceReport {
        if self.maintenance_running {
            warn!("maintenance already in flight, skipping");
            return MaintenanceReport {
                skipped: true,
                ..MaintenanceReport::default()
            };
        }
        self.maintenance_running = true;

        let now = chrono::Utc::now();
        let report = MaintenanceReport {
            decay: lifecycle::decay_sweep(&mut self.store, &mut self.index, &self.config, now),
            migration: lifecycle::migration_sweep(
                &mut self.store,
                &mut self.index,
                &mut self.vectorizer,
                &self.config,
                self.sink.as_ref(),
            ),
            conflict: lifecycle::conflict_sweep(
                &mut self.store,
                &mut self.index,
                &self.config,
                self.sink.as_ref(),
            ),
            compression: lifecycle::compression_sweep(
                &mut self.store,
                &mut self.index,
                &mut self.vectorizer,
                &self.config,
            ),
            expiry: lifecycle::expiry_sweep(&mut self.store, &mut self.index, &self.config, now),
            skipped: false,
        };

        self.maintenance_running = false;
        report
    }

    // ── Conversation scoping ─────────────────────────────────────────────────

    /// Switch the active conversation. The current scope is persisted, the
    /// working set cleared, and the target scope loaded (empty when never
    /// seen before). Persistence failures degrade to in-memory-only: the
    /// switch still happens.
    pub fn switch_to(&mut self, chat_id: &str) {
        if chat_id == self.active_chat {
            return;
        }

        self.persist_active_chat();

        self.store.clear();
        self.index.clear();
        self.vectorizer.clear_cache();
        self.epoch += 1;
        self.active_chat = chat_id.to_string();

        self.load_active_chat();
        info!(chat = chat_id, epoch = self.epoch, "switched conversation scope");
    }

    /// Persist the active scope without switching away from it.
    pub fn persist_active_chat(&mut self) {
        for layer in Layer::ALL {
            let snapshot = TierSnapshot {
                memories: self.store.all_of(layer).cloned().collect(),
            };
            let key = tier_key(&self.active_chat, layer);
            match serde_json::to_vec(&snapshot) {
                Ok(bytes) => {
                    if let Err(e) = self.kv.set(&key, &bytes) {
                        warn!(key, error = %e, "tier persistence failed, continuing in-memory");
                        self.sink.emit(MemoryEvent::Error {
                            context: "persist".into(),
                            message: e.to_string(),
                        });
                    }
                }
                Err(e) => warn!(key, error = %e, "tier snapshot serialization failed"),
            }
        }

        let key = history_key(&self.active_chat);
        match serde_json::to_vec(self.store.migration_log()) {
            Ok(bytes) => {
                if let Err(e) = self.kv.set(&key, &bytes) {
                    warn!(key, error = %e, "history persistence failed, continuing in-memory");
                }
            }
            Err(e) => warn!(key, error = %e, "history serialization failed"),
        }
    }

    fn load_active_chat(&mut self) {
        let mut vectors = Vec::new();
        for layer in Layer::ALL {
            let key = tier_key(&self.active_chat, layer);
            let bytes = match self.kv.get(&key) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key, error = %e, "tier load failed, starting empty");
                    continue;
                }
            };
            let snapshot: TierSnapshot = match serde_json::from_slice(&bytes) {
                Ok(s) => s,
                Err(e) => {
                    warn!(key, error = %e, "tier snapshot corrupt, starting empty");
                    continue;
                }
            };
            for memory in snapshot.memories {
                if let Some(vector) = &memory.vector {
                    vectors.push((memory.id.clone(), vector.clone()));
                }
                self.store.insert(layer, memory);
            }
        }
        self.index.rebuild(vectors);

        let key = history_key(&self.active_chat);
        if let Ok(Some(bytes)) = self.kv.get(&key) {
            match serde_json::from_slice::<Vec<MigrationRecord>>(&bytes) {
                Ok(log) => self.store.restore_migration_log(log),
                Err(e) => warn!(key, error = %e, "history corrupt, starting empty"),
            }
        }
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn stats(&self) -> StoreStats {
        let tier = |layer| TierStats {
            resident: self.store.len(layer),
            capacity: self.store.capacity(layer),
        };
        StoreStats {
            sensory: tier(Layer::Sensory),
            short_term: tier(Layer::ShortTerm),
            long_term: tier(Layer::LongTerm),
            deep_archive: tier(Layer::DeepArchive),
            total: self.store.total_len(),
            indexed: self.index.len(),
            cached_vectors: self.vectorizer.cache_len(),
            outdated: self.store.iter_all().filter(|m| m.outdated).count(),
            merged: self
                .store
                .iter_all()
                .filter(|m| !m.merged_from.is_empty())
                .count(),
            active_chat: self.active_chat.clone(),
            epoch: self.epoch,
        }
    }
}

fn tier_key(chat: &str, layer: Layer) -> String {
    format!("strata:{chat}:{}", layer.as_str())
}

fn history_key(chat: &str) -> String {
    format!("strata:{chat}:history")
}

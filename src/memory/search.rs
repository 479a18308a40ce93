//! Retrieval across all four tiers.
//!
//! Semantic hits come from the vector index; memories that never got a vector
//! (sensory and short-term residents, or entities whose embedding failed) are
//! still reachable through a keyword pass over their raw content. The two
//! result sets are merged, ranked by similarity, and truncated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::scoring::token_overlap;
use super::store::MemoryStore;
use super::types::Layer;
use crate::embedding::Vectorizer;
use crate::index::SemanticIndex;

/// Caller-tunable knobs for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    /// Minimum similarity for a hit to be returned.
    pub threshold: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 15,
            threshold: 0.3,
        }
    }
}

/// One search result, ordered by descending similarity.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub similarity: f64,
    pub layer: Layer,
    pub timestamp: DateTime<Utc>,
    pub chat_id: String,
    pub importance: f64,
    pub category: super::types::Category,
    /// Caller metadata carried by the memory.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Run a query against every tier. Outdated memories are excluded; a
/// contradicted fact should never surface as if current. Returned memories
/// get their access counters bumped.
pub fn search(
    store: &mut MemoryStore,
    index: &SemanticIndex,
    vectorizer: &mut Vectorizer,
    query: &str,
    options: &SearchOptions,
) -> Vec<SearchHit> {
    let query = query.trim();
    if query.is_empty() || options.max_results == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(String, f64)> = Vec::new();

    // Semantic pass over everything with a vector. Outdated residents are
    // dropped before ranking so they never consume a result slot.
    if let Some(query_vector) = vectorizer.embed(query) {
        for hit in index.query(&query_vector, options.max_results * 2, options.threshold) {
            match store.get(&hit.id) {
                Some(memory) if !memory.outdated => ranked.push((hit.id, hit.similarity)),
                _ => {} // index entry outlived the memory, or the fact was contradicted
            }
        }
    }

    // Keyword pass over vectorless residents.
    for memory in store.iter_all().filter(|m| m.vector.is_none() && !m.outdated) {
        let similarity = token_overlap(query, &memory.content);
        if similarity >= options.threshold {
            ranked.push((memory.id.clone(), similarity));
        }
    }

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(options.max_results);

    let now = Utc::now();
    let mut hits = Vec::with_capacity(ranked.len());
    for (id, similarity) in ranked {
        let Some(memory) = store.get_mut(&id) else {
            continue;
        };
        memory.access_count += 1;
        memory.last_accessed = Some(now);
        hits.push(SearchHit {
            id: memory.id.clone(),
            content: memory.content.clone(),
            similarity,
            layer: memory.layer,
            timestamp: memory.timestamp,
            chat_id: memory.chat_id.clone(),
            importance: memory.importance,
            category: memory.category,
            metadata: memory.metadata.clone(),
        });
    }

    debug!(query, hits = hits.len(), "search done");
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use crate::memory::types::Memory;

    fn harness() -> (MemoryStore, SemanticIndex, Vectorizer) {
        (
            MemoryStore::new(TierConfig::default()),
            SemanticIndex::new(),
            Vectorizer::deterministic(64, 128),
        )
    }

    fn seed(store: &mut MemoryStore, content: &str) -> String {
        let memory = Memory::new(content, "message", "user", "chat-1");
        let id = memory.id.clone();
        store.insert(Layer::Sensory, memory);
        id
    }

    #[test]
    fn keyword_pass_reaches_vectorless_memories() {
        let (mut store, index, mut vectorizer) = harness();
        let id = seed(&mut store, "the project deadline moved to Friday");
        seed(&mut store, "lunch was pasta");

        let hits = search(
            &mut store,
            &index,
            &mut vectorizer,
            "project deadline",
            &SearchOptions::default(),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(store.get(&id).unwrap().access_count, 1);
        assert!(store.get(&id).unwrap().last_accessed.is_some());
    }

    #[test]
    fn outdated_memories_are_suppressed() {
        let (mut store, index, mut vectorizer) = harness();
        let id = seed(&mut store, "the project deadline moved to Friday");
        store.get_mut(&id).unwrap().outdated = true;

        let hits = search(
            &mut store,
            &index,
            &mut vectorizer,
            "project deadline",
            &SearchOptions::default(),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn outdated_hit_does_not_consume_a_result_slot() {
        let (mut store, index, mut vectorizer) = harness();
        let stale = seed(&mut store, "project deadline");
        let current = seed(&mut store, "the project deadline moved to Friday");
        store.get_mut(&stale).unwrap().outdated = true;

        // The stale memory out-ranks the current one on overlap; with a
        // single slot it must still not shadow the admissible hit.
        let options = SearchOptions {
            max_results: 1,
            threshold: 0.3,
        };
        let hits = search(&mut store, &index, &mut vectorizer, "project deadline", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, current);
    }

    #[test]
    fn blank_query_returns_nothing() {
        let (mut store, index, mut vectorizer) = harness();
        seed(&mut store, "anything at all");
        let hits = search(
            &mut store,
            &index,
            &mut vectorizer,
            "   ",
            &SearchOptions::default(),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn results_are_capped_and_sorted() {
        let (mut store, index, mut vectorizer) = harness();
        for i in 0..10 {
            seed(&mut store, &format!("note about rust borrowing rule {i}"));
        }
        let options = SearchOptions {
            max_results: 3,
            threshold: 0.1,
        };
        let hits = search(&mut store, &index, &mut vectorizer, "rust borrowing", &options);
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }
}

//! Lifecycle sweeps: decay, migration, expiry, conflict resolution, and
//! compression.
//!
//! Each sweep snapshots resident ids first and re-validates presence before
//! mutating, because ingestion may interleave with maintenance. A failure on
//! one entity is logged and skipped; no error aborts the remaining work, and
//! every sweep is safe to re-run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::scoring::{self, ScoreContext};
use super::store::MemoryStore;
use super::types::{clamp01, Category, Layer, Memory};
use crate::config::StrataConfig;
use crate::embedding::Vectorizer;
use crate::events::{EventSink, MemoryEvent};
use crate::index::{cosine_similarity, SemanticIndex};

/// How many recent short-term memories feed the deep-scoring context.
const CONTEXT_WINDOW: usize = 5;

/// Negation markers for the narrow assertion-vs-negation conflict check.
const NEGATION_TOKENS: &[&str] = &["not", "no", "never", "isnt", "arent", "wasnt", "dont", "doesnt", "didnt", "wont", "cant"];

// ── Sweep result types ───────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
pub struct DecayReport {
    pub decayed: usize,
    /// Sensory memories forgotten outright after falling below the floor.
    pub forgotten: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct MigrationReport {
    pub promoted: usize,
    /// Evictions forced in destination tiers to make room.
    pub displaced: usize,
    /// Promotions into deep tiers that got a vector attached.
    pub vectorized: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct ExpiryReport {
    pub expired: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct ConflictReport {
    /// Cross-category conflicts resolved by deleting the loser.
    pub resolved: usize,
    /// Negation conflicts resolved by flagging the older entity.
    pub outdated: usize,
    /// True when the resident count exceeded the scan ceiling and the sweep
    /// was skipped.
    pub skipped: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct CompressionReport {
    pub clusters: usize,
    /// Memories folded into survivors and deleted.
    pub merged: usize,
}

// ── Decay ────────────────────────────────────────────────────────────────────

/// Multiply recency by `rate^elapsed_units` per tier. Units differ by tier:
/// minutes for sensory, hours for short-term, days for long-term; the archive
/// does not decay. Sensory entities below the floor are forgotten outright.
pub fn decay_sweep(
    store: &mut MemoryStore,
    index: &mut SemanticIndex,
    config: &StrataConfig,
    now: DateTime<Utc>,
) -> DecayReport {
    let mut report = DecayReport::default();

    for (layer, rate) in [
        (Layer::Sensory, config.decay.sensory_rate),
        (Layer::ShortTerm, config.decay.short_term_rate),
        (Layer::LongTerm, config.decay.long_term_rate),
    ] {
        for id in store.ids_of(layer) {
            let Some(memory) = store.get_mut(&id) else {
                continue; // removed since the snapshot
            };
            if memory.layer != layer {
                continue; // migrated since the snapshot
            }

            let elapsed = now - memory.recency_updated_at;
            let units = elapsed_units(layer, elapsed);
            if units <= 0.0 {
                continue;
            }

            memory.recency = clamp01(memory.recency * rate.powf(units));
            memory.recency_updated_at = now;
            report.decayed += 1;

            if layer == Layer::Sensory && memory.recency < config.decay.sensory_floor {
                store.remove(&id);
                index.remove(&id);
                report.forgotten += 1;
            }
        }
    }

    debug!(decayed = report.decayed, forgotten = report.forgotten, "decay sweep done");
    report
}

fn elapsed_units(layer: Layer, elapsed: chrono::Duration) -> f64 {
    let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
    match layer {
        Layer::Sensory => seconds / 60.0,
        Layer::ShortTerm => seconds / 3600.0,
        Layer::LongTerm => seconds / 86_400.0,
        Layer::DeepArchive => 0.0,
    }
}

// ── Migration ────────────────────────────────────────────────────────────────

/// Promote residents meeting the next tier's importance threshold, evicting
/// from the destination when full. Promotions into long-term or the archive
/// trigger deep processing.
pub fn migration_sweep(
    store: &mut MemoryStore,
    index: &mut SemanticIndex,
    vectorizer: &mut Vectorizer,
    config: &StrataConfig,
    sink: &dyn EventSink,
) -> MigrationReport {
    let mut report = MigrationReport::default();

    // Highest tier first so one sweep moves an entity at most one step.
    for (layer, threshold) in [
        (Layer::LongTerm, config.promotion.long_to_archive),
        (Layer::ShortTerm, config.promotion.short_to_long),
        (Layer::Sensory, config.promotion.sensory_to_short),
    ] {
        let destination = layer.next().expect("non-archive tier has a successor");

        for id in store.ids_of(layer) {
            let Some(memory) = store.get(&id) else {
                continue;
            };
            if memory.layer != layer || memory.importance < threshold {
                continue;
            }

            if promote_one(store, index, vectorizer, config, sink, &id, layer, destination, &mut report) {
                report.promoted += 1;
            }
        }
    }

    if report.promoted > 0 {
        info!(
            promoted = report.promoted,
            displaced = report.displaced,
            "migration sweep done"
        );
    }
    report
}

#[allow(clippy::too_many_arguments)]
fn promote_one(
    store: &mut MemoryStore,
    index: &mut SemanticIndex,
    vectorizer: &mut Vectorizer,
    config: &StrataConfig,
    sink: &dyn EventSink,
    id: &str,
    from: Layer,
    to: Layer,
    report: &mut MigrationReport,
) -> bool {
    if store.len(to) >= store.capacity(to) {
        if let Some(displaced) = store.evict(to) {
            index.remove(&displaced.id);
            report.displaced += 1;
        }
    }

    if !store.promote(id, to) {
        return false;
    }

    if to.is_deep() {
        if deep_process(store, vectorizer, config, id) {
            report.vectorized += 1;
        }
        if let Some(memory) = store.get(id) {
            if let Some(vector) = &memory.vector {
                index.add(id, vector.clone());
            }
        }
    }

    sink.emit(MemoryEvent::Migrated {
        id: id.to_string(),
        from,
        to,
    });
    true
}

/// Deep processing on entry to a deep tier: recompute importance with the
/// full scorer, re-classify, compute relevance against recent memories, and
/// attach a vector. Embedding failure leaves the vector unset; the memory
/// stays reachable through keyword search.
///
/// Returns true when a vector was attached.
fn deep_process(
    store: &mut MemoryStore,
    vectorizer: &mut Vectorizer,
    config: &StrataConfig,
    id: &str,
) -> bool {
    let Some(memory) = store.get(id) else {
        return false;
    };
    let content = memory.content.clone();
    let created_at = memory.timestamp;

    let recent = recent_contents(store, CONTEXT_WINDOW, id);

    let importance = {
        let shared = std::cell::RefCell::new(&mut *vectorizer);
        let sim = |a: &str, b: &str| shared.borrow_mut().similarity(a, b);
        let context = ScoreContext {
            recent: &recent,
            similarity: &sim,
        };
        scoring::deep_score(&content, &context)
    };

    let relevance = if recent.is_empty() {
        0.0
    } else {
        clamp01(
            recent
                .iter()
                .map(|r| vectorizer.similarity(&content, r))
                .sum::<f64>()
                / recent.len() as f64,
        )
    };

    let similar_count = count_similar(store, &content, id, config.compression.similarity_threshold);
    let vector = vectorizer.embed(&content);
    let vectorized = vector.is_some();
    if vector.is_none() {
        warn!(id, "deep processing produced no vector; keyword search only");
    }

    if let Some(memory) = store.get_mut(id) {
        memory.importance = clamp01(importance.max(memory.importance));
        memory.relevance = relevance;
        memory.category = scoring::classify_category(&content);
        memory.emotion = scoring::classify_emotion(&content);
        memory.temporal =
            scoring::classify_temporal(created_at, Utc::now(), similar_count, memory.importance);
        memory.vector = vector;
    }

    vectorized
}

/// Most recent short-term contents, newest first, excluding `skip_id`.
fn recent_contents(store: &MemoryStore, limit: usize, skip_id: &str) -> Vec<String> {
    let mut recents: Vec<&Memory> = store
        .all_of(Layer::ShortTerm)
        .filter(|m| m.id != skip_id)
        .collect();
    recents.sort_by_key(|m| std::cmp::Reverse(m.timestamp));
    recents
        .into_iter()
        .take(limit)
        .map(|m| m.content.clone())
        .collect()
}

fn count_similar(store: &MemoryStore, content: &str, skip_id: &str, threshold: f64) -> usize {
    store
        .iter_all()
        .filter(|m| m.id != skip_id)
        .filter(|m| scoring::token_overlap(content, &m.content) > threshold)
        .count()
}

// ── Expiry ───────────────────────────────────────────────────────────────────

/// Remove entities that are both old and unimportant.
pub fn expiry_sweep(
    store: &mut MemoryStore,
    index: &mut SemanticIndex,
    config: &StrataConfig,
    now: DateTime<Utc>,
) -> ExpiryReport {
    let max_age = chrono::Duration::days(config.retention.max_age_days as i64);
    let floor = config.retention.low_importance_floor;
    let mut report = ExpiryReport::default();

    for layer in Layer::ALL {
        for id in store.ids_of(layer) {
            let Some(memory) = store.get(&id) else {
                continue;
            };
            if memory.age(now) > max_age && memory.importance < floor {
                store.remove(&id);
                index.remove(&id);
                report.expired += 1;
            }
        }
    }

    if report.expired > 0 {
        info!(expired = report.expired, "expiry sweep done");
    }
    report
}

// ── Conflict resolution ──────────────────────────────────────────────────────

/// Pairwise conflict detection across all residents, bounded by the scan
/// ceiling. Two flavors:
///
/// - similarity above threshold with *different* categories: the higher-
///   importance entity wins, absorbs the loser into `merged_from`, and the
///   loser is deleted;
/// - an assertion and its negation: the chronologically older entity is
///   flagged `outdated` and both remain.
pub fn conflict_sweep(
    store: &mut MemoryStore,
    index: &mut SemanticIndex,
    config: &StrataConfig,
    sink: &dyn EventSink,
) -> ConflictReport {
    let mut report = ConflictReport::default();

    let total = store.total_len();
    if total > config.conflict.scan_ceiling {
        warn!(
            total,
            ceiling = config.conflict.scan_ceiling,
            "resident count exceeds scan ceiling, skipping conflict sweep"
        );
        report.skipped = true;
        return report;
    }

    let ids: Vec<String> = store.iter_all().map(|m| m.id.clone()).collect();

    for anchor_id in &ids {
        // Re-validate: the anchor may have lost an earlier round.
        let Some(anchor) = store.get(anchor_id) else {
            continue;
        };
        let anchor_snapshot = ConflictCandidate::of(anchor);

        // Rank the anchor's most similar neighbors, capped.
        let mut neighbors: Vec<(String, f64)> = store
            .iter_all()
            .filter(|m| m.id != *anchor_id)
            .map(|m| (m.id.clone(), pair_similarity(&anchor_snapshot, m)))
            .filter(|(_, sim)| *sim > config.conflict.similarity_threshold)
            .collect();
        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(config.conflict.neighbor_cap);

        for (other_id, _sim) in neighbors {
            // The anchor may have lost a previous pairing in this loop; a
            // removed anchor must never keep winning through its snapshot.
            let Some(anchor) = store.get(anchor_id) else {
                break;
            };
            let anchor_snapshot = ConflictCandidate::of(anchor);
            let Some(other) = store.get(&other_id) else {
                continue;
            };
            let other_snapshot = ConflictCandidate::of(other);

            if is_negation_pair(&anchor_snapshot.content, &other_snapshot.content) {
                let older_id = if anchor_snapshot.timestamp <= other_snapshot.timestamp {
                    anchor_id.clone()
                } else {
                    other_id.clone()
                };
                let newer_id = if older_id == *anchor_id {
                    other_id.clone()
                } else {
                    anchor_id.clone()
                };
                if let Some(older) = store.get_mut(&older_id) {
                    if !older.outdated {
                        older.outdated = true;
                        report.outdated += 1;
                        sink.emit(MemoryEvent::ConflictResolved {
                            kept: newer_id,
                            dropped: older_id.clone(),
                            outdated: true,
                        });
                    }
                }
            } else if anchor_snapshot.category != other_snapshot.category {
                let (winner_id, loser_id) =
                    if anchor_snapshot.importance >= other_snapshot.importance {
                        (anchor_id.clone(), other_id.clone())
                    } else {
                        (other_id.clone(), anchor_id.clone())
                    };

                let Some(loser) = store.remove(&loser_id) else {
                    continue;
                };
                index.remove(&loser_id);

                if let Some(winner) = store.get_mut(&winner_id) {
                    winner.merged_from.push(loser.id.clone());
                    // A loser that previously absorbed memories hands its
                    // whole chain over, so no provenance is orphaned.
                    winner.merged_from.extend(loser.merged_from.iter().cloned());
                    let losses = winner
                        .metadata
                        .entry("resolved_conflicts")
                        .or_insert_with(|| serde_json::Value::Array(Vec::new()));
                    if let Some(arr) = losses.as_array_mut() {
                        arr.push(serde_json::json!({
                            "id": loser.id,
                            "content": loser.content,
                            "timestamp": loser.timestamp.to_rfc3339(),
                        }));
                        if let Some(prior) = loser
                            .metadata
                            .get("resolved_conflicts")
                            .and_then(|v| v.as_array())
                        {
                            arr.extend(prior.iter().cloned());
                        }
                    }
                }

                report.resolved += 1;
                sink.emit(MemoryEvent::ConflictResolved {
                    kept: winner_id,
                    dropped: loser_id,
                    outdated: false,
                });
            }
        }
    }

    if report.resolved > 0 || report.outdated > 0 {
        info!(
            resolved = report.resolved,
            outdated = report.outdated,
            "conflict sweep done"
        );
    }
    report
}

struct ConflictCandidate {
    content: String,
    category: Category,
    importance: f64,
    timestamp: DateTime<Utc>,
    vector: Option<Vec<f32>>,
}

impl ConflictCandidate {
    fn of(memory: &Memory) -> Self {
        Self {
            content: memory.content.clone(),
            category: memory.category,
            importance: memory.importance,
            timestamp: memory.timestamp,
            vector: memory.vector.clone(),
        }
    }
}

/// Cosine when both sides carry vectors, token overlap otherwise.
fn pair_similarity(a: &ConflictCandidate, b: &Memory) -> f64 {
    match (&a.vector, &b.vector) {
        (Some(va), Some(vb)) => cosine_similarity(va, vb),
        _ => scoring::token_overlap(&a.content, &b.content),
    }
}

/// True when the two texts have identical word sets apart from negation
/// markers, and exactly one side carries a negation.
fn is_negation_pair(a: &str, b: &str) -> bool {
    let (words_a, neg_a) = split_negations(a);
    let (words_b, neg_b) = split_negations(b);
    (neg_a != neg_b) && !words_a.is_empty() && words_a == words_b
}

fn split_negations(text: &str) -> (std::collections::BTreeSet<String>, bool) {
    let mut words = std::collections::BTreeSet::new();
    let mut negated = false;
    for token in text.split_whitespace() {
        let clean: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if clean.is_empty() {
            continue;
        }
        if NEGATION_TOKENS.contains(&clean.as_str()) {
            negated = true;
        } else {
            words.insert(clean);
        }
    }
    (words, negated)
}

// ── Compression ──────────────────────────────────────────────────────────────

/// Collapse clusters of near-duplicate long-term/archive memories into one
/// surviving entity with a sentence-deduplicated merged summary.
pub fn compression_sweep(
    store: &mut MemoryStore,
    index: &mut SemanticIndex,
    vectorizer: &mut Vectorizer,
    config: &StrataConfig,
) -> CompressionReport {
    let mut report = CompressionReport::default();

    for layer in [Layer::LongTerm, Layer::DeepArchive] {
        let ids = store.ids_of(layer);
        let mut consumed: std::collections::HashSet<String> = std::collections::HashSet::new();

        for anchor_id in &ids {
            if consumed.contains(anchor_id) {
                continue;
            }
            let Some(anchor) = store.get(anchor_id) else {
                continue;
            };
            let anchor_snapshot = ConflictCandidate::of(anchor);

            let cluster: Vec<String> = ids
                .iter()
                .filter(|id| *id != anchor_id && !consumed.contains(*id))
                .filter_map(|id| store.get(id))
                .filter(|m| {
                    pair_similarity(&anchor_snapshot, m) > config.compression.similarity_threshold
                })
                .map(|m| m.id.clone())
                .collect();

            // anchor + neighbors
            if cluster.len() + 1 < config.compression.min_cluster_size {
                continue;
            }
            report.clusters += 1;

            // Highest-importance member survives.
            let mut member_ids = vec![anchor_id.clone()];
            member_ids.extend(cluster.iter().cloned());
            let survivor_id = member_ids
                .iter()
                .filter_map(|id| store.get(id))
                .max_by(|a, b| {
                    a.importance
                        .partial_cmp(&b.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|m| m.id.clone())
                .expect("cluster is nonempty");

            let merged_content = merge_contents(
                member_ids.iter().filter_map(|id| store.get(id)),
                config.compression.sentence_dedup_threshold,
            );

            let mut absorbed = Vec::new();
            for id in &member_ids {
                if *id == survivor_id {
                    continue;
                }
                if let Some(loser) = store.remove(id) {
                    index.remove(id);
                    absorbed.push(loser.id);
                    report.merged += 1;
                }
                consumed.insert(id.clone());
            }
            consumed.insert(survivor_id.clone());

            let survivor_vector = vectorizer.embed(&merged_content);
            if let Some(survivor) = store.get_mut(&survivor_id) {
                survivor.content = merged_content;
                survivor.merged_from.extend(absorbed);
                survivor.vector = survivor_vector;
            }
            if let Some(survivor) = store.get(&survivor_id) {
                match &survivor.vector {
                    Some(v) => index.add(&survivor_id, v.clone()),
                    None => {
                        index.remove(&survivor_id);
                    }
                }
            }
        }
    }

    if report.clusters > 0 {
        info!(
            clusters = report.clusters,
            merged = report.merged,
            "compression sweep done"
        );
    }
    report
}

/// Concatenate member contents sentence by sentence, skipping sentences too
/// similar to one already kept.
fn merge_contents<'a>(
    members: impl Iterator<Item = &'a Memory>,
    dedup_threshold: f64,
) -> String {
    let mut kept: Vec<String> = Vec::new();

    for member in members {
        for sentence in member.content.split_inclusive(['.', '!', '?']) {
            let trimmed = sentence.trim();
            if trimmed.is_empty() {
                continue;
            }
            let duplicate = kept
                .iter()
                .any(|existing| scoring::token_overlap(existing, trimmed) > dedup_threshold);
            if !duplicate {
                kept.push(trimmed.to_string());
            }
        }
    }

    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_pair_detection() {
        assert!(is_negation_pair(
            "Paris is the capital of France",
            "Paris is not the capital of France"
        ));
        assert!(!is_negation_pair(
            "Paris is the capital of France",
            "Lyon is the capital of France"
        ));
        // Both negated: no conflict.
        assert!(!is_negation_pair("it is not ready", "it is not ready"));
        assert!(!is_negation_pair("", "not"));
    }

    #[test]
    fn elapsed_units_per_tier() {
        let hour = chrono::Duration::hours(1);
        assert!((elapsed_units(Layer::Sensory, hour) - 60.0).abs() < 1e-9);
        assert!((elapsed_units(Layer::ShortTerm, hour) - 1.0).abs() < 1e-9);
        assert!(elapsed_units(Layer::LongTerm, hour) < 0.05);
        assert_eq!(elapsed_units(Layer::DeepArchive, hour), 0.0);
    }

    #[test]
    fn merge_contents_dedupes_sentences() {
        let mut a = Memory::new("The deadline is Friday. We agreed on scope.", "fact", "user", "c");
        let b = Memory::new("The deadline is Friday. Budget is approved.", "fact", "user", "c");
        a.importance = 0.9;

        let merged = merge_contents([&a, &b].into_iter(), 0.7);
        assert_eq!(
            merged.matches("deadline").count(),
            1,
            "duplicate sentence kept: {merged}"
        );
        assert!(merged.contains("scope"));
        assert!(merged.contains("Budget"));
    }
}

//! Sweep behavior against a hand-built store: decay, migration, conflict
//! resolution, compression, and expiry.

mod helpers;

use chrono::Utc;
use strata::config::StrataConfig;
use strata::embedding::Vectorizer;
use strata::events::{MemoryEvent, NullSink, RecordingSink};
use strata::index::SemanticIndex;
use strata::memory::lifecycle;
use strata::memory::store::MemoryStore;
use strata::memory::types::{Category, Layer};

fn harness(config: &StrataConfig) -> (MemoryStore, SemanticIndex, Vectorizer) {
    helpers::init_tracing();
    (
        MemoryStore::new(config.tiers.clone()),
        SemanticIndex::new(),
        Vectorizer::deterministic(config.embedding.dimensions, 256),
    )
}

#[test]
fn decay_lowers_recency_and_forgets_faded_sensory() {
    let config = StrataConfig::default();
    let (mut store, mut index, _) = harness(&config);
    let now = Utc::now();

    let mut faded = helpers::memory_with("a fleeting sensory impression", 0.1, Layer::Sensory);
    faded.recency_updated_at = now - chrono::Duration::minutes(30);
    let faded_id = faded.id.clone();

    let mut fresh = helpers::memory_with("a newer sensory impression", 0.1, Layer::Sensory);
    fresh.recency_updated_at = now - chrono::Duration::minutes(3);
    let fresh_id = fresh.id.clone();

    let mut working = helpers::memory_with("a short-term working note", 0.5, Layer::ShortTerm);
    working.recency_updated_at = now - chrono::Duration::hours(4);
    let working_id = working.id.clone();

    store.insert(Layer::Sensory, faded);
    store.insert(Layer::Sensory, fresh);
    store.insert(Layer::ShortTerm, working);

    let report = lifecycle::decay_sweep(&mut store, &mut index, &config, now);

    // 0.9^30 falls below the 0.1 floor; 0.9^3 does not.
    assert!(store.get(&faded_id).is_none());
    assert_eq!(report.forgotten, 1);
    let fresh = store.get(&fresh_id).unwrap();
    assert!(fresh.recency < 1.0 && fresh.recency > 0.5);

    // Short-term decays in hours and is never forgotten by decay alone.
    let working = store.get(&working_id).unwrap();
    assert!(working.recency < 1.0);
    assert_eq!(working.recency_updated_at, now);

    // Re-running immediately is a no-op: no time has passed.
    let recency_before = store.get(&fresh_id).unwrap().recency;
    lifecycle::decay_sweep(&mut store, &mut index, &config, now);
    assert_eq!(store.get(&fresh_id).unwrap().recency, recency_before);
}

#[test]
fn migration_moves_one_tier_per_sweep_and_vectorizes_deep_entries() {
    let config = StrataConfig::default();
    let (mut store, mut index, mut vectorizer) = harness(&config);

    let memory = helpers::memory_with(
        "the architecture review concluded the service splits into two deployables",
        0.7,
        Layer::Sensory,
    );
    let id = memory.id.clone();
    store.insert(Layer::Sensory, memory);

    let report =
        lifecycle::migration_sweep(&mut store, &mut index, &mut vectorizer, &config, &NullSink);
    assert_eq!(report.promoted, 1);
    assert_eq!(store.get(&id).unwrap().layer, Layer::ShortTerm);
    assert!(!index.contains(&id));

    // Second sweep reaches long-term and triggers deep processing.
    lifecycle::migration_sweep(&mut store, &mut index, &mut vectorizer, &config, &NullSink);
    let promoted = store.get(&id).unwrap();
    assert_eq!(promoted.layer, Layer::LongTerm);
    assert!(promoted.vector.is_some());
    assert!(index.contains(&id));
    assert!(promoted.importance >= 0.7, "deep scoring never lowers importance");

    // 0.7 is below the archive threshold: a third sweep changes nothing.
    lifecycle::migration_sweep(&mut store, &mut index, &mut vectorizer, &config, &NullSink);
    assert_eq!(store.get(&id).unwrap().layer, Layer::LongTerm);

    // Both hops are on record, in order.
    let history = &store.get(&id).unwrap().history;
    assert_eq!(history.len(), 2);
    let first = store.migration_record(history[0]).unwrap();
    let second = store.migration_record(history[1]).unwrap();
    assert_eq!((first.from, first.to), (Layer::Sensory, Layer::ShortTerm));
    assert_eq!((second.from, second.to), (Layer::ShortTerm, Layer::LongTerm));
}

#[test]
fn migration_events_name_both_tiers() {
    let config = StrataConfig::default();
    let (mut store, mut index, mut vectorizer) = harness(&config);
    let memory = helpers::memory_with("a promotable observation", 0.5, Layer::Sensory);
    let id = memory.id.clone();
    store.insert(Layer::Sensory, memory);

    let sink = RecordingSink::new();
    lifecycle::migration_sweep(&mut store, &mut index, &mut vectorizer, &config, &sink);
    assert_eq!(
        sink.drain(),
        vec![MemoryEvent::Migrated {
            id,
            from: Layer::Sensory,
            to: Layer::ShortTerm,
        }]
    );
}

#[test]
fn negation_conflict_marks_the_older_memory_outdated() {
    let config = StrataConfig::default();
    let (mut store, mut index, _) = harness(&config);

    let mut older = helpers::memory_with(
        "Paris is not the capital of France",
        0.6,
        Layer::LongTerm,
    );
    helpers::backdate(&mut older, 2);
    older.category = Category::Semantic;
    let older_id = older.id.clone();

    let mut newer =
        helpers::memory_with("Paris is the capital of France", 0.6, Layer::LongTerm);
    newer.category = Category::Semantic;
    let newer_id = newer.id.clone();

    store.insert(Layer::LongTerm, older);
    store.insert(Layer::LongTerm, newer);

    let report = lifecycle::conflict_sweep(&mut store, &mut index, &config, &NullSink);

    assert_eq!(report.outdated, 1);
    assert_eq!(report.resolved, 0);
    assert!(store.get(&older_id).unwrap().outdated);
    assert!(!store.get(&newer_id).unwrap().outdated);
}

#[test]
fn cross_category_conflict_keeps_the_more_important_memory() {
    let config = StrataConfig::default();
    let (mut store, mut index, _) = harness(&config);

    let mut winner = helpers::memory_with(
        "the deployment pipeline gates on the integration suite",
        0.9,
        Layer::LongTerm,
    );
    winner.category = Category::Procedural;
    let winner_id = winner.id.clone();

    let mut loser = helpers::memory_with(
        "the deployment pipeline gates on the integration suite",
        0.2,
        Layer::LongTerm,
    );
    loser.category = Category::Contextual;
    let loser_id = loser.id.clone();

    store.insert(Layer::LongTerm, winner);
    store.insert(Layer::LongTerm, loser);

    let sink = RecordingSink::new();
    let report = lifecycle::conflict_sweep(&mut store, &mut index, &config, &sink);

    assert_eq!(report.resolved, 1);
    assert!(store.get(&loser_id).is_none());
    let winner = store.get(&winner_id).unwrap();
    assert!(winner.merged_from.contains(&loser_id));
    assert!(winner.metadata.contains_key("resolved_conflicts"));
    assert!(sink.drain().iter().any(|e| matches!(
        e,
        MemoryEvent::ConflictResolved { outdated: false, .. }
    )));
}

#[test]
fn chained_conflicts_never_orphan_provenance() {
    // Bridge topology: `bridge` is similar to both `strong` and `weak`
    // (cos 25 deg ~ 0.906) while strong and weak sit below the threshold
    // (cos 50 deg ~ 0.64). Whichever pairing resolves first, every deleted
    // memory must end up in a surviving memory's merged_from chain.
    for _ in 0..40 {
        let config = StrataConfig::default();
        let (mut store, mut index, _) = harness(&config);

        let mut bridge =
            helpers::memory_with("the rollout window shifted", 0.5, Layer::LongTerm);
        bridge.category = Category::Contextual;
        bridge.vector = Some(vec![1.0, 0.0]);

        let mut strong =
            helpers::memory_with("release gating stays manual", 0.9, Layer::LongTerm);
        strong.category = Category::Procedural;
        strong.vector = Some(vec![0.9063, 0.4226]);

        let mut weak = helpers::memory_with("the demo ran on staging", 0.1, Layer::LongTerm);
        weak.category = Category::Episodic;
        weak.vector = Some(vec![0.9063, -0.4226]);

        let ids = [bridge.id.clone(), strong.id.clone(), weak.id.clone()];
        store.insert(Layer::LongTerm, bridge);
        store.insert(Layer::LongTerm, strong);
        store.insert(Layer::LongTerm, weak);

        lifecycle::conflict_sweep(&mut store, &mut index, &config, &NullSink);

        let absorbed: Vec<String> = store
            .iter_all()
            .flat_map(|m| m.merged_from.iter().cloned())
            .collect();
        for id in &ids {
            assert!(
                store.get(id).is_some() || absorbed.contains(id),
                "memory deleted with no surviving provenance"
            );
        }
    }
}

#[test]
fn conflict_sweep_skips_oversized_scopes() {
    let mut config = StrataConfig::default();
    config.conflict.scan_ceiling = 1;
    let (mut store, mut index, _) = harness(&config);

    for i in 0..3 {
        store.insert(
            Layer::ShortTerm,
            helpers::memory_with(&format!("note number {i}"), 0.5, Layer::ShortTerm),
        );
    }

    let report = lifecycle::conflict_sweep(&mut store, &mut index, &config, &NullSink);
    assert!(report.skipped);
    assert_eq!(store.total_len(), 3);
}

#[test]
fn compression_merges_near_duplicate_clusters() {
    let config = StrataConfig::default();
    let (mut store, mut index, mut vectorizer) = harness(&config);

    let mut ids = Vec::new();
    for importance in [0.9, 0.4, 0.3] {
        let memory = helpers::memory_with(
            "The nightly backup job runs at two in the morning.",
            importance,
            Layer::LongTerm,
        );
        ids.push(memory.id.clone());
        store.insert(Layer::LongTerm, memory);
    }
    // An unrelated resident must survive untouched.
    let bystander = helpers::memory_with("the office plant needs watering", 0.5, Layer::LongTerm);
    let bystander_id = bystander.id.clone();
    store.insert(Layer::LongTerm, bystander);

    let report =
        lifecycle::compression_sweep(&mut store, &mut index, &mut vectorizer, &config);

    assert_eq!(report.clusters, 1);
    assert_eq!(report.merged, 2);
    assert!(store.get(&bystander_id).is_some());

    // Highest importance survives, carrying provenance and a fresh vector.
    let survivor = store.get(&ids[0]).unwrap();
    assert_eq!(survivor.merged_from.len(), 2);
    assert!(survivor.vector.is_some());
    assert!(index.contains(&ids[0]));
    assert!(store.get(&ids[1]).is_none());
    assert!(store.get(&ids[2]).is_none());
    // The identical sentence collapsed to a single copy.
    assert_eq!(survivor.content.matches("nightly").count(), 1);
}

#[test]
fn small_clusters_are_left_alone() {
    let config = StrataConfig::default();
    let (mut store, mut index, mut vectorizer) = harness(&config);

    for importance in [0.6, 0.5] {
        store.insert(
            Layer::LongTerm,
            helpers::memory_with(
                "The nightly backup job runs at two in the morning.",
                importance,
                Layer::LongTerm,
            ),
        );
    }

    let report =
        lifecycle::compression_sweep(&mut store, &mut index, &mut vectorizer, &config);
    assert_eq!(report.clusters, 0);
    assert_eq!(store.total_len(), 2);
}

#[test]
fn expiry_removes_only_old_and_unimportant_memories() {
    let config = StrataConfig::default();
    let (mut store, mut index, _) = harness(&config);
    let now = Utc::now();

    let mut stale = helpers::memory_with("an old trivial aside", 0.05, Layer::LongTerm);
    helpers::backdate(&mut stale, 120);
    let stale_id = stale.id.clone();

    let mut old_but_important =
        helpers::memory_with("the founding design decision", 0.9, Layer::LongTerm);
    helpers::backdate(&mut old_but_important, 120);
    let keeper_id = old_but_important.id.clone();

    let mut recent_and_trivial =
        helpers::memory_with("a new trivial aside", 0.05, Layer::LongTerm);
    helpers::backdate(&mut recent_and_trivial, 2);
    let recent_id = recent_and_trivial.id.clone();

    store.insert(Layer::LongTerm, stale);
    store.insert(Layer::LongTerm, old_but_important);
    store.insert(Layer::LongTerm, recent_and_trivial);

    let report = lifecycle::expiry_sweep(&mut store, &mut index, &config, now);

    assert_eq!(report.expired, 1);
    assert!(store.get(&stale_id).is_none());
    assert!(store.get(&keeper_id).is_some());
    assert!(store.get(&recent_id).is_some());
}

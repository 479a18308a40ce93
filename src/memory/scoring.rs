//! Importance scoring and rule-based classification.
//!
//! Everything here is a pure function over content and context. Scores are
//! always clamped to `[0, 1]` and nothing in this module can fail outward: a
//! degenerate input yields the neutral default rather than an error.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::types::{clamp01, Category, Emotion, TemporalPattern};

/// Neutral importance used when a score cannot be computed.
pub const DEFAULT_IMPORTANCE: f64 = 0.4;

/// Importance at or above which a memory counts as a milestone.
pub const MILESTONE_IMPORTANCE: f64 = 0.8;

// Keyword buckets for the semantic sub-score. Hits are counted per bucket
// against the lower-cased content.
const HIGH_IMPORTANCE: &[&str] = &[
    "important",
    "critical",
    "must",
    "never forget",
    "remember",
    "deadline",
    "urgent",
    "decided",
    "decision",
    "agreed",
    "password",
    "always",
];

const MEDIUM_IMPORTANCE: &[&str] = &[
    "should",
    "prefer",
    "usually",
    "plan",
    "goal",
    "project",
    "meeting",
    "next week",
    "todo",
    "note",
];

const EMOTIONAL_INTENSITY: &[&str] = &[
    "love", "hate", "amazing", "terrible", "furious", "thrilled", "devastated", "ecstatic",
];

const POSITIVE_WORDS: &[&str] = &[
    "happy", "great", "love", "excellent", "amazing", "wonderful", "excited", "thrilled",
    "glad", "good",
];

const NEGATIVE_WORDS: &[&str] = &[
    "sad", "angry", "hate", "terrible", "awful", "furious", "worried", "afraid",
    "frustrated", "bad",
];

/// Cheap ingestion-time importance estimate.
///
/// Combines a type-based base score, a length factor, and high-importance
/// keyword presence. Runs on every incoming message, so it stays allocation-
/// light and never touches the vectorizer.
pub fn quick_score(content: &str, kind: &str) -> f64 {
    let base = match kind {
        "decision" | "goal" => 0.6,
        "fact" | "preference" | "summary" => 0.5,
        "message" | "observation" => 0.35,
        _ => 0.35,
    };

    let length_factor = (content.len() as f64 / 500.0).min(0.2);

    let lower = content.to_lowercase();
    let keyword_hits = HIGH_IMPORTANCE
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();
    let keyword_factor = (keyword_hits as f64 * 0.1).min(0.3);

    clamp01(base + length_factor + keyword_factor)
}

/// Context handed to [`deep_score`]: the recent conversation plus a
/// similarity oracle (vector cosine when the engine has vectors, token
/// overlap otherwise).
pub struct ScoreContext<'a> {
    /// Content of the most recent short-term memories, newest first.
    pub recent: &'a [String],
    /// Pairwise text similarity in `[0, 1]`.
    pub similarity: &'a dyn Fn(&str, &str) -> f64,
}

impl<'a> ScoreContext<'a> {
    /// A context with no history; the contextual sub-score collapses to 0.
    pub fn empty() -> ScoreContext<'static> {
        ScoreContext {
            recent: &[],
            similarity: &|a, b| token_overlap(a, b),
        }
    }
}

/// Thorough importance estimate used during deep processing.
///
/// Weighted sum of three sub-scores, each in `[0, 1]`:
/// `0.3 * complexity + 0.4 * semantic + 0.3 * contextual`.
pub fn deep_score(content: &str, context: &ScoreContext<'_>) -> f64 {
    let complexity = complexity_score(content);
    let semantic = semantic_score(content);
    let contextual = contextual_score(content, context);
    clamp01(0.3 * complexity + 0.4 * semantic + 0.3 * contextual)
}

/// Length + lexical diversity + sentence structure, each capped and summed.
fn complexity_score(content: &str) -> f64 {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let length_factor = (content.len() as f64 / 1000.0).min(1.0) * 0.4;

    let unique: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let diversity_factor = (unique.len() as f64 / words.len() as f64) * 0.3;

    let sentences = sentence_count(content).max(1);
    let avg_sentence_len = words.len() as f64 / sentences as f64;
    let sentence_factor = (avg_sentence_len / 20.0).min(1.0) * 0.3;

    clamp01(length_factor + diversity_factor + sentence_factor)
}

/// Weighted keyword-bucket matching, capped at 1.
fn semantic_score(content: &str) -> f64 {
    let lower = content.to_lowercase();

    let high_hits = HIGH_IMPORTANCE.iter().filter(|kw| lower.contains(*kw)).count();
    let medium_hits = MEDIUM_IMPORTANCE
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();
    let emotional_hits = EMOTIONAL_INTENSITY
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();

    let score =
        high_hits as f64 * 0.15 + medium_hits as f64 * 0.08 + emotional_hits as f64 * 0.10;
    score.min(1.0)
}

/// Similarity to the synthesized current context and to the recent memories
/// individually, averaged.
fn contextual_score(content: &str, context: &ScoreContext<'_>) -> f64 {
    if context.recent.is_empty() {
        return 0.0;
    }

    let joined = context.recent.join(" ");
    let context_sim = (context.similarity)(content, &joined);

    let avg_recent: f64 = context
        .recent
        .iter()
        .map(|r| (context.similarity)(content, r))
        .sum::<f64>()
        / context.recent.len() as f64;

    clamp01(0.5 * context_sim + 0.5 * avg_recent)
}

/// Jaccard overlap of lower-cased word sets. The no-vector similarity
/// fallback used across the engine.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(|w| normalize_token(w)).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(|w| normalize_token(w)).collect();

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let shared = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    shared as f64 / union as f64
}

fn normalize_token(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn sentence_count(content: &str) -> usize {
    content
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// Rule-based category classifier. Fixed priority order, first match wins,
/// default `Contextual`.
pub fn classify_category(content: &str) -> Category {
    let lower = content.to_lowercase();

    const PROCEDURAL: &[&str] = &[
        "how to", "step ", "first,", "then ", "procedure", "workflow", "install", "run the",
        "configure",
    ];
    const EMOTIONAL: &[&str] = &[
        "i feel", "feeling", "happy", "sad", "angry", "love", "hate", "excited", "worried",
        "afraid",
    ];
    const EPISODIC: &[&str] = &[
        "yesterday", "today", "this morning", "last night", "we did", "happened", "i met",
        "i went", "earlier",
    ];
    const SEMANTIC: &[&str] = &[
        " is a ", " is the ", " means ", "definition", "fact", "capital of", "known as",
        "consists of",
    ];

    if PROCEDURAL.iter().any(|kw| lower.contains(kw)) {
        Category::Procedural
    } else if EMOTIONAL.iter().any(|kw| lower.contains(kw)) {
        Category::Emotional
    } else if EPISODIC.iter().any(|kw| lower.contains(kw)) {
        Category::Episodic
    } else if SEMANTIC.iter().any(|kw| lower.contains(kw)) {
        Category::Semantic
    } else {
        Category::Contextual
    }
}

/// Rule-based emotion classifier over lower-cased content.
pub fn classify_emotion(content: &str) -> Emotion {
    let lower = content.to_lowercase();

    let positive = POSITIVE_WORDS.iter().any(|kw| lower.contains(kw));
    let negative = NEGATIVE_WORDS.iter().any(|kw| lower.contains(kw));

    match (positive, negative) {
        (true, true) => Emotion::Mixed,
        (true, false) => Emotion::Positive,
        (false, true) => Emotion::Negative,
        (false, false) => Emotion::Neutral,
    }
}

/// Temporal-pattern classifier.
///
/// Age under an hour wins over everything; then the periodic check (three or
/// more similar memories), then milestone importance, then `Historical`.
pub fn classify_temporal(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    similar_count: usize,
    importance: f64,
) -> TemporalPattern {
    if now - created_at < chrono::Duration::hours(1) {
        TemporalPattern::Recent
    } else if similar_count >= 3 {
        TemporalPattern::Periodic
    } else if importance >= MILESTONE_IMPORTANCE {
        TemporalPattern::Milestone
    } else {
        TemporalPattern::Historical
    }
}

//! Core memory type definitions.
//!
//! Defines [`Layer`] (the four storage tiers), [`Category`] / [`Emotion`] /
//! [`TemporalPattern`] (classifier outputs), [`Memory`] (a full record), and
//! [`MigrationRecord`] (an entry in the store's migration-history arena).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four storage tiers, ordered from most volatile to most durable.
///
/// Migration is forward-only: a memory moves toward `DeepArchive` and never
/// back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Raw intake buffer — everything lands here first, decays in minutes.
    Sensory,
    /// Working memory for the active conversation — decays in hours.
    ShortTerm,
    /// Durable, deep-processed and vector-indexed — decays in days.
    LongTerm,
    /// Terminal archive — no further decay.
    DeepArchive,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Sensory,
        Layer::ShortTerm,
        Layer::LongTerm,
        Layer::DeepArchive,
    ];

    /// Key-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sensory => "sensory",
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
            Self::DeepArchive => "deep_archive",
        }
    }

    /// Position in the promotion order, `0` = sensory.
    pub fn rank(&self) -> usize {
        match self {
            Self::Sensory => 0,
            Self::ShortTerm => 1,
            Self::LongTerm => 2,
            Self::DeepArchive => 3,
        }
    }

    /// The tier a memory promotes into, or `None` from the archive.
    pub fn next(&self) -> Option<Layer> {
        match self {
            Self::Sensory => Some(Self::ShortTerm),
            Self::ShortTerm => Some(Self::LongTerm),
            Self::LongTerm => Some(Self::DeepArchive),
            Self::DeepArchive => None,
        }
    }

    /// Tiers that receive deep processing (scoring, classification, vectors)
    /// on entry.
    pub fn is_deep(&self) -> bool {
        matches!(self, Self::LongTerm | Self::DeepArchive)
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sensory" => Ok(Self::Sensory),
            "short_term" => Ok(Self::ShortTerm),
            "long_term" => Ok(Self::LongTerm),
            "deep_archive" => Ok(Self::DeepArchive),
            _ => Err(format!("unknown layer: {s}")),
        }
    }
}

/// Cognitive category assigned by the rule-based classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Events, things that happened in the session.
    Episodic,
    /// Facts, definitions, stable knowledge.
    Semantic,
    /// How-to knowledge, workflows, steps.
    Procedural,
    /// Feeling-laden content.
    Emotional,
    /// Default bucket when nothing else matches.
    Contextual,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
            Self::Emotional => "emotional",
            Self::Contextual => "contextual",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emotional valence assigned by the rule-based classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Mixed => "mixed",
        }
    }
}

/// Temporal access pattern assigned during deep processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalPattern {
    /// Created within the last hour.
    Recent,
    /// Three or more similar memories exist.
    Periodic,
    /// Importance at or above the milestone threshold.
    Milestone,
    /// Everything else.
    Historical,
}

/// One forward migration, stored in the store's arena and referenced from
/// [`Memory::history`] by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub memory_id: String,
    pub from: Layer,
    pub to: Layer,
    pub at: DateTime<Utc>,
}

/// A memory record — the central entity of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// The full text content of the memory.
    pub content: String,
    /// Caller-supplied type tag (e.g. `"message"`, `"decision"`, `"summary"`).
    pub kind: String,
    /// Where the content came from (e.g. `"user"`, `"assistant"`).
    pub source: String,
    /// Cognitive category from the classifier.
    pub category: Category,
    /// Emotional valence from the classifier.
    pub emotion: Emotion,
    /// Temporal pattern, refined during deep processing.
    pub temporal: TemporalPattern,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
    /// Current tier. Always agrees with physical tier membership in the store.
    pub layer: Layer,
    /// Importance score in `[0.0, 1.0]`.
    pub importance: f64,
    /// Recency score in `[0.0, 1.0]`, decays over time.
    pub recency: f64,
    /// Relevance to the recent conversation in `[0.0, 1.0]`, set during deep
    /// processing.
    pub relevance: f64,
    /// Instant the recency score was last decayed.
    pub recency_updated_at: DateTime<Utc>,
    /// Number of times this memory has been returned in search results.
    pub access_count: u32,
    /// Instant of the last recall, or `None` if never accessed.
    pub last_accessed: Option<DateTime<Utc>>,
    /// Embedding vector, present only after deep processing succeeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Conversation partition key. Every resident memory carries the active
    /// scope's id.
    pub chat_id: String,
    /// Set by conflict resolution when a newer memory contradicts this one.
    pub outdated: bool,
    /// IDs folded into this memory by compression or conflict resolution.
    pub merged_from: Vec<String>,
    /// Indices into the store's migration-record arena.
    pub history: Vec<u32>,
    /// Free-form caller metadata.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Memory {
    /// Create a fresh memory destined for the sensory tier.
    pub fn new(content: &str, kind: &str, source: &str, chat_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            content: content.to_string(),
            kind: kind.to_string(),
            source: source.to_string(),
            category: Category::Contextual,
            emotion: Emotion::Neutral,
            temporal: TemporalPattern::Recent,
            timestamp: now,
            layer: Layer::Sensory,
            importance: 0.0,
            recency: 1.0,
            relevance: 0.0,
            recency_updated_at: now,
            access_count: 0,
            last_accessed: None,
            vector: None,
            chat_id: chat_id.to_string(),
            outdated: false,
            merged_from: Vec::new(),
            history: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Age of the memory relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}

/// Clamp a score into `[0.0, 1.0]`. NaN collapses to `0.0`.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

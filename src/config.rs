use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::StrataError;
use crate::memory::types::Layer;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrataConfig {
    pub tiers: TierConfig,
    pub promotion: PromotionConfig,
    pub decay: DecayConfig,
    pub conflict: ConflictConfig,
    pub compression: CompressionConfig,
    pub retention: RetentionConfig,
    pub ingest: IngestConfig,
    pub embedding: EmbeddingConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TierConfig {
    pub sensory_capacity: usize,
    pub short_term_capacity: usize,
    pub long_term_capacity: usize,
    pub deep_archive_capacity: usize,
}

impl TierConfig {
    pub fn capacity(&self, layer: Layer) -> usize {
        match layer {
            Layer::Sensory => self.sensory_capacity,
            Layer::ShortTerm => self.short_term_capacity,
            Layer::LongTerm => self.long_term_capacity,
            Layer::DeepArchive => self.deep_archive_capacity,
        }
    }
}

/// Importance thresholds gating forward migration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PromotionConfig {
    /// T1: sensory → short_term.
    pub sensory_to_short: f64,
    /// T2: short_term → long_term.
    pub short_to_long: f64,
    /// T3: long_term → deep_archive.
    pub long_to_archive: f64,
}

/// Per-tier recency decay. The exponent unit differs by tier: minutes for
/// sensory, hours for short-term, days for long-term. The archive does not
/// decay.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecayConfig {
    pub sensory_rate: f64,
    pub short_term_rate: f64,
    pub long_term_rate: f64,
    /// Sensory memories whose recency falls below this are forgotten outright.
    pub sensory_floor: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConflictConfig {
    /// Pairwise similarity above which two differently-categorized memories
    /// are treated as conflicting.
    pub similarity_threshold: f64,
    /// The sweep is skipped entirely when more residents than this exist.
    pub scan_ceiling: usize,
    /// Each anchor is compared against at most this many most-similar
    /// neighbors.
    pub neighbor_cap: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompressionConfig {
    /// Pairwise similarity above which memories cluster for merging.
    pub similarity_threshold: f64,
    /// Clusters smaller than this are left alone.
    pub min_cluster_size: usize,
    /// Sentences more similar than this to an already-kept sentence are
    /// dropped from the merged summary.
    pub sentence_dedup_threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    /// Memories older than this AND below the importance floor expire.
    pub max_age_days: u64,
    pub low_importance_floor: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// Content shorter than this is rejected.
    pub min_content_chars: usize,
    /// Content containing any of these substrings is silently rejected
    /// (internal reasoning markers and the like).
    pub excluded_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"remote"`, `"local"`, or `"fallback"`.
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    /// Directory holding `model.onnx` + `tokenizer.json` for the local
    /// provider.
    pub cache_dir: String,
    /// Endpoint for the remote provider (OpenAI-style embeddings API).
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Whether a remote/local failure falls through to the deterministic
    /// hashing embedder instead of returning no vector.
    pub fallback_enabled: bool,
    pub cache_max_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            tiers: TierConfig::default(),
            promotion: PromotionConfig::default(),
            decay: DecayConfig::default(),
            conflict: ConflictConfig::default(),
            compression: CompressionConfig::default(),
            retention: RetentionConfig::default(),
            ingest: IngestConfig::default(),
            embedding: EmbeddingConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            sensory_capacity: 64,
            short_term_capacity: 256,
            long_term_capacity: 1024,
            deep_archive_capacity: 4096,
        }
    }
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            sensory_to_short: 0.45,
            short_to_long: 0.6,
            long_to_archive: 0.8,
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            sensory_rate: 0.90,
            short_term_rate: 0.95,
            long_term_rate: 0.99,
            sensory_floor: 0.1,
        }
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            scan_ceiling: 512,
            neighbor_cap: 5,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_cluster_size: 3,
            sentence_dedup_threshold: 0.7,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 90,
            low_importance_floor: 0.2,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_content_chars: 3,
            excluded_patterns: vec![
                "<thinking>".into(),
                "</thinking>".into(),
                "[internal]".into(),
                "<scratchpad>".into(),
            ],
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_strata_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "fallback".into(),
            model: "all-MiniLM-L6-v2".into(),
            dimensions: 384,
            cache_dir,
            endpoint: "https://api.openai.com/v1/embeddings".into(),
            api_key: None,
            timeout_secs: 10,
            max_retries: 3,
            fallback_enabled: true,
            cache_max_entries: 2048,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

/// Returns `~/.strata/`
pub fn default_strata_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".strata")
}

/// Returns the default config file path: `~/.strata/config.toml`
pub fn default_config_path() -> PathBuf {
    default_strata_dir().join("config.toml")
}

impl StrataConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("STRATA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(path)
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StrataConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STRATA_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("STRATA_EMBEDDING_URL") {
            self.embedding.endpoint = val;
        }
        if let Ok(val) = std::env::var("STRATA_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(val);
        }
    }

    /// Range-validate every knob. Out-of-range values are rejected here, at
    /// construction, never clamped at use time.
    pub fn validate(&self) -> crate::error::Result<()> {
        for (name, capacity) in [
            ("tiers.sensory_capacity", self.tiers.sensory_capacity),
            ("tiers.short_term_capacity", self.tiers.short_term_capacity),
            ("tiers.long_term_capacity", self.tiers.long_term_capacity),
            ("tiers.deep_archive_capacity", self.tiers.deep_archive_capacity),
        ] {
            if capacity == 0 {
                return Err(StrataError::Config(format!("{name} must be nonzero")));
            }
        }

        for (name, t) in [
            ("promotion.sensory_to_short", self.promotion.sensory_to_short),
            ("promotion.short_to_long", self.promotion.short_to_long),
            ("promotion.long_to_archive", self.promotion.long_to_archive),
            ("conflict.similarity_threshold", self.conflict.similarity_threshold),
            (
                "compression.similarity_threshold",
                self.compression.similarity_threshold,
            ),
            (
                "compression.sentence_dedup_threshold",
                self.compression.sentence_dedup_threshold,
            ),
        ] {
            if !(t > 0.0 && t < 1.0) {
                return Err(StrataError::Config(format!(
                    "{name} must lie in (0, 1), got {t}"
                )));
            }
        }

        if !(self.promotion.sensory_to_short < self.promotion.short_to_long
            && self.promotion.short_to_long < self.promotion.long_to_archive)
        {
            return Err(StrataError::Config(
                "promotion thresholds must be strictly increasing".into(),
            ));
        }

        for (name, rate) in [
            ("decay.sensory_rate", self.decay.sensory_rate),
            ("decay.short_term_rate", self.decay.short_term_rate),
            ("decay.long_term_rate", self.decay.long_term_rate),
        ] {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(StrataError::Config(format!(
                    "{name} must lie in (0, 1], got {rate}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.decay.sensory_floor) {
            return Err(StrataError::Config("decay.sensory_floor must lie in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.retention.low_importance_floor) {
            return Err(StrataError::Config(
                "retention.low_importance_floor must lie in [0, 1]".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(StrataError::Config("embedding.dimensions must be nonzero".into()));
        }
        if self.compression.min_cluster_size < 2 {
            return Err(StrataError::Config(
                "compression.min_cluster_size must be at least 2".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StrataConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tiers.capacity(Layer::Sensory), 64);
        assert_eq!(config.embedding.provider, "fallback");
        assert_eq!(config.embedding.dimensions, 384);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[tiers]
sensory_capacity = 10

[promotion]
sensory_to_short = 0.2

[embedding]
provider = "remote"
endpoint = "http://localhost:8080/embed"
"#;
        let config: StrataConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tiers.sensory_capacity, 10);
        assert_eq!(config.promotion.sensory_to_short, 0.2);
        assert_eq!(config.embedding.provider, "remote");
        // defaults still apply for unset fields
        assert_eq!(config.tiers.short_term_capacity, 256);
        assert_eq!(config.promotion.short_to_long, 0.6);
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = StrataConfig::default();
        config.tiers.sensory_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = StrataConfig::default();
        config.promotion.long_to_archive = 1.0;
        assert!(config.validate().is_err());

        let mut config = StrataConfig::default();
        config.conflict.similarity_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_monotone_thresholds() {
        let mut config = StrataConfig::default();
        config.promotion.sensory_to_short = 0.7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_decay_rate_above_one() {
        let mut config = StrataConfig::default();
        config.decay.sensory_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = StrataConfig::default();
        std::env::set_var("STRATA_EMBEDDING_PROVIDER", "remote");
        std::env::set_var("STRATA_EMBEDDING_URL", "http://localhost:1234/v1/embeddings");

        config.apply_env_overrides();

        assert_eq!(config.embedding.provider, "remote");
        assert_eq!(config.embedding.endpoint, "http://localhost:1234/v1/embeddings");

        std::env::remove_var("STRATA_EMBEDDING_PROVIDER");
        std::env::remove_var("STRATA_EMBEDDING_URL");
    }
}

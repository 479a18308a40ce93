//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, three implementations (remote
//! service, local ONNX model, deterministic hashing fallback), and the
//! [`Vectorizer`] facade that adds caching and failure degradation on top.
//!
//! All methods are synchronous — callers in async contexts should use
//! `tokio::task::spawn_blocking`.

pub mod cache;
pub mod fallback;
pub mod local;
pub mod remote;

use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::Result;
use cache::VectorCache;
use fallback::FallbackEmbedder;

/// Trait for embedding text into L2-normalized vectors of a fixed dimension.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;
}

/// Pluggable embedding front-end with a bounded cache and a degradation
/// ladder: configured provider first, deterministic fallback second (when
/// enabled), `None` last.
///
/// `embed` deliberately returns `Option` rather than `Result`: per the
/// engine's error policy an embedding failure is a degraded mode, never a
/// hard failure, and the diagnostic has already been logged by the time the
/// caller sees `None`.
pub struct Vectorizer {
    provider: Option<Box<dyn EmbeddingProvider>>,
    fallback: Option<FallbackEmbedder>,
    cache: VectorCache,
    dimensions: usize,
}

impl Vectorizer {
    /// Build from configuration. `provider` selects the strategy:
    /// `"remote"`, `"local"`, or `"fallback"`.
    ///
    /// A local provider whose model files are missing degrades to the
    /// fallback embedder at construction (when enabled) rather than failing.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let fallback = config
            .fallback_enabled
            .then(|| FallbackEmbedder::new(config.dimensions));

        let provider: Option<Box<dyn EmbeddingProvider>> = match config.provider.as_str() {
            "remote" => Some(Box::new(remote::RemoteProvider::new(config)?)),
            "local" => match local::LocalProvider::new(config) {
                Ok(p) => Some(Box::new(p)),
                Err(e) if fallback.is_some() => {
                    warn!(error = %e, "local provider unavailable, using fallback embedder");
                    None
                }
                Err(e) => return Err(e),
            },
            "fallback" => None,
            other => {
                return Err(crate::error::StrataError::Config(format!(
                    "unknown embedding provider: {other}. Supported: remote, local, fallback"
                )))
            }
        };

        if provider.is_none() && fallback.is_none() {
            return Err(crate::error::StrataError::Config(
                "provider \"fallback\" requires embedding.fallback_enabled = true".into(),
            ));
        }

        Ok(Self {
            provider,
            fallback,
            cache: VectorCache::new(config.cache_max_entries),
            dimensions: config.dimensions,
        })
    }

    /// A vectorizer backed purely by the deterministic embedder. Used by
    /// tests and as the offline default.
    pub fn deterministic(dimensions: usize, cache_max_entries: usize) -> Self {
        Self {
            provider: None,
            fallback: Some(FallbackEmbedder::new(dimensions)),
            cache: VectorCache::new(cache_max_entries),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed `text`, consulting the cache first. Returns `None` only when the
    /// configured provider failed and the fallback is disabled.
    pub fn embed(&mut self, text: &str) -> Option<Vec<f32>> {
        if let Some(hit) = self.cache.get(text) {
            debug!("vector cache hit");
            return Some(hit.clone());
        }

        let vector = self.embed_uncached(text)?;
        self.cache.insert(text, vector.clone());
        Some(vector)
    }

    fn embed_uncached(&self, text: &str) -> Option<Vec<f32>> {
        if let Some(provider) = &self.provider {
            match provider.embed(text) {
                Ok(vector) => return Some(vector),
                Err(e) => {
                    warn!(error = %e, "embedding provider failed");
                }
            }
        }

        match &self.fallback {
            Some(fb) => match fb.embed(text) {
                Ok(vector) => Some(vector),
                Err(_) => None,
            },
            None => None,
        }
    }

    /// Pairwise text similarity: cosine over embeddings when available,
    /// token overlap otherwise.
    pub fn similarity(&mut self, a: &str, b: &str) -> f64 {
        match (self.embed(a), self.embed(b)) {
            (Some(va), Some(vb)) => crate::index::cosine_similarity(&va, &vb),
            _ => crate::memory::scoring::token_overlap(a, b),
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached vector. Called on conversation switch — the cache is
    /// private to the active scope.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

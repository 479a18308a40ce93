//! Deterministic hashing embedder.
//!
//! Keeps the engine functional with no model files and no network: builds a
//! weighted feature multiset from words, character n-grams, and single
//! characters, then scatters each feature's weight into the output vector
//! through five independent hash seeds. Same text always yields the same
//! vector; texts sharing n-grams get nonzero cosine similarity.

use std::collections::HashMap;

use super::EmbeddingProvider;
use crate::error::Result;

// FNV-1a parameters, with five distinct offset bases so one feature lands at
// five quasi-independent indices. Additive accumulation softens collisions.
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;
const HASH_SEEDS: [u64; 5] = [
    0xCBF2_9CE4_8422_2325,
    0x9E37_79B9_7F4A_7C15,
    0xC2B2_AE3D_27D4_EB4F,
    0x1656_67B1_9E37_79F9,
    0x27D4_EB2F_1656_67C5,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FeatureKind {
    Word,
    Trigram,
    Bigram,
    Char,
}

impl FeatureKind {
    /// Words carry the most signal, then longer n-grams, then single chars.
    fn weight(self) -> f64 {
        match self {
            Self::Word => 1.0,
            Self::Trigram => 0.6,
            Self::Bigram => 0.4,
            Self::Char => 0.2,
        }
    }
}

/// Accumulator for one distinct feature.
struct FeatureCount {
    kind: FeatureKind,
    /// Rank at which the feature was first seen; earlier features weigh more.
    first_rank: usize,
    /// Term frequency.
    count: usize,
}

/// Hashing-trick embedder with a fixed output dimension.
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingProvider for FallbackEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f64; self.dimensions];

        for (feature, acc) in extract_features(text) {
            let weight =
                position_weight(acc.first_rank) * acc.count as f64 * acc.kind.weight();
            for seed in HASH_SEEDS {
                let index = (fnv1a(&feature, seed) % self.dimensions as u64) as usize;
                vector[index] += weight;
            }
        }

        Ok(l2_normalize_or_uniform(&vector))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Build the feature multiset: whole words, character trigrams and bigrams
/// within each word, and single characters, all after lower-casing and
/// stripping non-alphanumeric characters (CJK counts as alphanumeric).
fn extract_features(text: &str) -> HashMap<String, FeatureCount> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut features: HashMap<String, FeatureCount> = HashMap::new();
    let mut next_rank = 0usize;

    fn note(
        features: &mut HashMap<String, FeatureCount>,
        next_rank: &mut usize,
        feature: String,
        kind: FeatureKind,
    ) {
        let entry = features.entry(feature).or_insert_with(|| {
            let first_rank = *next_rank;
            *next_rank += 1;
            FeatureCount {
                kind,
                first_rank,
                count: 0,
            }
        });
        entry.count += 1;
    }

    for word in normalized.split_whitespace() {
        note(&mut features, &mut next_rank, word.to_string(), FeatureKind::Word);

        let chars: Vec<char> = word.chars().collect();
        for window in chars.windows(3) {
            note(
                &mut features,
                &mut next_rank,
                window.iter().collect(),
                FeatureKind::Trigram,
            );
        }
        for window in chars.windows(2) {
            note(
                &mut features,
                &mut next_rank,
                window.iter().collect(),
                FeatureKind::Bigram,
            );
        }
        for c in chars {
            note(&mut features, &mut next_rank, c.to_string(), FeatureKind::Char);
        }
    }

    features
}

/// Earlier features weigh slightly more than later ones.
fn position_weight(rank: usize) -> f64 {
    1.0 / (1.0 + rank as f64 / 16.0)
}

fn fnv1a(feature: &str, seed: u64) -> u64 {
    let mut hash = seed;
    for byte in feature.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// L2-normalize; an all-zero accumulation becomes a uniform unit vector so
/// downstream cosine math never divides by zero.
fn l2_normalize_or_uniform(v: &[f64]) -> Vec<f32> {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| (x / norm) as f32).collect()
    } else {
        let uniform = 1.0 / (v.len() as f64).sqrt();
        vec![uniform as f32; v.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    fn embedder() -> FallbackEmbedder {
        FallbackEmbedder::new(384)
    }

    #[test]
    fn embed_is_deterministic() {
        let e = embedder();
        let a = e.embed("hello world").unwrap();
        let b = e.embed("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn embed_is_l2_normalized() {
        let e = embedder();
        let v = e.embed("a moderately interesting sentence").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn empty_text_yields_uniform_unit_vector() {
        let e = embedder();
        let v = e.embed("").unwrap();
        assert_eq!(v.len(), 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(v.iter().all(|x| *x > 0.0));
    }

    #[test]
    fn similar_texts_are_closer_than_unrelated() {
        let e = embedder();
        let a = e.embed("the cat sat").unwrap();
        let b = e.embed("the cat sits").unwrap();
        let c = e.embed("quantum economics policy").unwrap();

        let sim_ab = cosine_similarity(&a, &b);
        let sim_ac = cosine_similarity(&a, &c);
        assert!(
            sim_ab > sim_ac,
            "expected {sim_ab} (related) > {sim_ac} (unrelated)"
        );
        assert!(sim_ab > 0.0);
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        let e = embedder();
        let a = e.embed("Hello, World!").unwrap();
        let b = e.embed("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn respects_configured_dimensions() {
        let e = FallbackEmbedder::new(64);
        assert_eq!(e.embed("dimensional check").unwrap().len(), 64);
        assert_eq!(e.dimensions(), 64);
    }
}

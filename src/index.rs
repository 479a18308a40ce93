//! In-memory semantic index.
//!
//! Holds `(id, vector)` tuples and answers cosine-ranked queries by brute
//! force. Supports incremental add/remove and a full rebuild on conversation
//! switch. Memories without vectors never appear here; the engine's keyword
//! fallback search covers them.

use std::collections::HashMap;

/// Cosine similarity `dot(a,b) / (|a||b|)`.
///
/// Dimension mismatch or a zero-magnitude operand yields `0.0`, never an
/// error — a mismatched entry simply ranks nowhere.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

struct IndexEntry {
    id: String,
    vector: Vec<f32>,
}

/// A ranked query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub similarity: f64,
}

#[derive(Default)]
pub struct SemanticIndex {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl SemanticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the vector for `id`.
    pub fn add(&mut self, id: &str, vector: Vec<f32>) {
        match self.positions.get(id) {
            Some(&pos) => self.entries[pos].vector = vector,
            None => {
                self.positions.insert(id.to_string(), self.entries.len());
                self.entries.push(IndexEntry {
                    id: id.to_string(),
                    vector,
                });
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.positions.remove(id) else {
            return false;
        };
        self.entries.swap_remove(pos);
        if pos < self.entries.len() {
            // The former last entry moved into `pos`.
            self.positions.insert(self.entries[pos].id.clone(), pos);
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Drop everything and re-index from `(id, vector)` pairs. Used on
    /// conversation switch.
    pub fn rebuild<I>(&mut self, vectors: I)
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        self.clear();
        for (id, vector) in vectors {
            self.add(&id, vector);
        }
    }

    /// Rank every indexed vector against `query`, keep those with similarity
    /// at or above `threshold`, sorted descending, truncated to `top_k`.
    pub fn query(&self, query: &[f32], top_k: usize, threshold: f64) -> Vec<IndexHit> {
        let mut hits: Vec<IndexHit> = self
            .entries
            .iter()
            .map(|e| IndexHit {
                id: e.id.clone(),
                similarity: cosine_similarity(query, &e.vector),
            })
            .filter(|h| h.similarity >= threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }
}

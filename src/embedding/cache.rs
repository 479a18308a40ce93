//! Bounded vector cache keyed by content hash.
//!
//! Eviction is oldest-inserted-first. A text's vector never changes for a
//! given provider, so there is no invalidation beyond capacity pressure and
//! an explicit clear on conversation switch.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

pub struct VectorCache {
    entries: HashMap<u64, Vec<f32>>,
    insertion_order: VecDeque<u64>,
    max_entries: usize,
}

impl VectorCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            max_entries,
        }
    }

    pub fn get(&self, text: &str) -> Option<&Vec<f32>> {
        self.entries.get(&content_key(text))
    }

    pub fn insert(&mut self, text: &str, vector: Vec<f32>) {
        if self.max_entries == 0 {
            return;
        }
        let key = content_key(text);
        if self.entries.insert(key, vector).is_none() {
            self.insertion_order.push_back(key);
        }
        while self.entries.len() > self.max_entries {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }
}

fn content_key(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_insert() {
        let mut cache = VectorCache::new(4);
        cache.insert("hello", vec![1.0, 0.0]);
        assert_eq!(cache.get("hello"), Some(&vec![1.0, 0.0]));
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn evicts_oldest_inserted() {
        let mut cache = VectorCache::new(2);
        cache.insert("a", vec![1.0]);
        cache.insert("b", vec![2.0]);
        cache.insert("c", vec![3.0]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn reinsert_does_not_grow() {
        let mut cache = VectorCache::new(2);
        cache.insert("a", vec![1.0]);
        cache.insert("a", vec![1.5]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(&vec![1.5]));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = VectorCache::new(0);
        cache.insert("a", vec![1.0]);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = VectorCache::new(4);
        cache.insert("a", vec![1.0]);
        cache.insert("b", vec![2.0]);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }
}

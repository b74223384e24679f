use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Thread-safe LRU cache of query embeddings keyed by the exact query text.
///
/// Query vectors are deterministic for a fixed model, so repeated queries can
/// skip the provider round-trip.
#[derive(Clone)]
pub struct QueryEmbeddingCache {
    cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl QueryEmbeddingCache {
    /// Returns `None` when `capacity` is zero (caching disabled).
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        })
    }

    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.get(query).cloned()
    }

    /// If the cache is at capacity the least recently used entry is evicted.
    pub fn put(&self, query: &str, embedding: Vec<f32>) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.put(query.to_string(), embedding);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

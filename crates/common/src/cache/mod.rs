//! Bounded embedding cache
//!
//! Memoizes dense embeddings by exact text so repeated indexing and querying
//! of the same content skips model inference. Eviction is LRU with a fixed
//! capacity rather than a clear-all policy, so hot entries survive.
//!
//! The cache mutex is held across inference on a miss. That is intentional:
//! the underlying model is a single shared instance (often one GPU device),
//! and concurrent embedding requests must be serialized.

use crate::config::CacheConfig;
use crate::embeddings::Embedder;
use crate::errors::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheInner {
    entries: LruCache<String, Vec<f32>>,
    hits: u64,
    misses: u64,
}

/// LRU cache wrapping a shared embedding model
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    inner: Mutex<CacheInner>,
}

impl EmbeddingCache {
    /// Create a cache in front of the given embedder
    pub fn new(embedder: Arc<dyn Embedder>, config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            embedder,
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Get the embedding for a text, running inference on a miss
    pub async fn get_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let mut inner = self.inner.lock().await;

        if let Some(vector) = inner.entries.get(text) {
            let vector = vector.clone();
            inner.hits += 1;
            debug!(len = text.len(), "Embedding cache hit");
            return Ok(vector);
        }

        inner.misses += 1;
        debug!(len = text.len(), "Embedding cache miss");

        // Inference runs under the lock: one in-flight request per model
        let vector = self.embedder.embed(text).await?;
        inner.entries.put(text.to_string(), vector.clone());

        Ok(vector)
    }

    /// Get embeddings for many texts, batching inference for the misses.
    /// Output order matches input order.
    pub async fn get_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut inner = self.inner.lock().await;

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match inner.entries.get(text) {
                Some(vector) => {
                    let vector = vector.clone();
                    inner.hits += 1;
                    results.push(Some(vector));
                }
                None => {
                    inner.misses += 1;
                    results.push(None);
                    miss_indices.push(i);
                    miss_texts.push(text.clone());
                }
            }
        }

        if !miss_texts.is_empty() {
            debug!(
                total = texts.len(),
                misses = miss_texts.len(),
                "Batch embedding cache lookup"
            );
            let vectors = self.embedder.embed_batch(&miss_texts).await?;
            for (slot, vector) in miss_indices.into_iter().zip(vectors) {
                inner.entries.put(texts[slot].clone(), vector.clone());
                results[slot] = Some(vector);
            }
        }

        // Every slot is filled: hits above, misses just now
        Ok(results.into_iter().flatten().collect())
    }

    /// Current counters
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }

    /// The wrapped embedder's dimension
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;

    fn cache_with_capacity(max_entries: usize) -> EmbeddingCache {
        let config = CacheConfig { max_entries };
        EmbeddingCache::new(Arc::new(MockEmbedder::new(32)), &config)
    }

    #[tokio::test]
    async fn test_second_lookup_hits() {
        let cache = cache_with_capacity(16);

        let first = cache.get_embedding("hello world").await.unwrap();
        let second = cache.get_embedding("hello world").await.unwrap();
        assert_eq!(first, second);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_keeps_recent() {
        let cache = cache_with_capacity(2);

        cache.get_embedding("a").await.unwrap();
        cache.get_embedding("b").await.unwrap();
        // Touch "a" so "b" is the eviction victim
        cache.get_embedding("a").await.unwrap();
        cache.get_embedding("c").await.unwrap();

        cache.get_embedding("a").await.unwrap();
        let stats = cache.stats().await;
        // "a" hit twice; "b" and "c" were single misses
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entries, 2);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_with_mixed_hits() {
        let cache = cache_with_capacity(16);
        cache.get_embedding("two").await.unwrap();

        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let batch = cache.get_embeddings(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);

        let embedder = MockEmbedder::new(32);
        use crate::embeddings::Embedder as _;
        assert_eq!(batch[0], embedder.embed("one").await.unwrap());
        assert_eq!(batch[1], embedder.embed("two").await.unwrap());
        assert_eq!(batch[2], embedder.embed("three").await.unwrap());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
    }
}

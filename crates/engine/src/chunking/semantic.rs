//! Semantic similarity chunking
//!
//! Groups adjacent sentences while their embeddings stay similar; a drop
//! below the threshold starts a new chunk. Embedding failure degrades to
//! one chunk per sentence instead of failing the document.

use super::{sentence_regex, split_sentences, Chunker};
use async_trait::async_trait;
use recall_common::config::ChunkingConfig;
use recall_common::errors::Result;
use recall_common::Embedder;
use regex_lite::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Similarity-threshold chunker
pub struct SemanticChunker {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    min_chunk_length: usize,
    sentence_re: Regex,
}

impl SemanticChunker {
    pub fn new(config: &ChunkingConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self {
            embedder,
            threshold: config.semantic_threshold,
            min_chunk_length: config.min_chunk_length,
            sentence_re: sentence_regex()?,
        })
    }

    fn group_by_similarity(&self, sentences: &[String], vectors: &[Vec<f32>]) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = vec![vec![sentences[0].clone()]];

        for i in 1..sentences.len() {
            if cosine(&vectors[i - 1], &vectors[i]) < self.threshold {
                groups.push(Vec::new());
            }
            // A new group was just opened, or the current one continues
            if let Some(group) = groups.last_mut() {
                group.push(sentences[i].clone());
            }
        }

        groups
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[async_trait]
impl Chunker for SemanticChunker {
    async fn split(&self, text: &str) -> Result<Vec<String>> {
        let sentences = split_sentences(&self.sentence_re, text);
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let groups = match self.embedder.embed_batch(&sentences).await {
            Ok(vectors) => self.group_by_similarity(&sentences, &vectors),
            Err(e) => {
                // Lossy but always-available degenerate path
                warn!(error = %e, "Sentence embedding failed, one chunk per sentence");
                sentences.iter().map(|s| vec![s.clone()]).collect()
            }
        };

        let chunks: Vec<String> = groups
            .into_iter()
            .map(|group| group.join(" "))
            .filter(|chunk| chunk.chars().count() >= self.min_chunk_length)
            .collect();

        debug!(
            sentences = sentences.len(),
            chunk_count = chunks.len(),
            "Semantic chunking done"
        );

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_common::embeddings::{FailingEmbedder, MockEmbedder};

    fn config(threshold: f32, min_chunk_length: usize) -> ChunkingConfig {
        ChunkingConfig {
            strategy: "semantic".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            semantic_threshold: threshold,
            min_chunk_length,
        }
    }

    #[tokio::test]
    async fn test_similar_sentences_make_one_chunk() {
        // Heavy vocabulary overlap keeps adjacent similarity high
        let text = "The cache stores embeddings quickly. \
                    The cache stores vectors quickly. \
                    The cache stores entries quickly.";

        let chunker =
            SemanticChunker::new(&config(0.3, 0), Arc::new(MockEmbedder::new(256))).unwrap();
        let chunks = chunker.split(text).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0],
            "The cache stores embeddings quickly. \
             The cache stores vectors quickly. \
             The cache stores entries quickly."
        );
    }

    #[tokio::test]
    async fn test_topic_shift_starts_new_chunk() {
        let text = "Retrieval engines rank documents by score. \
                    Retrieval engines rank passages by score. \
                    Basil grows best in warm sunny gardens.";

        let chunker =
            SemanticChunker::new(&config(0.3, 0), Arc::new(MockEmbedder::new(256))).unwrap();
        let chunks = chunker.split(text).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].contains("Basil"));
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_per_sentence() {
        let text = "One sentence here. Another sentence there.";

        let chunker = SemanticChunker::new(&config(0.3, 0), Arc::new(FailingEmbedder)).unwrap();
        let chunks = chunker.split(text).await.unwrap();

        assert_eq!(chunks, vec!["One sentence here.", "Another sentence there."]);
    }

    #[tokio::test]
    async fn test_short_chunks_are_dropped() {
        let text = "Tiny. A considerably longer sentence that easily clears the bar.";

        let chunker =
            SemanticChunker::new(&config(0.9, 20), Arc::new(MockEmbedder::new(256))).unwrap();
        let chunks = chunker.split(text).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].len() >= 20);
    }

    #[tokio::test]
    async fn test_min_length_counts_characters_not_bytes() {
        // "Àéîõü çà." is 9 characters but 16 bytes; it must fall under a
        // 12-character minimum even though its byte length clears it
        let text = "Àéîõü çà. A considerably longer sentence that easily clears the bar.";

        let chunker =
            SemanticChunker::new(&config(0.9, 12), Arc::new(MockEmbedder::new(256))).unwrap();
        let chunks = chunker.split(text).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("longer sentence"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let chunker =
            SemanticChunker::new(&config(0.3, 0), Arc::new(MockEmbedder::new(64))).unwrap();
        assert!(chunker.split("").await.unwrap().is_empty());
    }
}

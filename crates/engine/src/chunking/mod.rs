//! Text chunking
//!
//! Two interchangeable strategies behind one trait:
//! - Recursive: token-budget splitting with backward sentence overlap
//! - Semantic: sentence-similarity grouping with a threshold
//!
//! Both also support re-chunking coarse parent chunks (markdown sections,
//! table rows) into finer units with document-wide chunk ids.

mod recursive;
mod semantic;

pub use recursive::RecursiveChunker;
pub use semantic::SemanticChunker;

use crate::store::Chunk;
use async_trait::async_trait;
use recall_common::config::ChunkingConfig;
use recall_common::errors::{EngineError, Result};
use recall_common::Embedder;
use regex_lite::Regex;
use std::sync::Arc;

/// Splits raw text into an ordered sequence of chunk contents
#[async_trait]
pub trait Chunker: Send + Sync {
    async fn split(&self, text: &str) -> Result<Vec<String>>;
}

/// Build the configured chunking strategy
pub fn chunker_from_config(
    config: &ChunkingConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn Chunker>> {
    match config.strategy.as_str() {
        "recursive" => Ok(Arc::new(RecursiveChunker::new(config)?)),
        "semantic" => Ok(Arc::new(SemanticChunker::new(config, embedder)?)),
        other => Err(EngineError::Configuration {
            message: format!("Unknown chunking strategy: {}", other),
        }),
    }
}

/// Compile the sentence-boundary pattern: terminal punctuation runs
/// (covering "..." as well) followed by whitespace.
pub(crate) fn sentence_regex() -> Result<Regex> {
    Regex::new(r"[.!?…]+\s+").map_err(|e| EngineError::Configuration {
        message: format!("Invalid sentence pattern: {}", e),
    })
}

/// Split text into sentences, keeping terminal punctuation attached
pub(crate) fn split_sentences(re: &Regex, text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in re.find_iter(text) {
        let sentence = text[start..boundary.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Re-chunk coarse parent chunks into finer units.
///
/// Assigns a strictly increasing `chunk_id` across the whole document
/// (starting at 1; 0 is the no-parent sentinel) and records each fine
/// chunk's `parent_chunk_id` for traceability.
pub async fn process_chunks(
    chunker: &dyn Chunker,
    parent_chunks: &[Chunk],
    file_id: &str,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    let mut next_id: i64 = 1;

    for parent in parent_chunks {
        let pieces = chunker.split(&parent.content).await?;

        for piece in pieces {
            chunks.push(Chunk {
                chunk_id: next_id,
                content: piece,
                file_id: file_id.to_string(),
                parent_chunk_id: parent.chunk_id,
                source: parent.source.clone(),
                file_created_at: parent.file_created_at.clone(),
            });
            next_id += 1;
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_basic() {
        let re = sentence_regex().unwrap();
        let sentences = split_sentences(&re, "First one. Second one! Third one? Tail");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third one?", "Tail"]
        );
    }

    #[test]
    fn test_split_sentences_ellipsis() {
        let re = sentence_regex().unwrap();
        let sentences = split_sentences(&re, "Hmm... maybe. Sure.");
        assert_eq!(sentences, vec!["Hmm...", "maybe.", "Sure."]);
    }

    #[test]
    fn test_split_sentences_empty() {
        let re = sentence_regex().unwrap();
        assert!(split_sentences(&re, "").is_empty());
        assert!(split_sentences(&re, "   \n  ").is_empty());
    }

    #[tokio::test]
    async fn test_process_chunks_assigns_global_ids() {
        // A chunker that splits on semicolons, enough to drive id assignment
        struct SemiSplit;

        #[async_trait]
        impl Chunker for SemiSplit {
            async fn split(&self, text: &str) -> Result<Vec<String>> {
                Ok(text
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect())
            }
        }

        let parents = vec![
            Chunk {
                chunk_id: 1,
                content: "a; b".to_string(),
                file_id: "doc".to_string(),
                parent_chunk_id: 0,
                source: Some("upload".to_string()),
                file_created_at: None,
            },
            Chunk {
                chunk_id: 2,
                content: "c; d; e".to_string(),
                file_id: "doc".to_string(),
                parent_chunk_id: 0,
                source: Some("upload".to_string()),
                file_created_at: None,
            },
        ];

        let chunks = process_chunks(&SemiSplit, &parents, "doc").await.unwrap();

        let ids: Vec<i64> = chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let parents_of: Vec<i64> = chunks.iter().map(|c| c.parent_chunk_id).collect();
        assert_eq!(parents_of, vec![1, 1, 2, 2, 2]);

        assert!(chunks.iter().all(|c| c.source.as_deref() == Some("upload")));
    }
}

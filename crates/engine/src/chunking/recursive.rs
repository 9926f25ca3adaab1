//! Recursive token-budget chunking
//!
//! The raw split walks down separator granularity (paragraphs, then
//! sentences, then words) until every piece fits the token budget. Overlap
//! is applied afterwards: trailing sentences of the previous chunk are
//! prepended to the next one, up to `chunk_overlap` tokens.

use super::{sentence_regex, split_sentences, Chunker};
use async_trait::async_trait;
use recall_common::config::ChunkingConfig;
use recall_common::errors::Result;
use regex_lite::Regex;
use std::sync::Arc;
use text_splitter::{ChunkConfig, ChunkSizer, TextSplitter};
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::debug;

/// Token sizer backed by the cl100k tokenizer
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TokenCounter {
    pub fn cl100k() -> Result<Self> {
        let bpe = cl100k_base()?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Token count of a text span
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl ChunkSizer for TokenCounter {
    fn size(&self, chunk: &str) -> usize {
        self.count(chunk)
    }
}

/// Recursive chunker with backward sentence overlap
pub struct RecursiveChunker {
    splitter: TextSplitter<TokenCounter>,
    counter: TokenCounter,
    sentence_re: Regex,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        let counter = TokenCounter::cl100k()?;

        // The raw budget reserves room for the overlap prepend, so a chunk
        // never exceeds chunk_size tokens after overlap is applied.
        let raw_budget = config
            .chunk_size
            .saturating_sub(config.chunk_overlap)
            .max(1);

        let splitter = TextSplitter::new(ChunkConfig::new(raw_budget).with_sizer(counter.clone()));

        Ok(Self {
            splitter,
            counter,
            sentence_re: sentence_regex()?,
            chunk_overlap: config.chunk_overlap,
        })
    }

    /// Trailing sentences of `previous`, newest last, whose combined token
    /// count stays within the overlap budget.
    fn backward_overlap(&self, previous: &str) -> String {
        let sentences = split_sentences(&self.sentence_re, previous);

        let mut taken: Vec<&str> = Vec::new();
        let mut tokens = 0;

        for sentence in sentences.iter().rev() {
            let cost = self.counter.count(sentence);
            if tokens + cost > self.chunk_overlap {
                break;
            }
            tokens += cost;
            taken.push(sentence);
        }

        taken.reverse();
        taken.join(" ")
    }
}

#[async_trait]
impl Chunker for RecursiveChunker {
    async fn split(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<String> = self.splitter.chunks(text).map(str::to_string).collect();

        let mut chunks = Vec::with_capacity(raw.len());
        for (i, chunk) in raw.iter().enumerate() {
            let piece = if i == 0 {
                chunk.clone()
            } else {
                let overlap = self.backward_overlap(&raw[i - 1]);
                if overlap.is_empty() {
                    chunk.clone()
                } else {
                    format!("{} {}", overlap, chunk)
                }
            };

            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            chunks.push(trimmed.to_string());
        }

        debug!(
            input_len = text.len(),
            chunk_count = chunks.len(),
            "Text chunked"
        );

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            strategy: "recursive".to_string(),
            chunk_size,
            chunk_overlap,
            semantic_threshold: 0.3,
            min_chunk_length: 0,
        }
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for i in 0..120 {
            text.push_str(&format!(
                "Sentence number {} talks about retrieval engines and their many quirks. ",
                i
            ));
            if i % 10 == 9 {
                text.push_str("\n\n");
            }
        }
        text
    }

    #[tokio::test]
    async fn test_empty_input_gives_no_chunks() {
        let chunker = RecursiveChunker::new(&config(1000, 200)).unwrap();
        assert!(chunker.split("").await.unwrap().is_empty());
        assert!(chunker.split("   \n\t ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_input_is_one_chunk() {
        let chunker = RecursiveChunker::new(&config(1000, 200)).unwrap();
        let chunks = chunker.split("Just a little text.").await.unwrap();
        assert_eq!(chunks, vec!["Just a little text."]);
    }

    #[tokio::test]
    async fn test_chunks_stay_within_token_budget() {
        let config = config(1000, 200);
        let chunker = RecursiveChunker::new(&config).unwrap();
        let counter = TokenCounter::cl100k().unwrap();

        let chunks = chunker.split(&sample_text()).await.unwrap();
        assert!(chunks.len() > 1, "sample should need several chunks");

        for chunk in &chunks {
            assert!(
                counter.count(chunk) <= config.chunk_size,
                "chunk exceeds token budget"
            );
        }
    }

    #[tokio::test]
    async fn test_overlap_repeats_previous_tail() {
        let chunker = RecursiveChunker::new(&config(200, 50)).unwrap();
        let chunks = chunker.split(&sample_text()).await.unwrap();
        assert!(chunks.len() > 2);

        // Each later chunk starts with a sentence already present in its
        // predecessor.
        for window in chunks.windows(2) {
            let re = sentence_regex().unwrap();
            let first_sentence = split_sentences(&re, &window[1])
                .into_iter()
                .next()
                .unwrap();
            assert!(
                window[0].contains(&first_sentence),
                "overlap sentence missing from previous chunk"
            );
        }
    }

    #[tokio::test]
    async fn test_overlap_reconstructs_original_span() {
        let chunker = RecursiveChunker::new(&config(200, 50)).unwrap();
        let text = sample_text();
        let chunks = chunker.split(&text).await.unwrap();

        // Strip each chunk's overlap prefix (text it shares with its
        // predecessor), then the remainders concatenate to the original,
        // modulo whitespace normalization.
        let mut rebuilt = String::new();
        let mut previous: Option<&String> = None;
        for chunk in &chunks {
            let fresh = match previous {
                Some(prev) => {
                    let mut rest = chunk.as_str();
                    let re = sentence_regex().unwrap();
                    // Drop leading sentences that already appeared before
                    loop {
                        let sentences = split_sentences(&re, rest);
                        match sentences.first() {
                            Some(first) if prev.contains(first.as_str()) => {
                                rest = rest[rest.find(first.as_str()).unwrap() + first.len()..]
                                    .trim_start();
                            }
                            _ => break,
                        }
                    }
                    rest.to_string()
                }
                None => chunk.clone(),
            };
            rebuilt.push(' ');
            rebuilt.push_str(&fresh);
            previous = Some(chunk);
        }

        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&rebuilt), normalize(&text));
    }
}

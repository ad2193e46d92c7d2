//! Text chunking for retrieval.
//!
//! Pages are split with a recursive character splitter: the text is cut on the
//! coarsest separator present (paragraphs, then lines, then words, then single
//! characters), the pieces are merged greedily into chunks of at most
//! `chunk_size` characters, and up to `chunk_overlap` characters of trailing
//! context are repeated at the start of the next chunk.
//!
//! Lengths are counted in Unicode scalar values, not bytes.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::warn;

use crate::models::{DocumentPage, TextChunk};

/// Default maximum chunk length.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters and always applies.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Errors that can occur while configuring the splitter.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Chunk size / overlap combination is unusable
    #[error("Invalid chunking configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for chunking operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Splits text into overlapping, bounded chunks.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RecursiveCharacterSplitter {
    /// Create a splitter with the default separators.
    ///
    /// # Errors
    /// Returns `ChunkError::InvalidConfig` if `chunk_size` is zero or the
    /// overlap is not smaller than the chunk size
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> ChunkResult<Self> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidConfig("chunk size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every page and number the resulting chunks in document order.
    ///
    /// Chunks never span a page boundary.
    pub fn split_pages(&self, pages: &[DocumentPage]) -> Vec<TextChunk> {
        pages
            .iter()
            .flat_map(|page| {
                self.split_text(&page.text)
                    .into_iter()
                    .map(move |text| (page.number, text))
            })
            .enumerate()
            .map(|(index, (page, text))| TextChunk { index, page, text })
            .collect()
    }

    /// Split a single text into chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for split in splits {
            if char_len(split) < self.chunk_size {
                good_splits.push(split);
                continue;
            }
            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits, separator));
                good_splits.clear();
            }
            if remaining.is_empty() {
                chunks.push(split.to_string());
            } else {
                chunks.extend(self.split_recursive(split, remaining));
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits, separator));
        }

        chunks
    }

    /// Greedily combine small pieces into chunks, carrying overlap forward.
    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &split in splits {
            let len = char_len(split);
            let joined_len = |current: &VecDeque<&str>, total: usize| {
                total + len + if current.is_empty() { 0 } else { separator_len }
            };

            if joined_len(&current, total) > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }
                if !current.is_empty() {
                    if let Some(chunk) = join_chunk(&current, separator) {
                        chunks.push(chunk);
                    }
                    while total > self.chunk_overlap
                        || (joined_len(&current, total) > self.chunk_size && total > 0)
                    {
                        let Some(front) = current.pop_front() else {
                            break;
                        };
                        total -= char_len(front) + if current.is_empty() { 0 } else { separator_len };
                    }
                }
            }

            total += len + if current.is_empty() { 0 } else { separator_len };
            current.push_back(split);
        }

        if let Some(chunk) = join_chunk(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn join_chunk(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count).map(|i| format!("{:04}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_invalid_config() {
        assert!(RecursiveCharacterSplitter::new(0, 0).is_err());
        assert!(RecursiveCharacterSplitter::new(100, 100).is_err());
        assert!(RecursiveCharacterSplitter::new(100, 150).is_err());
        assert!(RecursiveCharacterSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_default_parameters() {
        let splitter = RecursiveCharacterSplitter::default();
        assert_eq!(splitter.chunk_size(), 1000);
        assert_eq!(splitter.chunk_overlap(), 200);
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = RecursiveCharacterSplitter::default();
        let chunks = splitter.split_text("  A short abstract about transformers.  ");
        assert_eq!(chunks, vec!["A short abstract about transformers.".to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        let splitter = RecursiveCharacterSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n \n ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let splitter = RecursiveCharacterSplitter::new(50, 20).unwrap();
        let text = numbered_words(200);

        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 50, "chunk too long: {:?}", chunk);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let splitter = RecursiveCharacterSplitter::new(50, 20).unwrap();
        let chunks = splitter.split_text(&numbered_words(200));

        for pair in chunks.windows(2) {
            let first_word_of_next = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].contains(first_word_of_next),
                "{:?} does not overlap {:?}",
                pair[0],
                pair[1]
            );
            assert_ne!(pair[0].split(' ').next(), pair[1].split(' ').next());
        }
    }

    #[test]
    fn test_no_content_is_lost() {
        let splitter = RecursiveCharacterSplitter::new(50, 20).unwrap();
        let chunks = splitter.split_text(&numbered_words(200));

        for i in 0..200 {
            let word = format!("{:04}", i);
            assert!(chunks.iter().any(|c| c.split(' ').any(|w| w == word)), "missing {}", word);
        }
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let splitter = RecursiveCharacterSplitter::new(40, 0).unwrap();
        let text = "First paragraph is here.\n\nSecond paragraph is here.";

        let chunks = splitter.split_text(text);

        assert_eq!(chunks, vec!["First paragraph is here.", "Second paragraph is here."]);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = RecursiveCharacterSplitter::new(10, 2).unwrap();
        let text = "x".repeat(35);

        let chunks = splitter.split_text(&text);

        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| char_len(c) <= 10));
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let splitter = RecursiveCharacterSplitter::new(10, 0).unwrap();
        let text = "é".repeat(10);

        let chunks = splitter.split_text(&text);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_split_is_deterministic() {
        let splitter = RecursiveCharacterSplitter::default();
        let text = "Lorem ipsum dolor sit amet.\n".repeat(300);
        assert_eq!(splitter.split_text(&text), splitter.split_text(&text));
    }

    #[test]
    fn test_split_pages_numbers_chunks_and_keeps_pages_apart() {
        let splitter = RecursiveCharacterSplitter::new(50, 10).unwrap();
        let pages = vec![
            DocumentPage { number: 1, text: numbered_words(30) },
            DocumentPage { number: 2, text: String::new() },
            DocumentPage { number: 3, text: "Conclusion.".to_string() },
        ];

        let chunks = splitter.split_pages(&pages);

        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.page, 3);
        assert_eq!(last.text, "Conclusion.");
        assert!(chunks.iter().all(|c| c.page != 2));
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.page == 1));
    }
}

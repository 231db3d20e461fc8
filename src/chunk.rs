//! Recursive separator-aware text chunker.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` characters, with
//! consecutive chunks sharing up to `chunk_overlap` characters. Boundaries
//! prefer the most semantic separator available:
//!
//! ```text
//! "\n\n"  paragraph
//! "\n"    line
//! "."     sentence end
//! " "     word
//! ""      character
//! ```
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text.
//! 2. Split on it, keeping the separator at the end of each piece.
//! 3. Merge consecutive pieces shorter than `chunk_size` greedily; when the
//!    next piece would overflow, emit the buffer and keep its tail (at most
//!    `chunk_overlap` characters) as the start of the next chunk.
//! 4. Pieces that are themselves `chunk_size` or longer are split again with
//!    the remaining, harder separators.
//!
//! Lengths are counted in characters, never bytes, so multi-byte text never
//! splits inside a code point.
//!
//! # Example
//!
//! ```rust
//! use policy_qa::chunk::Chunker;
//!
//! let chunker = Chunker::new(1000, 200);
//! let chunks = chunker.split_text("Deductible: $500.\n\nCopay: $20.");
//! assert_eq!(chunks, vec!["Deductible: $500.\n\nCopay: $20.".to_string()]);
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, PageText};

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// `chunk_overlap` is clamped below `chunk_size`; a zero size is treated as 1.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a single text into trimmed, non-empty chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.split_recursive(text, &SEPARATORS, &mut out);
        out
    }

    /// Split every page of a document, attaching source and page metadata.
    ///
    /// Chunk indices are contiguous across pages, starting at 0.
    pub fn split_pages(&self, source: &str, pages: &[PageText]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_index: i64 = 0;

        for page in pages {
            for text in self.split_text(&page.text) {
                chunks.push(make_chunk(source, page.page, chunk_index, &text));
                chunk_index += 1;
            }
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let harder = separators.get(position + 1..).unwrap_or(&[]);

        let mut good: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }

            if !good.is_empty() {
                self.merge(&good, out);
                good.clear();
            }
            if harder.is_empty() {
                push_trimmed(piece, out);
            } else {
                self.split_recursive(piece, harder, out);
            }
        }

        if !good.is_empty() {
            self.merge(&good, out);
        }
    }

    /// Greedily pack pieces into chunks, carrying an overlapping tail forward.
    fn merge(&self, pieces: &[&str], out: &mut Vec<String>) {
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                emit(&current, out);
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match current.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        emit(&current, out);
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, leaving it attached to the end of each piece.
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    text.split_inclusive(separator)
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn emit(current: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = current.iter().map(|(piece, _)| *piece).collect();
    push_trimmed(&joined, out);
}

fn push_trimmed(text: &str, out: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(source: &str, page: Option<u32>, index: i64, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash: content_hash(text),
    }
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Longest suffix of `prev` that is also a prefix of `next`, in characters.
    fn overlap_len(prev: &str, next: &str) -> usize {
        let prev: Vec<char> = prev.chars().collect();
        let next: Vec<char> = next.chars().collect();
        let max = prev.len().min(next.len());
        (1..=max)
            .rev()
            .find(|&k| prev[prev.len() - k..] == next[..k])
            .unwrap_or(0)
    }

    fn policy_text(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                let sep = match i % 7 {
                    6 => "\n\n",
                    3 => "\n",
                    _ => " ",
                };
                format!(
                    "Section {} limits coverage item {} to the scheduled amount.{}",
                    i,
                    i * 31,
                    sep
                )
            })
            .collect()
    }

    fn page(text: &str) -> PageText {
        PageText {
            page: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = Chunker::new(1000, 200).split_pages("doc1", &[page("Hello, world!")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source, "doc1");
    }

    #[test]
    fn test_empty_and_blank_text() {
        let chunker = Chunker::new(1000, 200);
        assert!(chunker.split_text("").is_empty());
        assert!(chunker.split_text(" \n\n \n").is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = Chunker::new(1000, 200).split_text(text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("First paragraph."));
        assert!(chunks[0].contains("Third paragraph."));
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "Alpha alpha alpha.\n\nBeta beta beta.\n\nGamma gamma gamma.";
        let chunks = Chunker::new(20, 0).split_text(text);
        assert_eq!(
            chunks,
            vec!["Alpha alpha alpha.", "Beta beta beta.", "Gamma gamma gamma."]
        );
    }

    #[test]
    fn test_falls_back_to_words_then_characters() {
        let chunks = Chunker::new(10, 0).split_text("one two three four");
        assert_eq!(chunks, vec!["one two", "three four"]);

        let chunks = Chunker::new(4, 0).split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_character_split_overlap_is_exact() {
        let text: String = (0..30).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = Chunker::new(10, 3).split_text(&text);
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        for pair in chunks.windows(2) {
            assert_eq!(overlap_len(&pair[0], &pair[1]), 3);
        }
    }

    #[test]
    fn test_size_and_overlap_bounds_hold_for_all_configs() {
        let text = policy_text(120);
        for &(size, overlap) in &[(1000, 200), (500, 100), (200, 50), (120, 0), (64, 63), (30, 10)] {
            let chunks = Chunker::new(size, overlap).split_text(&text);
            assert!(!chunks.is_empty());
            for c in &chunks {
                assert!(
                    c.chars().count() <= size,
                    "chunk of {} chars exceeds {} (overlap {})",
                    c.chars().count(),
                    size,
                    overlap
                );
            }
            for pair in chunks.windows(2) {
                let ov = overlap_len(&pair[0], &pair[1]);
                assert!(ov <= overlap, "overlap {} exceeds {} (size {})", ov, overlap, size);
            }
        }
    }

    #[test]
    fn test_no_text_is_lost() {
        let text = policy_text(40);
        let chunks = Chunker::new(150, 30).split_text(&text);
        for sentence in text.split_inclusive('.') {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            assert!(
                chunks.iter().any(|c| c.contains(sentence)),
                "sentence missing from chunks: {:?}",
                sentence
            );
        }
    }

    // 1000-char chunks with a 200-char overlap advance about 800 chars
    // each: 0..1000, ~800..1800, ~1600..2500. Separator boundaries can pull
    // a cut earlier and add a fourth chunk, so both counts are accepted.
    #[test]
    fn test_2500_char_document_with_default_settings() {
        let mut text: String = (0..60)
            .map(|i| format!("Clause {:03} covers the deductible for outpatient care. ", i))
            .collect();
        text = text.chars().take(2500).collect();
        assert_eq!(text.chars().count(), 2500);

        let chunks = Chunker::default().split_pages("plan.txt", &[page(&text)]);
        assert!(
            (3..=4).contains(&chunks.len()),
            "expected 3-4 chunks, got {}",
            chunks.len()
        );
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000);
        }
        for pair in chunks.windows(2) {
            let ov = overlap_len(&pair[0].text, &pair[1].text);
            assert!(ov > 100 && ov <= 200, "unexpected overlap {}", ov);
        }
    }

    #[test]
    fn test_chunk_indices_contiguous_across_pages() {
        let pages = vec![
            PageText {
                page: Some(1),
                text: policy_text(20),
            },
            PageText {
                page: Some(2),
                text: policy_text(20),
            },
        ];
        let chunks = Chunker::new(200, 40).split_pages("policy.pdf", &pages);
        assert!(chunks.iter().any(|c| c.page == Some(1)));
        assert!(chunks.iter().any(|c| c.page == Some(2)));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
        let first_page_two = chunks.iter().position(|c| c.page == Some(2)).unwrap();
        assert!(chunks[first_page_two..].iter().all(|c| c.page == Some(2)));
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Prämie für Zähne │\n└──────────────────┘";
        let chunks = Chunker::new(8, 2).split_text(text);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 8);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = policy_text(30);
        let c1 = Chunker::new(100, 20).split_pages("doc1", &[page(&text)]);
        let c2 = Chunker::new(100, 20).split_pages("doc1", &[page(&text)]);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}

//! Recursive chunking strategy with overlap

use std::collections::VecDeque;

use unicode_segmentation::UnicodeSegmentation;

use crate::domain::ingestion::{Chunk, ChunkMetadata, ChunkingConfig, ChunkingStrategy};
use crate::domain::DomainError;

/// Split granularity, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Paragraph,
    Line,
    Sentence,
    Word,
    Grapheme,
}

const LEVELS: [Level; 5] = [
    Level::Paragraph,
    Level::Line,
    Level::Sentence,
    Level::Word,
    Level::Grapheme,
];

impl Level {
    fn split(self, text: &str) -> Vec<&str> {
        let parts: Vec<&str> = match self {
            Self::Paragraph => text.split("\n\n").collect(),
            Self::Line => text.split('\n').collect(),
            Self::Sentence => text.split_sentence_bounds().collect(),
            Self::Word => text.split(' ').collect(),
            Self::Grapheme => text.graphemes(true).collect(),
        };

        parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
    }

    /// Text re-inserted between merged pieces
    fn joiner(self) -> &'static str {
        match self {
            Self::Paragraph => "\n\n",
            Self::Line => "\n",
            Self::Word => " ",
            Self::Sentence | Self::Grapheme => "",
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Chunking strategy that splits hierarchically and carries an overlap window.
///
/// Splitting order: paragraphs -> lines -> sentences -> words -> graphemes. Pieces that
/// fit are greedily merged up to `chunk_size`; when a chunk is emitted, trailing pieces
/// totalling at most `chunk_overlap` seed the next one.
#[derive(Debug, Clone, Default)]
pub struct RecursiveChunker;

impl RecursiveChunker {
    pub fn new() -> Self {
        Self
    }

    fn split_recursive(text: &str, levels: &[Level], config: &ChunkingConfig) -> Vec<String> {
        let Some((&level, finer)) = levels.split_first() else {
            return vec![text.to_string()];
        };

        let mut output = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for part in level.split(text) {
            if char_len(part) <= config.chunk_size {
                fitting.push(part);
                continue;
            }

            if !fitting.is_empty() {
                output.extend(Self::merge(&fitting, level.joiner(), config));
                fitting.clear();
            }

            if finer.is_empty() {
                output.push(part.trim().to_string());
            } else {
                output.extend(Self::split_recursive(part, finer, config));
            }
        }

        if !fitting.is_empty() {
            output.extend(Self::merge(&fitting, level.joiner(), config));
        }

        output
    }

    fn merge(pieces: &[&str], joiner: &str, config: &ChunkingConfig) -> Vec<String> {
        let joiner_len = char_len(joiner);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        let joined_cost = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { joiner_len };

        for &piece in pieces {
            let len = char_len(piece);

            if !window.is_empty() && total + len + joined_cost(&window) > config.chunk_size {
                Self::emit(&window, joiner, &mut chunks);

                while !window.is_empty()
                    && (total > config.chunk_overlap
                        || total + len + joined_cost(&window) > config.chunk_size)
                {
                    if let Some(removed) = window.pop_front() {
                        total -= char_len(removed) + joined_cost(&window);
                    }
                }
            }

            total += len + joined_cost(&window);
            window.push_back(piece);
        }

        Self::emit(&window, joiner, &mut chunks);
        chunks
    }

    fn emit(window: &VecDeque<&str>, joiner: &str, chunks: &mut Vec<String>) {
        let text = window
            .iter()
            .copied()
            .collect::<Vec<_>>()
            .join(joiner)
            .trim()
            .to_string();

        if !text.is_empty() {
            chunks.push(text);
        }
    }

    /// Character offset of `needle` in `content`, searching from `from_byte`
    fn locate(content: &str, needle: &str, from_byte: usize) -> Option<(usize, usize)> {
        let found = content
            .get(from_byte..)
            .and_then(|rest| rest.find(needle))
            .map(|pos| from_byte + pos)
            .or_else(|| content.find(needle))?;

        Some((found, char_len(&content[..found])))
    }
}

impl ChunkingStrategy for RecursiveChunker {
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>, DomainError> {
        config.validate()?;

        let content = content.trim();

        if content.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<String> = Self::split_recursive(content, &LEVELS, config)
            .into_iter()
            .filter(|text| char_len(text) >= config.min_chunk_size)
            .collect();

        let total = texts.len();
        let mut chunks = Vec::with_capacity(total);
        let mut search_from = 0usize;

        for (index, text) in texts.into_iter().enumerate() {
            let len = char_len(&text);
            let (char_start, next_from) = match Self::locate(content, &text, search_from) {
                Some((byte_pos, char_pos)) => {
                    let step = content[byte_pos..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(0);
                    (char_pos, byte_pos + step)
                }
                None => (0, search_from),
            };
            search_from = next_from;

            chunks.push(Chunk::new(
                text,
                ChunkMetadata::new(index, total, char_start, char_start + len),
            ));
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "recursive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(seed: usize, sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence {} of paragraph {} talks about revenue growth.", i, seed))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_content() {
        let chunks = RecursiveChunker::new()
            .chunk("   ", &ChunkingConfig::default())
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_document_below_minimum_is_dropped() {
        let chunks = RecursiveChunker::new()
            .chunk("Tiny pitch deck.", &ChunkingConfig::default())
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_single_chunk_document() {
        let text = "Acme builds reusable rockets for small satellite operators worldwide.";
        let chunks = RecursiveChunker::new()
            .chunk(text, &ChunkingConfig::default())
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].metadata, ChunkMetadata::new(0, 1, 0, text.chars().count()));
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let text = (0..12)
            .map(|i| paragraph(i, 4))
            .collect::<Vec<_>>()
            .join("\n\n");
        let config = ChunkingConfig::new(500, 120);
        let chunks = RecursiveChunker::new().chunk(&text, &config).unwrap();

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 500, "chunk too long: {}", chunk.char_len());
            assert_eq!(chunk.metadata.total_chunks, chunks.len());
        }

        for pair in chunks.windows(2) {
            assert!(pair[1].metadata.char_start > pair[0].metadata.char_start);
        }
    }

    #[test]
    fn test_overlap_repeats_trailing_text() {
        let text = (0..40)
            .map(|i| format!("Fact number {} about the business model.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let config = ChunkingConfig::new(200, 80).with_min_chunk_size(10);
        let chunks = RecursiveChunker::new().chunk(&text, &config).unwrap();

        assert!(chunks.len() > 1);
        let first_last_line = chunks[0].content.lines().last().unwrap();
        assert!(chunks[1].content.contains(first_last_line));
    }

    #[test]
    fn test_long_unbroken_word_is_split() {
        let text = "x".repeat(2500);
        let config = ChunkingConfig::new(1000, 200);
        let chunks = RecursiveChunker::new().chunk(&text, &config).unwrap();

        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.char_len() <= 1000));
    }

    #[test]
    fn test_multibyte_text_offsets() {
        let text = "Überraschend starke Kundenbindung in München und Zürich. ".repeat(40);
        let config = ChunkingConfig::new(300, 50);
        let chunks = RecursiveChunker::new().chunk(&text, &config).unwrap();

        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(chunk.metadata.char_end > chunk.metadata.char_start);
        }
    }
}

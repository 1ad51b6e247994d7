//! Sliding-window text chunking with a fixed character overlap.

use crate::models::{Document, DocumentChunk, IndexingConfig};
use crate::utils::has_content;

/// Splits documents into overlapping chunks measured in characters.
///
/// Each window prefers to end on a paragraph, line, sentence or word boundary
/// found in its last fifth. The next window always starts exactly `overlap`
/// characters before the previous one ended, so adjacent chunks share
/// `overlap` characters regardless of where the break landed.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// `overlap` is clamped below `chunk_size` so every window makes progress.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &IndexingConfig) -> Self {
        Self::new(config.chunk_size as usize, config.chunk_overlap as usize)
    }

    pub fn with_defaults() -> Self {
        Self::from_config(&IndexingConfig::default())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a document in order. Blank documents produce no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<DocumentChunk> {
        if !has_content(&document.content) {
            return Vec::new();
        }

        let chars: Vec<char> = document.content.chars().collect();
        let spans = self.split_spans(&chars);
        let total_chunks = spans.len() as u32;

        spans
            .into_iter()
            .enumerate()
            .map(|(idx, (start, end))| {
                DocumentChunk::from_document(
                    document,
                    chars[start..end].iter().collect(),
                    idx as u32,
                    total_chunks,
                    start as u64,
                    end as u64,
                )
            })
            .collect()
    }

    /// Split plain text, returning only the chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        self.split_spans(&chars)
            .into_iter()
            .map(|(start, end)| chars[start..end].iter().collect())
            .collect()
    }

    /// Character spans `[start, end)` of each chunk.
    fn split_spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }
        if total <= self.chunk_size {
            return vec![(0, total)];
        }

        let mut spans = Vec::with_capacity(total / (self.chunk_size - self.overlap) + 1);
        let mut start = 0;

        loop {
            let target_end = (start + self.chunk_size).min(total);
            let end = self.find_break_point(chars, start, target_end, total);
            spans.push((start, end));

            if end >= total {
                break;
            }
            start = end - self.overlap;
        }

        spans
    }

    /// Find a natural break point near `target_end`.
    ///
    /// The result is always greater than `start + overlap`, which keeps the
    /// following window strictly ahead of this one.
    fn find_break_point(
        &self,
        chars: &[char],
        start: usize,
        target_end: usize,
        total: usize,
    ) -> usize {
        if target_end >= total {
            return total;
        }

        let search_start = target_end
            .saturating_sub(self.chunk_size / 5)
            .max(start + self.overlap + 1);
        if search_start >= target_end {
            return target_end;
        }

        // Priority: paragraph > line > sentence > word
        let mut paragraph = None;
        let mut line = None;
        let mut sentence = None;
        let mut word = None;

        for pos in search_start..target_end {
            match chars[pos] {
                '\n' => {
                    if pos > 0 && chars[pos - 1] == '\n' {
                        paragraph = Some(pos + 1);
                    }
                    line = Some(pos + 1);
                }
                '.' | '!' | '?' => {
                    if chars.get(pos + 1).is_some_and(|c| c.is_whitespace()) {
                        sentence = Some(pos + 1);
                    }
                }
                ' ' | '\t' => word = Some(pos + 1),
                _ => {}
            }
        }

        paragraph
            .or(line)
            .or(sentence)
            .or(word)
            .unwrap_or(target_end)
            .min(target_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn create_test_document(content: &str) -> Document {
        Document::new(
            content.to_string(),
            "/test.txt".to_string(),
            "test_checksum".to_string(),
            DocumentMetadata::default(),
        )
    }

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                let mut s = format!("Sentence number {i} talks about topic {} at length.", i % 7);
                if i % 9 == 8 {
                    s.push_str("\n\n");
                } else if i % 4 == 3 {
                    s.push('\n');
                } else {
                    s.push(' ');
                }
                s
            })
            .collect()
    }

    fn assert_overlap_invariants(chunks: &[String], chunk_size: usize, overlap: usize) {
        for chunk in chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= chunk_size);
        }
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = next[..overlap].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunker = TextChunker::with_defaults();
        let doc = create_test_document("Hello, world!");
        let chunks = chunker.chunk(&doc);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].source, "/test.txt");
    }

    #[test]
    fn test_empty_and_blank_documents() {
        let chunker = TextChunker::with_defaults();
        assert!(chunker.chunk(&create_test_document("")).is_empty());
        assert!(chunker.chunk(&create_test_document("  \n\n\t ")).is_empty());
    }

    #[test]
    fn test_default_sizes_keep_overlap_on_prose() {
        let chunker = TextChunker::with_defaults();
        let text = prose(400);
        let chunks = chunker.split_text(&text);

        assert!(chunks.len() > 5);
        assert_overlap_invariants(&chunks, 1000, 100);
    }

    #[test]
    fn test_overlap_without_break_points() {
        let chunker = TextChunker::new(200, 40);
        let text: String = ('a'..='z').cycle().take(1234).collect();
        let chunks = chunker.split_text(&text);

        assert_overlap_invariants(&chunks, 200, 40);
        // No break points: every full window is exactly chunk_size
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.len() == 200));
    }

    #[test]
    fn test_chunks_cover_document_in_order() {
        let chunker = TextChunker::new(120, 20);
        let text = prose(60);
        let doc = create_test_document(&text);
        let chunks = chunker.chunk(&doc);

        let mut rebuilt = chunks[0].content.clone();
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_offset, pair[0].end_offset - 20);
            rebuilt.extend(pair[1].content.chars().skip(20));
        }
        assert_eq!(rebuilt, text);
        assert_eq!(chunks.last().unwrap().end_offset, text.chars().count() as u64);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.total_chunks, chunks.len() as u32);
        }
    }

    #[test]
    fn test_multibyte_text() {
        let chunker = TextChunker::new(50, 10);
        let text = "Größenordnung über Äpfel und Öl. ".repeat(20) + "日本語のテキスト。".repeat(10).as_str();
        let chunks = chunker.split_text(&text);

        assert_overlap_invariants(&chunks, 50, 10);
    }

    #[test]
    fn test_overlap_clamped_below_chunk_size() {
        let chunker = TextChunker::new(10, 50);
        assert_eq!(chunker.overlap(), 9);
        let chunks = chunker.split_text(&"x".repeat(40));
        assert_overlap_invariants(&chunks, 10, 9);
    }
}

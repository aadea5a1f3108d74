use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{ChunkRecord, IngestionOptions};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkingConfig {
    /// Invalid parameters are fatal at startup, before any file is touched.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl From<IngestionOptions> for ChunkingConfig {
    fn from(value: IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

pub(crate) const STOP_WORDS: [&str; 42] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "can", "what", "how", "when", "where", "why",
    "who", "this", "that", "it",
];

/// Lowercased word tokens with punctuation stripped, stop words and
/// one/two-letter fragments removed. Shared by the embedder and the lexical
/// contribution matcher.
pub(crate) fn content_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(word))
        .map(|word| word.to_string())
        .collect()
}

/// Cuts one page into overlapping fixed-size character windows. Windows that
/// are empty after trimming are skipped. Boundaries step by
/// `chunk_size - overlap` so no fact spanning a boundary is dropped.
/// Callers enter through `chunk_pages`, which validates the config; the step
/// is clamped to at least one character so a degenerate config cannot
/// underflow or stall the loop.
pub(crate) fn sliding_windows(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = config.chunk_size.saturating_sub(config.overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            windows.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

/// Chunks every page of one source document. `chunk_index` runs sequentially
/// across all pages of the file, preserving document order for citation and
/// neighbor lookups. Embeddings are left empty for the embedding stage.
pub fn chunk_pages(
    pages: &[PageText],
    source_file: &str,
    config: ChunkingConfig,
    start_index: u64,
) -> Result<(Vec<ChunkRecord>, u64), IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = start_index;

    for page in pages {
        let normalized = normalize_whitespace(&page.text);
        for window in sliding_windows(&normalized, config) {
            let chunk_id = make_chunk_id(source_file, page.number, cursor, &window);
            chunks.push(ChunkRecord {
                chunk_id,
                text: window,
                source_file: source_file.to_string(),
                page_number: Some(page.number),
                chunk_index: cursor,
                embedding: Vec::new(),
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok((chunks, cursor))
}

fn make_chunk_id(source_file: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_file.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

//! Boundary-aware text chunker with overlap.
//!
//! Text is first broken into pieces no larger than the chunk size, trying
//! separators in order (paragraph, line, sentence, word) and falling back to
//! hard character cuts. Pieces are then packed greedily into chunks; when a
//! chunk is emitted, trailing pieces totalling at most `overlap` characters
//! are carried into the next one.
//!
//! Sizes are configured in tokens and approximated at [`CHARS_PER_TOKEN`]
//! characters per token. All lengths are counted in `char`s, so multi-byte
//! text is never split inside a code point.

use std::collections::VecDeque;
use std::path::Path;

use crate::config::ChunkingConfig;
use crate::error::{IndexError, Result};
use crate::models::Chunk;

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self::with_char_limits(
            config.chunk_size.saturating_mul(CHARS_PER_TOKEN),
            config.chunk_overlap.saturating_mul(CHARS_PER_TOKEN),
        )
    }

    /// Build a chunker from raw character limits. `max_chars` is clamped to at
    /// least 1 and `overlap_chars` to below `max_chars`.
    pub fn with_char_limits(max_chars: usize, overlap_chars: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            max_chars,
            overlap_chars: overlap_chars.min(max_chars - 1),
        }
    }

    /// Chunk a file's text. Indices are contiguous from 0.
    pub fn chunk(&self, source_path: &str, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(i, content)| Chunk {
                source_path: source_path.to_string(),
                content,
                sequence_index: i,
            })
            .collect()
    }

    /// Split text into chunk strings. Whitespace-only text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        split_pieces(text, SEPARATORS, self.max_chars, &mut pieces);

        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut window_len = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece);

            if window_len + piece_len > self.max_chars && !window.is_empty() {
                push_window(&window, &mut chunks);

                // Keep a tail of at most `overlap_chars` that still leaves room
                // for the incoming piece.
                while window_len > self.overlap_chars
                    || (window_len > 0 && window_len + piece_len > self.max_chars)
                {
                    if let Some((_, len)) = window.pop_front() {
                        window_len -= len;
                    }
                }
            }

            window.push_back((piece, piece_len));
            window_len += piece_len;
        }

        if !window.is_empty() {
            push_window(&window, &mut chunks);
        }

        chunks
    }
}

/// Read a file as UTF-8 text.
pub fn load_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| IndexError::UnreadableFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| IndexError::UnreadableFile {
        path: path.display().to_string(),
        reason: format!("not valid UTF-8: {}", e.utf8_error()),
    })
}

fn push_window(window: &VecDeque<(&str, usize)>, chunks: &mut Vec<String>) {
    let text: String = window.iter().map(|(p, _)| *p).collect();
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Break `text` into pieces of at most `max` chars. Separators stay attached
/// to the end of the piece they terminate, so concatenating all pieces
/// reproduces `text`.
fn split_pieces<'a>(text: &'a str, separators: &[&str], max: usize, out: &mut Vec<&'a str>) {
    if char_len(text) <= max {
        out.push(text);
        return;
    }

    let Some((sep, rest)) = separators.split_first() else {
        hard_split(text, max, out);
        return;
    };

    if !text.contains(sep) {
        split_pieces(text, rest, max, out);
        return;
    }

    for part in text.split_inclusive(sep) {
        if char_len(part) <= max {
            out.push(part);
        } else {
            split_pieces(part, rest, max, out);
        }
    }
}

fn hard_split<'a>(text: &'a str, max: usize, out: &mut Vec<&'a str>) {
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

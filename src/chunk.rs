//! Recursive-separator text chunker with overlap.
//!
//! Splits body text into bounded-size segments for embedding. Each window
//! is at most `chunk_size` characters; its end is pulled back to the
//! highest-priority separator found inside the window so chunks end on
//! paragraph, line, sentence, or word boundaries whenever possible. The
//! next chunk starts `chunk_overlap` characters before the previous
//! chunk's end, so context carries across chunk boundaries.
//!
//! # Algorithm
//!
//! 1. Collect the text as a character sequence (sizes are in characters,
//!    not bytes).
//! 2. Take a window of `chunk_size` characters.
//! 3. Pull the window end back to the last occurrence of the first
//!    separator in `["\n\n", "\n", ". ", " "]` that appears inside it.
//!    A cut that would leave the chunk no longer than `chunk_overlap`
//!    is skipped in favor of a lower-priority separator; if no
//!    separator yields a long-enough chunk, hard-cut at `chunk_size`.
//! 4. Emit the window verbatim and restart exactly `chunk_overlap`
//!    characters before its end.
//!
//! Deterministic and pure: the same input always yields the same
//! sequence, and concatenating the emitted windows minus their overlaps
//! reconstructs the input exactly.

use tracing::debug;

use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkMetadata, ContentItem};

/// Boundary candidates, highest priority first. The empty string stands
/// for a hard cut at `chunk_size`.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split text into overlapping segments of at most `chunk_size` characters.
///
/// Empty text yields an empty sequence. Fails with a configuration error
/// when `chunk_size` is zero or `chunk_overlap >= chunk_size`; this is
/// the only failure mode.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(RagError::Configuration(
            "chunk_size must be greater than zero".into(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::Configuration(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + chunk_size).min(chars.len());
        let end = if window_end < chars.len() {
            best_break(&chars, start, window_end, chunk_overlap)
        } else {
            window_end
        };

        chunks.push(chars[start..end].iter().collect::<String>());

        if end >= chars.len() {
            break;
        }
        // Every emitted chunk is strictly longer than the overlap, so the
        // restart always lands inside it and always makes progress.
        start = end - chunk_overlap;
    }

    debug!(
        chunks = chunks.len(),
        chunk_size, chunk_overlap, "split text"
    );
    Ok(chunks)
}

/// Pick the cut position for a window ending at `window_end`.
///
/// Returns the end of the last occurrence of the highest-priority
/// separator that finishes inside the window and leaves a chunk strictly
/// longer than `min_len`, or `window_end` when no separator qualifies
/// (single oversized token, hard cut). The length bound keeps the
/// overlap restart inside the emitted chunk; a cut at or before
/// `start + min_len` would stall the scan on the same separator.
fn best_break(chars: &[char], start: usize, window_end: usize, min_len: usize) -> usize {
    let window = &chars[start..window_end];
    for sep in SEPARATORS {
        let sep_chars: Vec<char> = sep.chars().collect();
        if window.len() < sep_chars.len() {
            continue;
        }
        for i in (0..=window.len() - sep_chars.len()).rev() {
            if window[i..i + sep_chars.len()] == sep_chars[..] {
                let cut = start + i + sep_chars.len();
                if cut - start > min_len {
                    return cut;
                }
                // The last occurrence is already too close to the window
                // start; earlier ones are closer still.
                break;
            }
        }
    }
    window_end
}

/// Chunk a content item and attach per-chunk metadata.
///
/// Every chunk inherits the item's tags plus its position
/// (`chunk_index`, `total_chunks`); extension metadata is carried with a
/// `content_` key prefix. Chunk ids follow `{content_id}_chunk_{index}`.
pub fn chunk_content_item(
    item: &ContentItem,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    let texts = split_text(&item.body, chunk_size, chunk_overlap)?;
    let total = texts.len();

    let extra = item
        .metadata
        .iter()
        .map(|(k, v)| (format!("content_{}", k), v.clone()))
        .collect::<std::collections::BTreeMap<_, _>>();

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            id: format!("{}_chunk_{}", item.id, index),
            index,
            text,
            metadata: ChunkMetadata {
                content_id: item.id.clone(),
                chunk_index: index,
                total_chunks: total,
                subject: item.subject.clone(),
                source_type: item.content_type,
                chapter: item.chapter.clone().unwrap_or_default(),
                topic_id: item.topic_id.clone().unwrap_or_default(),
                difficulty: item
                    .difficulty
                    .map(|d| d.as_str().to_string())
                    .unwrap_or_default(),
                extra: extra.clone(),
            },
        })
        .collect())
}

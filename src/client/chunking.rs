//! Splitting one input into contiguous chunks for parallel pipeline runs.
//!
//! Small inputs are split on word boundaries, so no token is ever cut.
//! Inputs longer than the large-input threshold are split by character,
//! which is cheaper and never cuts a UTF-8 scalar.

use crate::PipelineError;

/// How [`split_into_chunks`] partitioned the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    /// Whitespace tokens re-joined with single spaces.
    Words,
    /// Raw character ranges.
    Chars,
}

/// The pieces of one input, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunks {
    /// How the input was split.
    pub mode: ChunkMode,
    /// Exactly `n` pieces; earlier ones may be empty when the input is
    /// shorter than `n` units.
    pub pieces: Vec<String>,
}

/// Partition `text` into exactly `n` contiguous chunks.
///
/// Every chunk but the last holds `units / n` units (words or characters);
/// the last one takes the remainder.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] if `n` is zero.
///
/// # Panics
///
/// This function never panics.
pub fn split_into_chunks(
    text: &str,
    n: usize,
    large_input_threshold_chars: usize,
) -> Result<Chunks, PipelineError> {
    if n == 0 {
        return Err(PipelineError::InvalidRequest(
            "chunk count must be at least 1".to_string(),
        ));
    }

    let char_len = text.chars().count();
    if char_len > large_input_threshold_chars {
        Ok(Chunks {
            mode: ChunkMode::Chars,
            pieces: split_chars(text, char_len, n),
        })
    } else {
        Ok(Chunks {
            mode: ChunkMode::Words,
            pieces: split_words(text, n),
        })
    }
}

/// `[start, end)` of chunk `i` out of `n` over `len` units.
fn bounds(i: usize, n: usize, len: usize) -> (usize, usize) {
    let size = len / n;
    let start = i * size;
    let end = if i + 1 == n { len } else { start + size };
    (start, end)
}

fn split_words(text: &str, n: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    (0..n)
        .map(|i| {
            let (start, end) = bounds(i, n, words.len());
            words[start..end].join(" ")
        })
        .collect()
}

fn split_chars(text: &str, char_len: usize, n: usize) -> Vec<String> {
    // Byte offset of every char boundary, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    (0..n)
        .map(|i| {
            let (start, end) = bounds(i, n, char_len);
            text[offsets[start]..offsets[end]].to_string()
        })
        .collect()
}

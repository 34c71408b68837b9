//! Lossless content splitting for over-long chunks.
//!
//! Cut points prefer paragraph boundaries, then sentence boundaries, then a
//! hard cut at the length bound. No characters are dropped: concatenating
//! the pieces reproduces the input exactly.

use crate::config::ChunkingStrategy;

/// Split `content` into pieces of at most `max_len` bytes.
///
/// Returns a single piece when the content already fits. Every cut lands on
/// a char boundary.
#[must_use]
pub fn split_content(content: &str, max_len: usize, strategy: ChunkingStrategy) -> Vec<String> {
    if content.len() <= max_len || max_len == 0 {
        return vec![content.to_string()];
    }

    let mut pieces = Vec::new();
    let mut rest = content;
    while rest.len() > max_len {
        let hard = floor_char_boundary(rest, max_len);
        let cut = match strategy {
            ChunkingStrategy::Fixed => hard,
            ChunkingStrategy::Semantic | ChunkingStrategy::Adaptive => {
                let window = &rest[..hard];
                match paragraph_cut(window).or_else(|| sentence_cut(window)) {
                    Some(boundary) if boundary > 0 => boundary,
                    _ => hard,
                }
            }
        };
        // A zero cut can only happen when max_len is below one char; advance
        // by a whole char so the loop always makes progress.
        let cut = if cut == 0 {
            rest.chars().next().map_or(rest.len(), char::len_utf8)
        } else {
            cut
        };
        pieces.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Largest index `<= max` that is a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut i = max.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Cut just after the last blank line in the window.
fn paragraph_cut(window: &str) -> Option<usize> {
    window.rfind("\n\n").map(|i| i + 2)
}

/// Cut just after the last sentence terminator followed by whitespace.
fn sentence_cut(window: &str) -> Option<usize> {
    let bytes = window.as_bytes();
    let mut best = None;
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            if let Some(&next) = bytes.get(i + 1) {
                if next.is_ascii_whitespace() {
                    best = Some(i + 2);
                }
            }
        }
    }
    best
}

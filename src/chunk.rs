//! Overlapping, boundary-aware text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` bytes, each
//! sharing `overlap` bytes with the tail of its predecessor. Every chunk is
//! an exact byte range of the input, so dropping the overlapped prefix of
//! each chunk and concatenating reconstructs the document.
//!
//! # Algorithm
//!
//! 1. Reject `chunk_size == 0` and `chunk_size <= overlap`.
//! 2. From the current start, take a window of `chunk_size` bytes (snapped
//!    back to a UTF-8 boundary).
//! 3. End the chunk at the last paragraph break in the window; failing that
//!    the last line break, sentence end, or space; failing all of those, cut
//!    at the window end. A break is only accepted if it lies past
//!    `start + overlap`, so the next chunk always advances.
//! 4. Start the next chunk `overlap` bytes before the previous end.
//!
//! # Example
//!
//! ```rust
//! use ragchat::chunk::split_text;
//!
//! let chunks = split_text("faq.txt", "Hello world.\n\nSecond paragraph.", 1000, 200).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "faq.txt:0-31");
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Break points, strongest first. All are ASCII so a match position is
/// always a char boundary.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

/// Split `text` into overlapping chunks.
///
/// # Errors
///
/// Returns [`RagError::Configuration`] if `chunk_size` is zero or not
/// greater than `overlap`.
///
/// # Guarantees
///
/// - Empty or whitespace-only input yields no chunks.
/// - No chunk is empty; indices are contiguous from 0.
/// - Output is a pure function of the arguments.
pub fn split_text(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 || chunk_size <= overlap {
        return Err(RagError::config(format!(
            "chunk_size ({}) must be greater than overlap ({})",
            chunk_size, overlap
        )));
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut prev_end = 0;

    loop {
        let limit = start + chunk_size;
        let end = if limit >= text.len() {
            text.len()
        } else {
            find_break(text, start, limit, overlap, prev_end)
        };
        chunks.push(make_chunk(source_id, chunks.len(), text, start, end));
        if end >= text.len() {
            break;
        }
        prev_end = end;

        let candidate = snap_to_char_boundary(text, end.saturating_sub(overlap));
        start = if candidate > start {
            candidate
        } else {
            next_char_boundary(text, start)
        };
    }

    Ok(chunks)
}

/// Choose where the chunk starting at `start` ends, given a byte budget
/// ending at `limit`.
///
/// The result is always past `prev_end`, so no chunk is contained in its
/// predecessor, even when a multibyte char straddles the budget.
fn find_break(text: &str, start: usize, limit: usize, overlap: usize, prev_end: usize) -> usize {
    let mut hard = snap_to_char_boundary(text, limit);
    if hard <= start.max(prev_end) {
        hard = next_char_boundary(text, start.max(prev_end));
    }

    let min_end = (start + overlap + 1).max(prev_end + 1);
    if min_end >= hard {
        return hard;
    }

    let window = &text[start..hard];
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let end = start + pos + sep.len();
            if end >= min_end {
                return end;
            }
        }
    }

    hard
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// The first char boundary strictly after `index`.
fn next_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index + 1;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i.min(s.len())
}

fn make_chunk(source_id: &str, index: usize, text: &str, start: usize, end: usize) -> Chunk {
    let piece = &text[start..end];
    let mut hasher = Sha256::new();
    hasher.update(piece.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}:{}-{}", source_id, start, end),
        source_id: source_id.to_string(),
        chunk_index: index as i64,
        start,
        end,
        text: piece.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drop each chunk's overlap with its predecessor and concatenate.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for c in chunks {
            assert!(c.start <= covered, "gap before chunk {}", c.chunk_index);
            out.push_str(&c.text[covered - c.start..]);
            covered = c.end;
        }
        out
    }

    fn sample_text() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Paragraph {} talks about counseling programs. Sessions run weekly? Yes! \
                     Parents can enroll at any time.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(split_text("doc1", "", 1000, 200).unwrap().is_empty());
        assert!(split_text("doc1", "  \n\n\t ", 1000, 200).unwrap().is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("doc1", "Hello, world!", 1000, 200).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].id, "doc1:0-13");
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        for (size, overlap) in [(200, 200), (100, 200), (0, 0)] {
            let err = split_text("doc1", "some text", size, overlap).unwrap_err();
            assert!(matches!(err, RagError::Configuration(_)));
        }
    }

    #[test]
    fn test_reconstructs_original_text() {
        let text = sample_text();
        for (size, overlap) in [(1000, 200), (120, 30), (50, 10), (17, 16), (10, 0)] {
            let chunks = split_text("doc1", &text, size, overlap).unwrap();
            assert!(chunks.len() > 1);
            assert_eq!(reconstruct(&chunks), text, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn test_neighbors_overlap_by_configured_amount() {
        let text = sample_text();
        let chunks = split_text("doc1", &text, 300, 60).unwrap();
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 60);
            assert!(pair[1].text.starts_with(&pair[0].text[pair[0].text.len() - 60..]));
        }
    }

    #[test]
    fn test_chunks_respect_size_and_are_non_empty() {
        let text = sample_text();
        let chunks = split_text("doc1", &text, 120, 30).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(!c.text.is_empty());
            assert!(c.text.len() <= 120);
            assert_eq!(c.text, text[c.start..c.end]);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "Alpha beta gamma delta.\n\nEpsilon zeta eta theta iota kappa.";
        let chunks = split_text("doc1", text, 40, 5).unwrap();
        assert_eq!(chunks[0].text, "Alpha beta gamma delta.\n\n");
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_does_not_cut_words_when_spaces_exist() {
        let text = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor";
        let chunks = split_text("doc1", text, 20, 5).unwrap();
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with(' '), "chunk {:?} ends mid-word", c.text);
        }
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(25);
        let chunks = split_text("doc1", &text, 10, 2).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 10);
        assert_eq!((chunks[1].start, chunks[1].end), (8, 18));
        assert_eq!((chunks[2].start, chunks[2].end), (16, 25));
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = split_text("doc1", text, 3, 1).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_straddling_char_at_end_of_text() {
        let spans = |text: &str, size, overlap| {
            split_text("d", text, size, overlap)
                .unwrap()
                .iter()
                .map(|c| (c.start, c.end))
                .collect::<Vec<_>>()
        };
        assert_eq!(spans("a日", 2, 0), vec![(0, 1), (1, 4)]);
        assert_eq!(spans("a日本日本", 4, 3), vec![(0, 4), (1, 7), (4, 10), (7, 13)]);
    }

    /// Mixed ASCII/multibyte inputs over small sizes: every chunk is
    /// non-empty, ends strictly after its predecessor, leaves no gap, and
    /// the pieces reconstruct the input.
    #[test]
    fn test_multibyte_mixed_inputs() {
        let alphabet = ['a', 'b', ' ', '\n', '.', 'é', '日', '🎓'];
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..500 {
            let len = (next() % 24) as usize + 1;
            let text: String = (0..len)
                .map(|_| alphabet[(next() % alphabet.len() as u64) as usize])
                .collect();
            for chunk_size in 1..=8 {
                for overlap in 0..chunk_size {
                    let chunks = split_text("d", &text, chunk_size, overlap).unwrap();
                    if text.trim().is_empty() {
                        assert!(chunks.is_empty());
                        continue;
                    }
                    let mut prev_end = 0;
                    for (i, c) in chunks.iter().enumerate() {
                        assert!(!c.text.is_empty(), "{:?} {} {}", text, chunk_size, overlap);
                        assert!(c.end > prev_end, "{:?} {} {}", text, chunk_size, overlap);
                        assert_eq!(c.chunk_index, i as i64);
                        prev_end = c.end;
                    }
                    assert_eq!(prev_end, text.len());
                    assert_eq!(reconstruct(&chunks), text);
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = sample_text();
        let c1 = split_text("doc1", &text, 100, 20).unwrap();
        let c2 = split_text("doc1", &text, 100, 20).unwrap();
        assert_eq!(c1, c2);
    }
}

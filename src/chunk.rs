//! Boundary-aware text chunker with overlap.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters.
//! Splitting prefers paragraph breaks, then line breaks, then sentence ends,
//! then spaces; a run of text with none of these is cut between characters.
//! Consecutive chunks share up to `chunk_overlap` characters so context
//! survives chunk boundaries.
//!
//! Every chunk is a contiguous slice of the input and records its byte
//! offset, so the original text can be rebuilt from the chunk sequence.

use std::collections::VecDeque;

use crate::models::Chunk;

/// Split points, coarsest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

/// An atomic unit of text no longer than the chunk size.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Split `text` into overlapping chunks with contiguous positions starting at 0.
///
/// Empty input produces no chunks. Chunks consisting only of whitespace are
/// dropped. An overlap of `chunk_size` or more is clamped below the size.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_overlap.min(chunk_size - 1);

    let mut pieces = Vec::new();
    split_pieces(text, 0, SEPARATORS, chunk_size, &mut pieces);

    merge_pieces(&pieces, chunk_size, overlap)
        .into_iter()
        .filter(|&(start, end)| !text[start..end].trim().is_empty())
        .enumerate()
        .map(|(position, (start, end))| Chunk {
            document_id: document_id.to_string(),
            position,
            content: text[start..end].to_string(),
            start,
        })
        .collect()
}

/// Recursively break `text` (located at `offset` in the document) into
/// pieces of at most `chunk_size` characters. Separators stay attached to
/// the end of the piece they terminate.
fn split_pieces(
    text: &str,
    offset: usize,
    separators: &[&str],
    chunk_size: usize,
    out: &mut Vec<Piece>,
) {
    let chars = text.chars().count();
    if chars <= chunk_size {
        if chars > 0 {
            out.push(Piece {
                start: offset,
                end: offset + text.len(),
                chars,
            });
        }
        return;
    }

    let Some(idx) = separators.iter().position(|sep| text.contains(sep)) else {
        for (i, ch) in text.char_indices() {
            out.push(Piece {
                start: offset + i,
                end: offset + i + ch.len_utf8(),
                chars: 1,
            });
        }
        return;
    };

    let sep = separators[idx];
    let finer = &separators[idx + 1..];
    let mut start = 0;
    for (at, _) in text.match_indices(sep) {
        let end = at + sep.len();
        split_pieces(&text[start..end], offset + start, finer, chunk_size, out);
        start = end;
    }
    if start < text.len() {
        split_pieces(&text[start..], offset + start, finer, chunk_size, out);
    }
}

/// Greedily pack consecutive pieces into windows, carrying the tail of each
/// emitted window forward as overlap. Returns byte spans.
fn merge_pieces(pieces: &[Piece], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut window: VecDeque<Piece> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        if total + piece.chars > chunk_size && !window.is_empty() {
            spans.push(span_of(&window));
            while let Some(front) = window.front() {
                if total > overlap || total + piece.chars > chunk_size {
                    total -= front.chars;
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
        total += piece.chars;
        window.push_back(piece);
    }

    if !window.is_empty() {
        spans.push(span_of(&window));
    }
    spans
}

fn span_of(window: &VecDeque<Piece>) -> (usize, usize) {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut covered = 0usize;
        for c in chunks {
            let end = c.start + c.content.len();
            assert!(c.start <= covered, "gap before chunk {}", c.position);
            if end > covered {
                out.push_str(&c.content[covered - c.start..]);
                covered = end;
            }
        }
        out
    }

    fn sample_text() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Paragraph {} talks about maintenance. Check the oil level often. \
                     Rotate the tyres every season and note the mileage.",
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("doc1", "", 1000, 200).is_empty());
    }

    #[test]
    fn whitespace_only_text_has_no_chunks() {
        assert!(chunk_text("doc1", "   \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].document_id, "doc1");
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = sample_text();
        let chunks = chunk_text("doc1", &text, 300, 60);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.chars().count() <= 300, "chunk {} too long", c.position);
        }
    }

    #[test]
    fn positions_are_contiguous() {
        let text = sample_text();
        let chunks = chunk_text("doc1", &text, 200, 40);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i);
        }
    }

    #[test]
    fn chunks_rebuild_original_text() {
        let text = sample_text();
        let chunks = chunk_text("doc1", &text, 250, 50);
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn consecutive_chunks_overlap_within_limit() {
        let text = (0..300)
            .map(|i| format!("token{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text("doc1", &text, 250, 50);
        let mut saw_overlap = false;
        for pair in chunks.windows(2) {
            let prev_end = pair[0].start + pair[0].content.len();
            assert!(pair[1].start <= prev_end);
            let shared = text[pair[1].start..prev_end].chars().count();
            assert!(shared <= 50, "overlap of {} chars", shared);
            saw_overlap |= shared > 0;
        }
        assert!(saw_overlap);
    }

    #[test]
    fn paragraphs_are_kept_whole_when_they_fit() {
        let a = "a".repeat(600);
        let b = "b".repeat(600);
        let text = format!("{}\n\n{}", a, b);
        let chunks = chunk_text("doc1", &text, 1000, 200);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, format!("{}\n\n", a));
        assert_eq!(chunks[1].content, b);
    }

    #[test]
    fn long_paragraph_splits_on_word_boundaries() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text("doc1", &text, 50, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.start == 0 || text.as_bytes()[c.start - 1] == b' ');
            let end = c.start + c.content.len();
            assert!(end == text.len() || c.content.ends_with(' '));
        }
    }

    #[test]
    fn unbroken_text_is_hard_cut() {
        let text = "x".repeat(2500);
        let chunks = chunk_text("doc1", &text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.content.len() <= 1000));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let text = "日本語のテキスト".repeat(100);
        let chunks = chunk_text("doc1", &text, 64, 16);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 64));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn overlap_not_smaller_than_size_still_progresses() {
        let text = "abc def ghi jkl mno pqr stu vwx";
        let chunks = chunk_text("doc1", text, 8, 8);
        assert!(chunks.len() > 1);
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn deterministic() {
        let text = sample_text();
        let c1 = chunk_text("doc1", &text, 120, 30);
        let c2 = chunk_text("doc1", &text, 120, 30);
        assert_eq!(c1, c2);
    }
}

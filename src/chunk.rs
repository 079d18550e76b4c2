//! Recursive separator-priority text chunker.
//!
//! Splits raw text into bounded, trimmed, non-empty segments. Separators are
//! tried coarsest-first (paragraph break, line break, sentence terminators
//! for CJK and Latin scripts, clause punctuation, plain space); parts split
//! on the chosen separator are greedily packed back together up to
//! `chunk_size`, and any part that is still oversized recurses with the
//! remaining, finer separators. When no separator occurs at all, the text is
//! hard-cut into fixed windows advanced by `max(chunk_size − overlap, 1)`.
//!
//! All lengths are counted in chars, never bytes, so the hard-cut path is
//! safe on multi-byte text.
//!
//! # Guarantees
//!
//! - Every returned chunk is trimmed, non-empty, and at most `chunk_size`
//!   chars long (the hard-cut fallback included).
//! - Empty input yields an empty sequence; input that already fits yields a
//!   single trimmed chunk.
//! - The function never panics and always terminates (hard-cut step ≥ 1).

/// Separator priority list, coarsest to finest.
pub const SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "！", "？", "；", ". ", "! ", "? ", "; ", "，", ", ", " ",
];

/// Clamp caller-supplied chunking parameters into their valid ranges:
/// `chunk_size ≥ 50`, `0 ≤ overlap < chunk_size`. Returns the effective pair.
pub fn clamp_params(chunk_size: usize, overlap: usize) -> (usize, usize) {
    let size = chunk_size.max(50);
    let overlap = overlap.min(size - 1);
    (size, overlap)
}

/// Split `text` into ordered chunk strings of at most `chunk_size` chars.
///
/// `overlap` only affects the hard-cut fallback, where consecutive windows
/// share `overlap` chars. Parameters are clamped via [`clamp_params`].
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let (size, overlap) = clamp_params(chunk_size, overlap);
    split_recursive(text, size, overlap, SEPARATORS)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let t = s.trim();
    if !t.is_empty() {
        out.push(t.to_string());
    }
}

/// Pure recursion: each level owns its output, nothing is accumulated
/// through shared state across calls.
fn split_recursive(text: &str, size: usize, overlap: usize, seps: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    if char_len(text) <= size {
        push_trimmed(&mut out, text);
        return out;
    }

    // First separator from the current level that occurs anywhere in the text.
    let Some(pos) = seps.iter().position(|s| text.contains(s)) else {
        return hard_cut(text, size, overlap);
    };
    let sep = seps[pos];
    let sep_len = char_len(sep);
    let finer = &seps[pos + 1..];

    let mut buf = String::new();
    let mut buf_len = 0usize;
    for part in text.split(sep) {
        let part_len = char_len(part);
        let candidate_len = if buf.is_empty() {
            part_len
        } else {
            buf_len + sep_len + part_len
        };
        if candidate_len <= size {
            if !buf.is_empty() {
                buf.push_str(sep);
            }
            buf.push_str(part);
            buf_len = candidate_len;
        } else {
            push_trimmed(&mut out, &buf);
            if part_len <= size {
                buf = part.to_string();
                buf_len = part_len;
            } else {
                out.extend(split_recursive(part, size, overlap, finer));
                buf.clear();
                buf_len = 0;
            }
        }
    }
    push_trimmed(&mut out, &buf);
    out
}

/// Fixed-window fallback for separator-free text. Window starts advance by
/// `max(size − overlap, 1)` chars until the text is exhausted.
fn hard_cut(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let step = size.saturating_sub(overlap).max(1);

    // Byte offset of every char boundary, plus the end of the text.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let total_chars = boundaries.len() - 1;

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + size).min(total_chars);
        push_trimmed(&mut out, &text[boundaries[start]..boundaries[end]]);
        start += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(chunk_text("", 400, 50).is_empty());
        assert!(chunk_text("   \n\n  ", 400, 50).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("hello world", 400, 0);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_short_text_is_trimmed() {
        let chunks = chunk_text("  hello world \n", 400, 0);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_paragraphs_packed_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 400, 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("First paragraph."));
        assert!(chunks[0].contains("Third paragraph."));
    }

    #[test]
    fn test_paragraph_boundaries_respected() {
        let para = "word ".repeat(15); // 75 chars each
        let text = format!("{}\n\n{}\n\n{}", para.trim(), para.trim(), para.trim());
        let chunks = chunk_text(&text, 80, 0);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 80);
            assert!(c.starts_with("word"));
        }
    }

    #[test]
    fn test_hard_cut_window_advance() {
        let text = "a".repeat(1000);
        let chunks = chunk_text(&text, 400, 50);
        // Windows start at 0, 350, 700: lengths 400, 400, 300.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[1].len(), 400);
        assert_eq!(chunks[2].len(), 300);
    }

    #[test]
    fn test_hard_cut_zero_overlap() {
        let text = "b".repeat(250);
        let chunks = chunk_text(&text, 100, 0);
        assert_eq!(
            chunks.iter().map(String::len).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
    }

    #[test]
    fn test_size_clamped_to_minimum() {
        // chunk_size below 50 is raised to 50.
        let text = "c".repeat(120);
        let chunks = chunk_text(&text, 10, 0);
        assert!(chunks.iter().all(|c| c.len() <= 50));
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_cjk_sentence_split_respects_limit() {
        let text = "这是第一句。这是第二句。这是第三句。".repeat(20);
        let chunks = chunk_text(&text, 100, 0);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100, "oversized: {}", c.chars().count());
        }
    }

    #[test]
    fn test_latin_sentence_split_respects_limit() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        let chunks = chunk_text(&text, 120, 0);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 120);
            assert!(!c.is_empty());
        }
    }

    #[test]
    fn test_recurses_to_finer_separators() {
        // One giant line with no sentence enders: falls through paragraph
        // and line levels down to comma and space splitting.
        let text = format!("{}, {}, {}", "x".repeat(70), "y".repeat(70), "z".repeat(70));
        let chunks = chunk_text(&text, 80, 0);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.chars().count() <= 80);
        }
    }

    #[test]
    fn test_mixed_document_all_within_limit() {
        let text = "# Heading\n\nA paragraph with several sentences. Another one here! \
                    And a question? Yes.\n\nSecond paragraph, with clauses, and more, \
                    这里有中文。还有更多中文内容！\n\n"
            .repeat(10);
        for size in [50, 100, 200, 400] {
            let chunks = chunk_text(&text, size, 20);
            assert!(!chunks.is_empty());
            for c in &chunks {
                assert!(
                    c.chars().count() <= size,
                    "size {}: got {} chars",
                    size,
                    c.chars().count()
                );
                assert_eq!(c, c.trim());
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. Delta epsilon zeta. ".repeat(25);
        assert_eq!(chunk_text(&text, 100, 10), chunk_text(&text, 100, 10));
    }

    #[test]
    fn test_clamp_params() {
        assert_eq!(clamp_params(10, 5), (50, 5));
        assert_eq!(clamp_params(100, 100), (100, 99));
        assert_eq!(clamp_params(300, 50), (300, 50));
    }
}

//! Recursive character splitter for oversized documents.
//!
//! Splits text on progressively finer separators (paragraph, line,
//! sentence, word) so chunks break at the most semantic boundary
//! available, with a character-level hard split as the last resort.
//! Consecutive chunks carry a configurable overlap so no context is lost
//! at split boundaries.

/// Separator ladder, coarsest first. Text that none of these break up
/// small enough falls through to `hard_split`.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into pieces of at most `max_size` bytes with `overlap`
/// bytes of carried context between consecutive pieces.
///
/// Guarantees: every piece is non-empty and at most `max_size` bytes;
/// stripping each piece's leading overlap and concatenating reconstructs
/// the original text; splits never land inside a UTF-8 code point.
pub fn split_text(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    // Atoms are sized so a chunk seeded with `overlap` bytes of carried
    // context plus one atom never exceeds `max_size`.
    let atom_max = max_size.saturating_sub(overlap).max(1);
    let atoms = atomize(text, atom_max, 0);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut seed_len = 0usize;

    for atom in atoms {
        if !current.is_empty() && current.len() + atom.len() > max_size {
            let tail = overlap_tail(&current, overlap);
            // Discard flush-only seeds: a chunk that is nothing but carried
            // context adds no coverage.
            if current.len() > seed_len {
                chunks.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            seed_len = tail.len();
            current.push_str(&tail);
        }
        current.push_str(&atom);
    }

    if current.len() > seed_len {
        chunks.push(current);
    }

    chunks
}

/// Recursively break text into atoms no larger than `max`, preferring the
/// coarsest separator that occurs. Separators stay attached to the
/// preceding piece so concatenation is lossless.
fn atomize(text: &str, max: usize, level: usize) -> Vec<String> {
    if text.len() <= max {
        return vec![text.to_string()];
    }

    if level >= SEPARATORS.len() {
        return hard_split(text, max);
    }

    let sep = SEPARATORS[level];
    if !text.contains(sep) {
        return atomize(text, max, level + 1);
    }

    let mut out = Vec::new();
    for piece in text.split_inclusive(sep) {
        if piece.len() <= max {
            out.push(piece.to_string());
        } else {
            out.extend(atomize(piece, max, level + 1));
        }
    }
    out
}

/// Last-resort split at char boundaries.
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > max && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// The trailing `overlap` bytes of `text`, aligned down to a char boundary.
fn overlap_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 || text.len() <= overlap {
        return if overlap == 0 {
            String::new()
        } else {
            text.to_string()
        };
    }
    let mut start = text.len() - overlap;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_stays_whole() {
        let chunks = split_text("hello world", 100, 20);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(split_text("", 100, 20).is_empty());
    }

    #[test]
    fn chunks_respect_max_size() {
        let text = "word ".repeat(1000); // 5000 chars
        let chunks = split_text(&text, 1000, 200);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 1000, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = "word ".repeat(1000);
        let chunks = split_text(&text, 1000, 200);
        for pair in chunks.windows(2) {
            let tail = overlap_tail(&pair[0], 200);
            assert!(
                pair[1].starts_with(&tail),
                "next chunk does not start with previous tail"
            );
        }
    }

    #[test]
    fn overlap_stripped_concat_reconstructs() {
        let text = "The quick brown fox. ".repeat(300);
        let overlap = 150;
        let chunks = split_text(&text, 800, overlap);
        let mut rebuilt = chunks[0].clone();
        for pair in chunks.windows(2) {
            let tail = overlap_tail(&pair[0], overlap);
            rebuilt.push_str(&pair[1][tail.len()..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let paragraphs: Vec<String> = (0..20)
            .map(|i| format!("Paragraph {} with a bit of body text.", i))
            .collect();
        let text = paragraphs.join("\n\n");
        let chunks = split_text(&text, 120, 0);
        // With zero overlap each chunk should end at a paragraph break
        // except the final one.
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.ends_with("\n\n"), "chunk ends mid-paragraph: {:?}", c);
        }
    }

    #[test]
    fn hard_split_handles_multibyte() {
        let text = "é".repeat(500); // 2 bytes each
        let chunks = split_text(&text, 101, 0);
        for c in &chunks {
            assert!(c.len() <= 101);
            assert!(!c.is_empty());
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn long_line_without_separators_still_splits() {
        let text = "x".repeat(3000);
        let chunks = split_text(&text, 1000, 100);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.len() <= 1000);
        }
    }
}

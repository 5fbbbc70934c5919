//! Overlapping character chunks for long-transcript summarization.

/// Split `text` into chunks of at most `chunk_size` characters with
/// `overlap` characters carried over between consecutive chunks.
///
/// Operates on character counts, never byte offsets, so multi-byte text is
/// split safely. Returns the whole text as a single chunk when it fits.
pub fn split_with_overlap(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunk_size == 0 {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(chunk_size.saturating_sub(1));
    let step = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_with_overlap("hello", 100, 10);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text: String = ('a'..='z').collect();
        let chunks = split_with_overlap(&text, 10, 2);

        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        // Consecutive chunks share the overlap region.
        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0].chars().rev().take(2).collect();
            let next_head: String = pair[1].chars().take(2).collect();
            let prev_tail: String = prev_tail.chars().rev().collect();
            assert_eq!(prev_tail, next_head);
        }
        // Nothing is lost: stitching with overlap removed restores the text.
        let mut rebuilt = chunks[0].clone();
        for c in &chunks[1..] {
            rebuilt.extend(c.chars().skip(2));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "日本語のテキストを分割する".repeat(10);
        let chunks = split_with_overlap(&text, 16, 4);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 16));
    }

    #[test]
    fn overlap_larger_than_chunk_still_advances() {
        let text = "abcdefghij";
        let chunks = split_with_overlap(text, 4, 10);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }
}

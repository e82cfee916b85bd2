/// Separator priority for the primary recursive splitter.
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    /// Character offset into the input text, not a byte offset.
    pub start_pos: usize,
    pub end_pos: usize,
}

/// Splits text into overlapping chunks with semantic-boundary
/// preference. `chunk()` is the primary recursive-separator algorithm;
/// `chunk_fallback()` is the linear-window algorithm used when the
/// primary is unavailable.
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunk_overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
        Self { chunk_size, chunk_overlap }
    }

    /// Recursive split on `["\n\n", "\n", " ", ""]`: never splits
    /// across a higher-priority separator when a lower-priority one
    /// would do, falling back to a hard character split only once all
    /// separators are exhausted.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let leaves = Self::split_recursive(&chars, SEPARATORS, self.chunk_size);
        self.merge_leaves(&leaves)
    }

    /// Linear window with soft-boundary retreat: when a window would
    /// end mid-text, retreat to the most recent `"\n\n"` in the
    /// window's second half, then the most recent `". "` in its last
    /// two-thirds, then give up and cut at `chunk_size`.
    pub fn chunk_fallback(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < total {
            let mut end = (start + self.chunk_size).min(total);
            if end < total {
                end = Self::retreat_to_boundary(&chars, start, end);
            }
            if end <= start {
                end = (start + 1).min(total);
            }
            let content: String = chars[start..end].iter().collect();
            chunks.push(Chunk { content, start_pos: start, end_pos: end });
            if end >= total {
                break;
            }
            start += step;
        }
        chunks
    }

    fn retreat_to_boundary(chars: &[char], start: usize, end: usize) -> usize {
        let window = &chars[start..end];
        let half = window.len() / 2;
        if let Some(pos) = rfind_subsequence(&window[half..], &['\n', '\n']) {
            return start + half + pos + 2;
        }
        let two_thirds = (window.len() * 2 / 3).min(window.len());
        if let Some(pos) = rfind_subsequence(&window[two_thirds..], &['.', ' ']) {
            return start + two_thirds + pos + 2;
        }
        end
    }

    fn split_recursive(chars: &[char], separators: &[&str], chunk_size: usize) -> Vec<(usize, Vec<char>)> {
        if chars.len() <= chunk_size {
            return vec![(0, chars.to_vec())];
        }
        let Some((sep, rest)) = separators.split_first() else {
            return Self::hard_split(chars, chunk_size);
        };
        let sep_chars: Vec<char> = sep.chars().collect();
        if sep_chars.is_empty() {
            return Self::hard_split(chars, chunk_size);
        }

        let parts = split_keep_separator(chars, &sep_chars);
        let mut pieces = Vec::new();
        let mut cursor = 0usize;
        for part in parts {
            let part_len = part.len();
            if part_len > chunk_size {
                for (offset, sub) in Self::split_recursive(&part, rest, chunk_size) {
                    pieces.push((cursor + offset, sub));
                }
            } else {
                pieces.push((cursor, part));
            }
            cursor += part_len;
        }
        pieces
    }

    fn hard_split(chars: &[char], chunk_size: usize) -> Vec<(usize, Vec<char>)> {
        chars
            .chunks(chunk_size.max(1))
            .enumerate()
            .map(|(i, c)| (i * chunk_size, c.to_vec()))
            .collect()
    }

    fn merge_leaves(&self, leaves: &[(usize, Vec<char>)]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut buffer: Vec<&(usize, Vec<char>)> = Vec::new();
        let mut current_len = 0usize;

        for leaf in leaves {
            let leaf_len = leaf.1.len();
            if current_len > 0 && current_len + leaf_len > self.chunk_size {
                if let Some(chunk) = Self::flush_buffer(&buffer) {
                    chunks.push(chunk);
                }

                let mut carried: Vec<&(usize, Vec<char>)> = Vec::new();
                let mut carried_len = 0usize;
                for item in buffer.iter().rev() {
                    let l = item.1.len();
                    if carried_len + l > self.chunk_overlap {
                        break;
                    }
                    carried_len += l;
                    carried.push(item);
                }
                carried.reverse();
                buffer = carried;
                current_len = carried_len;
            }
            buffer.push(leaf);
            current_len += leaf_len;
        }

        if let Some(chunk) = Self::flush_buffer(&buffer) {
            chunks.push(chunk);
        }
        chunks
    }

    fn flush_buffer(buffer: &[&(usize, Vec<char>)]) -> Option<Chunk> {
        let first = buffer.first()?;
        let start = first.0;
        let content: String = buffer.iter().flat_map(|(_, c)| c.iter()).collect();
        let end = start + content.chars().count();
        Some(Chunk { content, start_pos: start, end_pos: end })
    }
}

fn split_keep_separator(chars: &[char], sep: &[char]) -> Vec<Vec<char>> {
    let mut parts = Vec::new();
    let mut rest = chars;
    loop {
        match find_subsequence(rest, sep) {
            Some(idx) => {
                let end = idx + sep.len();
                parts.push(rest[..end].to_vec());
                rest = &rest[end..];
            }
            None => {
                if !rest.is_empty() {
                    parts.push(rest.to_vec());
                }
                break;
            }
        }
    }
    parts
}

fn find_subsequence(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind_subsequence(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers_and_orders(chunks: &[Chunk], original_len: usize, overlap: usize) {
        assert!(!chunks.is_empty());
        for c in chunks {
            assert!(!c.content.is_empty());
        }
        assert_eq!(chunks.last().unwrap().end_pos, original_len);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_pos <= pair[0].end_pos);
            let gap_or_overlap = pair[0].end_pos as i64 - pair[1].start_pos as i64;
            assert!(gap_or_overlap <= overlap as i64);
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = Chunker::new(100, 20);
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(100, 20);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk_fallback("").is_empty());
    }

    #[test]
    fn recursive_split_covers_and_overlaps_within_bound() {
        let chunker = Chunker::new(40, 10);
        let text = "Paragraph one is here.\n\nParagraph two follows with more words.\n\nParagraph three wraps things up nicely at the end.";
        let chunks = chunker.chunk(text);
        assert_covers_and_orders(&chunks, text.chars().count(), 10);
    }

    #[test]
    fn recursive_split_prefers_paragraph_boundaries() {
        let chunker = Chunker::new(30, 5);
        let text = "short one\n\nshort two\n\nshort three";
        let chunks = chunker.chunk(text);
        assert!(chunks.iter().any(|c| c.content.contains("short one")));
        assert_covers_and_orders(&chunks, text.chars().count(), 5);
    }

    #[test]
    fn fallback_covers_and_overlaps_within_bound() {
        let chunker = Chunker::new(50, 10);
        let text = "a".repeat(40) + ". " + &"b".repeat(40) + ". " + &"c".repeat(40);
        let chunks = chunker.chunk_fallback(&text);
        assert_covers_and_orders(&chunks, text.chars().count(), 10);
    }

    #[test]
    fn fallback_retreats_to_paragraph_break() {
        let chunker = Chunker::new(20, 5);
        let mut text = "x".repeat(12);
        text.push_str("\n\n");
        text.push_str(&"y".repeat(12));
        let chunks = chunker.chunk_fallback(&text);
        assert!(chunks[0].content.ends_with("\n\n") || chunks[0].content.len() <= 20);
    }

    #[test]
    fn no_chunk_exceeds_configured_size_by_much() {
        let chunker = Chunker::new(25, 5);
        let text = "word ".repeat(100);
        let chunks = chunker.chunk(&text);
        for c in &chunks {
            assert!(c.content.chars().count() <= 25 + 1);
        }
    }
}

//! Recursive character text splitter and stable chunk identifiers.
//!
//! Page text is split on the coarsest separator present (`"\n\n"`, then
//! `"\n"`, then `" "`, then individual characters). Pieces are merged back
//! into windows of at most `chunk_size` characters, and up to
//! `chunk_overlap` characters of trailing pieces are carried into the next
//! window. Separators stay attached to the start of the piece that follows
//! them, so joining pieces never inserts text that was not in the page.
//!
//! All lengths are `char` counts.
//!
//! Chunk ids have the form `source:page:index`; see [`calculate_chunk_ids`].

use std::collections::VecDeque;

use crate::models::{Chunk, PageDocument};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split every page into chunks and assign their ids.
pub fn split_documents(
    pages: &[PageDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for text in split_text(&page.text, chunk_size, chunk_overlap) {
            chunks.push(Chunk {
                id: String::new(),
                source: page.source.clone(),
                page: page.page,
                text,
            });
        }
    }
    calculate_chunk_ids(&mut chunks);
    chunks
}

/// Split text into overlapping windows of at most `chunk_size` characters.
///
/// Whitespace-only windows are dropped, so empty text yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let splitter = Splitter {
        chunk_size: chunk_size.max(1),
        chunk_overlap,
    };
    splitter.split(text, &SEPARATORS)
}

/// Assign `source:page:index` ids in traversal order.
///
/// The index counts up while consecutive chunks share the same
/// `source:page` pair and restarts at 0 whenever the pair changes.
pub fn calculate_chunk_ids(chunks: &mut [Chunk]) {
    let mut last_page_id: Option<String> = None;
    let mut index = 0usize;

    for chunk in chunks.iter_mut() {
        let page_id = format!("{}:{}", chunk.source, chunk.page);

        if last_page_id.as_deref() == Some(page_id.as_str()) {
            index += 1;
        } else {
            index = 0;
        }

        chunk.id = format!("{}:{}", page_id, index);
        last_page_id = Some(page_id);
    }
}

struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator that occurs in the text; "" always matches.
        let (position, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len(), ""));
        let finer: &[&str] = if separator.is_empty() {
            &[]
        } else {
            &separators[position + 1..]
        };

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                out.extend(self.merge(&fitting));
                fitting.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            } else {
                out.extend(self.split(piece, finer));
            }
        }

        if !fitting.is_empty() {
            out.extend(self.merge(&fitting));
        }

        out
    }

    /// Greedily pack pieces into windows, keeping an overlap tail.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                push_window(&mut windows, &current);

                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        push_window(&mut windows, &current);
        windows
    }
}

fn push_window(windows: &mut Vec<String>, current: &VecDeque<(&str, usize)>) {
    let joined: String = current.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        windows.push(trimmed.to_string());
    }
}

/// Split on `separator`, keeping each separator at the start of the next piece.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx != last {
            pieces.push(&text[last..idx]);
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(&text[last..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn page(source: &str, page: u32, text: &str) -> PageDocument {
        PageDocument {
            source: source.to_string(),
            page,
            text: text.to_string(),
        }
    }

    fn chunk(source: &str, page: u32) -> Chunk {
        Chunk {
            id: String::new(),
            source: source.to_string(),
            page,
            text: "x".to_string(),
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("Hello, world!", 600, 120);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        assert!(split_text("", 600, 120).is_empty());
        assert!(split_text("  \n\n \n", 600, 120).is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunks = split_text("para one.\n\npara two.", 12, 0);
        assert_eq!(chunks, vec!["para one.", "para two."]);
    }

    #[test]
    fn test_windows_respect_chunk_size() {
        let text = (0..300)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50, "chunk too long: {:?}", c);
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text = (0..300)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 50, 10);
        for pair in chunks.windows(2) {
            let first_next = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].split_whitespace().any(|w| w == first_next),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_overlap_when_zero() {
        let text = (0..100)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 40, 0);
        let words: usize = chunks.iter().map(|c| c.split_whitespace().count()).sum();
        assert_eq!(words, 100);
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let text = "a".repeat(25);
        let chunks = split_text(&text, 10, 0);
        assert_eq!(chunks, vec!["a".repeat(10), "a".repeat(10), "a".repeat(5)]);
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "é".repeat(30);
        let chunks = split_text(&text, 10, 0);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn test_ids_increment_within_page_and_reset_on_change() {
        let mut chunks = vec![
            chunk("data/a.pdf", 0),
            chunk("data/a.pdf", 0),
            chunk("data/a.pdf", 0),
            chunk("data/a.pdf", 1),
            chunk("data/b.pdf", 1),
            chunk("data/b.pdf", 1),
        ];
        calculate_chunk_ids(&mut chunks);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "data/a.pdf:0:0",
                "data/a.pdf:0:1",
                "data/a.pdf:0:2",
                "data/a.pdf:1:0",
                "data/b.pdf:1:0",
                "data/b.pdf:1:1",
            ]
        );
    }

    #[test]
    fn test_split_documents_ids_unique() {
        let long = (0..400)
            .map(|i| format!("token{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let pages = vec![
            page("a.pdf", 0, &long),
            page("a.pdf", 1, &long),
            page("b.pdf", 0, "short page"),
        ];
        let chunks = split_documents(&pages, 100, 20);
        let ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), chunks.len());
        assert!(ids.contains("a.pdf:0:0"));
        assert!(ids.contains("a.pdf:1:0"));
        assert!(ids.contains("b.pdf:0:0"));
    }

    #[test]
    fn test_deterministic() {
        let pages = vec![page("a.pdf", 0, "Alpha\n\nBeta\n\nGamma\n\nDelta")];
        let c1 = split_documents(&pages, 8, 2);
        let c2 = split_documents(&pages, 8, 2);
        assert_eq!(c1, c2);
    }
}

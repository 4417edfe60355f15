use std::collections::VecDeque;

use anyhow::Result;

const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
}

/// Splits on the coarsest separator that occurs, recursing into pieces that
/// are still too long, then merges neighbours back into overlapping chunks.
/// Sizes are counted in chars.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk size must be positive");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.to_vec(),
        })
    }

    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        self.split_recursive(text, &self.separators)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| TextChunk { text, chunk_index })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len());
        let separator = separators.get(position).copied().unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joint = |current: &VecDeque<&str>| if current.is_empty() { 0 } else { separator_len };

            if total + len + joint(&current) > self.chunk_size && !current.is_empty() {
                push_chunk(&current, separator, &mut chunks);

                // keep a tail of at most `chunk_overlap` chars for the next chunk
                while total > self.chunk_overlap
                    || (total > 0 && total + len + joint(&current) > self.chunk_size)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + joint(&current);
                }
            }

            total += len + joint(&current);
            current.push_back(piece);
        }
        push_chunk(&current, separator, &mut chunks);

        chunks
    }
}

fn push_chunk(current: &VecDeque<&str>, separator: &str, chunks: &mut Vec<String>) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        let chunks = splitter.split("  short  ");
        assert_eq!(
            chunks,
            vec![TextChunk {
                text: "short".to_string(),
                chunk_index: 0
            }]
        );
    }

    #[test]
    fn test_empty_text() {
        let splitter = TextSplitter::new(100, 10).unwrap();
        assert!(splitter.split("   \n\n ").is_empty());
    }

    #[test]
    fn test_words_overlap() {
        let splitter = TextSplitter::new(5, 2).unwrap();
        let texts: Vec<String> = splitter
            .split("a b c d e f g h i j")
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["a b c", "c d e", "e f g", "g h i", "i j"]);
    }

    #[test]
    fn test_paragraphs_split_first() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird one.";
        let chunks = splitter.split(text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "First paragraph here.");
        assert_eq!(chunks[2].text, "Third one.");
        assert_eq!(chunks[2].chunk_index, 2);
    }

    #[test]
    fn test_multibyte_text_respects_size() {
        let splitter = TextSplitter::new(20, 5).unwrap();
        let text = "Привет! Я Лила 2.0 с памятью. Пиши что угодно, я всё запомню и отвечу.";
        let chunks = splitter.split(text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
            assert!(chunk.text.chars().count() <= 20, "too long: {}", chunk.text);
        }
    }

    #[test]
    fn test_unbreakable_text_falls_back_to_chars() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        let texts: Vec<String> = splitter.split("abcdefghij").into_iter().map(|c| c.text).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }
}

use crate::filter::escape_text;

/// A contiguous group of words from the narration text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    pub sanitized: String,
    pub word_count: usize,
}

impl TextChunk {
    fn new(index: usize, words: &[&str]) -> Self {
        let text = words.join(" ");
        let sanitized = escape_text(&text);
        Self {
            index,
            text,
            sanitized,
            word_count: words.len(),
        }
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.text.split(' ')
    }
}

/// Splits `text` on whitespace runs and groups the words `group_size` at a time.
/// The last chunk holds the remainder. A `group_size` of zero is treated as one.
pub fn segment(text: &str, group_size: usize) -> Vec<TextChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(group_size.max(1))
        .enumerate()
        .map(|(i, group)| TextChunk::new(i, group))
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

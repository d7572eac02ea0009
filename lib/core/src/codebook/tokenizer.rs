// Tokenization shared by text codebook generation and bag-of-words assignment
use serde::{Deserialize, Serialize};

use crate::config::TextCodebookConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokenizer {
    stop_chars: String,
    n_gram: usize,
    n_char_gram: usize,
}

impl Tokenizer {
    #[inline]
    #[must_use]
    pub fn new(stop_chars: impl Into<String>, n_gram: usize, n_char_gram: usize) -> Self {
        Self {
            stop_chars: stop_chars.into(),
            n_gram,
            n_char_gram,
        }
    }

    pub fn from_config(config: &TextCodebookConfig) -> Self {
        Self::new(config.stop_chars.clone(), config.n_gram, config.n_char_gram)
    }

    pub fn stop_chars(&self) -> &str {
        &self.stop_chars
    }

    pub fn n_gram(&self) -> usize {
        self.n_gram
    }

    pub fn n_char_gram(&self) -> usize {
        self.n_char_gram
    }

    /// Strip stop characters, split on spaces and uppercase.
    ///
    /// With `n_gram > 1` every word sequence of length 1..=n_gram is emitted
    /// (words joined by one space); with `n_char_gram > 0` the words are
    /// concatenated and cut into overlapping character grams instead.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .chars()
            .filter(|c| !self.stop_chars.contains(*c))
            .collect();
        let words: Vec<String> = cleaned
            .split(' ')
            .filter(|w| !w.is_empty())
            .map(str::to_uppercase)
            .collect();

        if self.n_gram > 1 && words.len() > 1 {
            word_grams(&words, self.n_gram)
        } else if self.n_char_gram > 0 && !words.is_empty() {
            char_grams(&words, self.n_char_gram)
        } else {
            words
        }
    }
}

fn word_grams(words: &[String], max_order: usize) -> Vec<String> {
    let mut grams = words.to_vec();
    for n in 2..=max_order.min(words.len()) {
        grams.extend(words.windows(n).map(|w| w.join(" ")));
    }
    grams
}

fn char_grams(words: &[String], n: usize) -> Vec<String> {
    let chars: Vec<char> = words.iter().flat_map(|w| w.chars()).collect();
    if chars.len() < n {
        return Vec::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_are_cleaned_and_uppercased() {
        let tok = Tokenizer::new(".,", 1, 0);
        assert_eq!(tok.tokenize("hello,  world."), vec!["HELLO", "WORLD"]);
    }

    #[test]
    fn test_word_ngrams_keep_lower_orders() {
        let tok = Tokenizer::new("", 2, 0);
        assert_eq!(
            tok.tokenize("a b c"),
            vec!["A", "B", "C", "A B", "B C"]
        );
    }

    #[test]
    fn test_char_ngrams_span_words() {
        let tok = Tokenizer::new("", 1, 3);
        assert_eq!(tok.tokenize("ab cd"), vec!["ABC", "BCD"]);
        assert!(tok.tokenize("ab").is_empty());
    }

    #[test]
    fn test_empty_text() {
        let tok = Tokenizer::new("", 3, 0);
        assert!(tok.tokenize("   ").is_empty());
    }
}

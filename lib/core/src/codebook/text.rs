use ahash::AHashMap;
use std::collections::BTreeMap;
use tracing::info;

use super::tokenizer::Tokenizer;
use crate::config::TextCodebookConfig;
use crate::frame::CodewordId;

/// Vocabulary of a text feature class.
///
/// Codewords are kept in lexicographic order, so the same corpus always
/// yields the same codeword indices.
#[derive(Debug, Clone)]
pub struct TextCodebook {
    tokenizer: Tokenizer,
    codewords: Vec<String>,
    lookup: AHashMap<String, CodewordId>,
}

impl TextCodebook {
    pub fn new(tokenizer: Tokenizer, codewords: Vec<String>) -> Self {
        let lookup = codewords
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), CodewordId(i)))
            .collect();
        Self {
            tokenizer,
            codewords,
            lookup,
        }
    }

    /// Keep every token whose corpus frequency lies in `[min, max]` (max 0 = unbounded)
    pub fn generate<'a>(
        documents: impl IntoIterator<Item = &'a str>,
        config: &TextCodebookConfig,
    ) -> Self {
        let tokenizer = Tokenizer::from_config(config);
        let mut freq: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            for token in tokenizer.tokenize(doc) {
                *freq.entry(token).or_insert(0) += 1;
            }
        }
        let total = freq.len();
        let codewords: Vec<String> = freq
            .into_iter()
            .filter(|(_, f)| {
                *f >= config.min_term_freq && (config.max_term_freq == 0 || *f <= config.max_term_freq)
            })
            .map(|(token, _)| token)
            .collect();
        info!(
            "Text codebook: kept {} of {} distinct tokens",
            codewords.len(),
            total
        );
        Self::new(tokenizer, codewords)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codewords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codewords.is_empty()
    }

    pub fn codewords(&self) -> &[String] {
        &self.codewords
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Codeword ids of every vocabulary token in `text`, with repetitions
    pub fn matches(&self, text: &str) -> Vec<CodewordId> {
        self.tokenizer
            .tokenize(text)
            .iter()
            .filter_map(|t| self.lookup.get(t).copied())
            .collect()
    }
}

impl PartialEq for TextCodebook {
    fn eq(&self, other: &Self) -> bool {
        self.tokenizer == other.tokenizer && self.codewords == other.codewords
    }
}

//! Codebook variants and their generation algorithms.

pub mod clustering;
pub mod generic;
pub mod gmm;
pub mod numeric;
pub mod reduce;
pub mod text;
pub mod tokenizer;

pub use gmm::GmmParams;
pub use numeric::NumericCodebook;
pub use text::TextCodebook;
pub use tokenizer::Tokenizer;

/// One codebook of a hyper codebook
#[derive(Debug, Clone, PartialEq)]
pub enum Codebook {
    Numeric(NumericCodebook),
    Text(TextCodebook),
}

impl Codebook {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Codebook::Numeric(_))
    }

    /// Only numeric codebooks can be re-encoded through n-grams
    pub fn supports_ngrams(&self) -> bool {
        self.is_numeric()
    }

    /// Posterior assignment needs stored mixture parameters
    pub fn supports_posterior(&self) -> bool {
        matches!(self, Codebook::Numeric(book) if book.gmm().is_some())
    }

    /// Number of codewords
    pub fn len(&self) -> usize {
        match self {
            Codebook::Numeric(book) => book.len(),
            Codebook::Text(book) => book.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of the sub-bag this codebook contributes
    pub fn histogram_width(&self) -> usize {
        match self {
            Codebook::Numeric(book) => book.histogram_width(),
            Codebook::Text(book) => book.len(),
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericCodebook> {
        match self {
            Codebook::Numeric(book) => Some(book),
            Codebook::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextCodebook> {
        match self {
            Codebook::Text(book) => Some(book),
            Codebook::Numeric(_) => None,
        }
    }
}

impl From<NumericCodebook> for Codebook {
    fn from(book: NumericCodebook) -> Self {
        Codebook::Numeric(book)
    }
}

impl From<TextCodebook> for Codebook {
    fn from(book: TextCodebook) -> Self {
        Codebook::Text(book)
    }
}

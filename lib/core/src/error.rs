use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Insufficient training data: requested {requested} codewords, only {available} usable vectors")]
    InsufficientData { requested: usize, available: usize },

    #[error("Insufficient training data for class {class}: requested {requested} codewords, only {available} usable vectors")]
    InsufficientClassData {
        class: String,
        requested: usize,
        available: usize,
    },

    #[error("Malformed codebook file at line {line}: {reason}")]
    MalformedCodebook { line: usize, reason: String },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig(reason.into())
    }

    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedCodebook {
            line,
            reason: reason.into(),
        }
    }
}

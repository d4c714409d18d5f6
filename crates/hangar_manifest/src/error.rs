//! Error types for manifest loading and dumping.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest CSV row could not be parsed.
    #[error("Invalid manifest row {line}: {message}")]
    InvalidRow { line: usize, message: String },

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

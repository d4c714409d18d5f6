//! Error types for document merging and the merge cache.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] hangar_core::Error),

    /// The document root is not a JSON object.
    #[error("Expected a JSON object at the document root, found {0}")]
    NotAnObject(&'static str),

    /// A JSONPath expression could not be parsed.
    #[error("Invalid JSONPath '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// An instruction selected nodes it cannot operate on.
    #[error("{action} at '{path}' failed: {message}")]
    Instruction {
        action: String,
        path: String,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

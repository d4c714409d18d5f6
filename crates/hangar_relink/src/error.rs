//! Error types for module resolution, relinking and the rewrite pass.
//!
//! All fallible functions in this crate return [`Result<T>`]. Only
//! [`Error::ShimSelfCheck`] and [`Error::ShimMissing`] are meant to stop the
//! process; everything else is reported and the caller decides how far it
//! propagates.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes are not a readable module image.
    #[error("Invalid module image: {0}")]
    InvalidModule(#[from] binrw::Error),

    #[error(transparent)]
    Core(#[from] hangar_core::Error),

    /// No search directory holds a module with this name.
    #[error("Could not resolve module '{0}'")]
    Resolution(String),

    /// The module lives in a read-only location.
    #[error("Module '{0}' is not allowed to be opened for modification")]
    WriteDenied(String),

    /// A shim module is missing from the library directory.
    #[error("Shim module '{name}' not found at {path}")]
    ShimMissing { name: String, path: Utf8PathBuf },

    /// A shim module declares a version outside the range it stands for.
    #[error("Shim version {version} of '{name}' does not fall within {range}")]
    ShimSelfCheck {
        name: String,
        version: String,
        range: String,
    },

    /// A registered rewrite step failed; the pass is aborted.
    #[error("Rewrite step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the process should stop instead of continuing without this subsystem.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ShimSelfCheck { .. } | Error::ShimMissing { .. })
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

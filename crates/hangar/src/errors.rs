use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Game directory not found")]
    #[diagnostic(
        code(game::not_found),
        help("Run hangar from inside the game directory or pass --game-dir <DIR>")
    )]
    GameDirNotFound { search_path: Utf8PathBuf },

    #[error("Not a game directory: {path}")]
    #[diagnostic(
        code(game::invalid_dir),
        help("The directory must contain BattleTech_Data/Managed")
    )]
    InvalidGameDir { path: Utf8PathBuf },

    #[error("File not found: {path}")]
    #[diagnostic(
        code(file::not_found),
        help("Make sure the file exists and the path is correct")
    )]
    FileNotFound { path: Utf8PathBuf },

    #[error("Patch library shims are broken")]
    #[diagnostic(
        code(relink::shims_broken),
        help("Reinstall the loader so Mods/Hangar/lib contains the shim modules of this release")
    )]
    BrokenShims {
        #[source]
        source: hangar_relink::Error,
    },

    #[error("Rewrite pass failed")]
    #[diagnostic(code(relink::pass_failed))]
    Relink {
        #[from]
        source: hangar_relink::Error,
    },

    #[error("Merge failed")]
    #[diagnostic(
        code(merge::failed),
        help("Check the contribution for JSON syntax errors and instructions pointing at the wrong kind of node")
    )]
    Merge {
        #[from]
        source: hangar_merge::Error,
    },

    #[error("IO operation failed")]
    #[diagnostic(code(io::operation_failed))]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn file_not_found(path: Utf8PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    /// Wraps a relink error, singling out the ones that must stop the loader.
    pub fn relink(source: hangar_relink::Error) -> Self {
        if source.is_fatal() {
            Self::BrokenShims { source }
        } else {
            Self::Relink { source }
        }
    }
}

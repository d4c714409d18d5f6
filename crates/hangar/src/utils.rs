use crate::errors::CliError;
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use hangar_core::{detect_game_dir, GameLayout};
use miette::{IntoDiagnostic, Result};

#[macro_export]
macro_rules! println_pad {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        for __line in __s.lines() {
            println!("    {}", __line);
        }
    }};
}

/// Layout for `--game-dir`, or for the game directory above the working directory.
pub fn resolve_layout(game_dir: Option<&str>) -> Result<GameLayout> {
    if let Some(dir) = game_dir {
        let path = Utf8PathBuf::from(dir);
        return GameLayout::open(path.clone()).map_err(|_| CliError::InvalidGameDir { path }.into());
    }

    let cwd = std::env::current_dir().into_diagnostic()?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| miette::miette!("Working directory is not valid UTF-8: {}", p.display()))?;
    match detect_game_dir(&cwd) {
        Some(dir) => Ok(GameLayout::new(dir)),
        None => Err(CliError::GameDirNotFound { search_path: cwd }.into()),
    }
}

/// Print a path entry with an existence indicator
pub fn print_path_status(name: &str, path: &Utf8Path) {
    let status = if path.exists() {
        "✓".bright_green()
    } else {
        "✗".bright_red()
    };
    println!("  {} {} {}", format!("{}:", name).bright_white(), path, status);
}

//! Filesystem helpers shared by the relink and merge crates.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

/// Removes `dir` with all of its content and recreates it empty.
pub fn setup_clean_directory(dir: &Utf8Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Lists the regular files directly inside `dir`, sorted by file name (ordinal).
///
/// With `extension` set, only files with that extension (ASCII case-insensitive)
/// are returned. A missing directory yields an empty list.
pub fn list_files(dir: &Utf8Path, extension: Option<&str>) -> Result<Vec<Utf8PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| Error::Other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.into_path())
            .map_err(|p| Error::InvalidPath(p.display().to_string()))?;

        if let Some(wanted) = extension {
            let matches = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
            if !matches {
                continue;
            }
        }
        files.push(path);
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Last modification time of `path` in UTC.
pub fn last_write_time_utc(path: &Utf8Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Round-trip ISO-8601 form with seven fractional digits, e.g. `2024-03-01T10:15:00.0000000Z`.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    let ticks = time.timestamp_subsec_nanos() / 100;
    format!("{}.{:07}Z", time.format("%Y-%m-%dT%H:%M:%S"), ticks)
}

/// Case-insensitive extension check.
pub fn has_extension(path: &str, ext: &str) -> bool {
    Utf8Path::new(path)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

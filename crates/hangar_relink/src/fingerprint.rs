//! Injection cache fingerprint.
//!
//! The rewrite pass is skipped when nothing it reads or writes has changed
//! since the last successful pass. "Changed" is decided by comparing a text
//! fingerprint of the relevant files (last write time plus game-relative path,
//! sorted by path) against the copy persisted at the end of that pass.
//!
//! # File format
//!
//! ```text
//! Generated:\0<time>,<path>\0<time>,<path>...
//! ```
//!
//! The file set covers the rewrite inputs (managed directory, loader config,
//! library modules, injectors, override modules) and its outputs (modules in
//! the injected directory), so tampering with either side invalidates the cache.

use crate::error::Result;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use hangar_core::{fs, GameLayout, MODULE_EXTENSION};
use std::cmp::Ordering;

const FINGERPRINT_PREFIX: &str = "Generated:";

/// One file's contribution to the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintEntry {
    pub time: String,
    pub path: String,
}

impl FingerprintEntry {
    pub fn new(time: &DateTime<Utc>, path: impl Into<String>) -> Self {
        Self {
            time: fs::format_timestamp(time),
            path: path.into(),
        }
    }

    /// Builds the entry for a file on disk. Missing files get the Unix epoch as timestamp.
    pub fn from_file(layout: &GameLayout, path: &Utf8Path) -> Result<Self> {
        let time = if path.exists() {
            fs::last_write_time_utc(path)?
        } else {
            DateTime::<Utc>::default()
        };
        Ok(Self::new(&time, layout.relative_to_game(path)))
    }
}

impl Ord for FingerprintEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl PartialOrd for FingerprintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Builds the fingerprint text; input order does not matter.
pub fn compute_fingerprint(entries: impl IntoIterator<Item = FingerprintEntry>) -> String {
    let mut entries: Vec<_> = entries.into_iter().collect();
    entries.sort();

    let mut content = String::from(FINGERPRINT_PREFIX);
    for entry in entries {
        content.push('\0');
        content.push_str(&entry.time);
        content.push(',');
        content.push_str(&entry.path);
    }
    content
}

/// Every file that contributes to the injection fingerprint.
pub fn fingerprint_files(layout: &GameLayout) -> Result<Vec<Utf8PathBuf>> {
    let dll = Some(MODULE_EXTENSION);
    let mut files = Vec::new();
    // inputs
    files.extend(fs::list_files(&layout.managed_dir, None)?);
    files.push(layout.config_file.clone());
    files.extend(fs::list_files(&layout.lib_dir, dll)?);
    files.extend(fs::list_files(&layout.injectors_dir, None)?);
    files.extend(fs::list_files(&layout.override_dir, dll)?);
    // outputs
    files.extend(fs::list_files(&layout.injected_dir, dll)?);
    Ok(files)
}

/// Fingerprint of the current state of `layout` on disk.
pub fn compute_actual_fingerprint(layout: &GameLayout) -> Result<String> {
    let entries = fingerprint_files(layout)?
        .iter()
        .map(|path| FingerprintEntry::from_file(layout, path))
        .collect::<Result<Vec<_>>>()?;
    Ok(compute_fingerprint(entries))
}

/// Reads the persisted fingerprint.
///
/// A missing file yields `None`. An unreadable file is logged, deleted and
/// also yields `None`.
pub fn read_persisted_fingerprint(path: &Utf8Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!("Error reading cache {}: {}", path, e);
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Could not delete unreadable cache {}: {}", path, e);
            }
            None
        }
    }
}

/// Writes `content` next to `path` first and renames it into place.
pub(crate) fn write_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Freshness check for the injected module set.
#[derive(Debug, Clone)]
pub struct InjectionCacheManifest {
    layout: GameLayout,
    actual: String,
    up_to_date: bool,
}

impl InjectionCacheManifest {
    /// Computes the current fingerprint and compares it (case-insensitively)
    /// with the persisted one.
    pub fn load(layout: &GameLayout) -> Result<Self> {
        let expected = read_persisted_fingerprint(&layout.injection_manifest_file);
        let actual = compute_actual_fingerprint(layout)?;
        let up_to_date = expected
            .as_deref()
            .is_some_and(|expected| expected.to_lowercase() == actual.to_lowercase());

        let rel = layout.relative_to_game(&layout.injection_manifest_file);
        if up_to_date {
            tracing::info!("Injection cache manifest at {} is up to date.", rel);
        } else {
            tracing::info!("Injection cache manifest at {} is outdated.", rel);
        }

        Ok(Self {
            layout: layout.clone(),
            actual,
            up_to_date,
        })
    }

    pub fn is_up_to_date(&self) -> bool {
        self.up_to_date
    }

    /// The fingerprint computed when this manifest was loaded.
    pub fn actual(&self) -> &str {
        &self.actual
    }

    /// Recomputes the fingerprint (outputs have changed by now) and persists it.
    pub fn refresh_and_save(&mut self) -> Result<()> {
        self.actual = compute_actual_fingerprint(&self.layout)?;
        write_atomic(&self.layout.injection_manifest_file, &self.actual)?;
        self.up_to_date = true;
        Ok(())
    }
}

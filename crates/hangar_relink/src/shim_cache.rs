//! Path-keyed cache of relinked modules.
//!
//! When the host loads a module by file path, the loader substitutes a
//! relinked copy from the shimmed directory. The decision per original file
//! is remembered across runs in `_Manifest.csv`:
//!
//! ```text
//! <injection fingerprint>
//! <time>\0<original relative path>\0<path to load>
//! ...
//! ```
//!
//! The first line ties the cache to the injection fingerprint; when it no
//! longer matches, every shimmed module is discarded.

use crate::error::{Error, Result};
use crate::fingerprint::{compute_actual_fingerprint, write_atomic};
use crate::module::ModuleImage;
use crate::shim::ShimSet;
use camino::{Utf8Path, Utf8PathBuf};
use hangar_core::{fs, GameLayout, MODULE_EXTENSION};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ShimCacheEntry {
    time: String,
    original_path: String,
    load_path: Utf8PathBuf,
}

impl ShimCacheEntry {
    fn parse(line: &str) -> Result<Self> {
        let mut cols = line.split('\0');
        match (cols.next(), cols.next(), cols.next(), cols.next()) {
            (Some(time), Some(original_path), Some(load_path), None) => Ok(Self {
                time: time.to_string(),
                original_path: original_path.to_string(),
                load_path: Utf8PathBuf::from(load_path),
            }),
            _ => Err(Error::Other(format!("malformed shim cache line: {line:?}"))),
        }
    }

    fn to_line(&self) -> String {
        format!("{}\0{}\0{}", self.time, self.original_path, self.load_path)
    }
}

pub struct ShimCache {
    layout: GameLayout,
    shims: ShimSet,
    header: String,
    entries: BTreeMap<String, ShimCacheEntry>,
}

impl ShimCache {
    /// Opens the cache, discarding it when it belongs to a different injection state.
    pub fn open(layout: &GameLayout, shims: ShimSet) -> Result<Self> {
        let header = compute_actual_fingerprint(layout)?;
        let mut cache = Self {
            layout: layout.clone(),
            shims,
            header,
            entries: BTreeMap::new(),
        };
        cache.load()?;
        Ok(cache)
    }

    fn load(&mut self) -> Result<()> {
        let file = &self.layout.shim_manifest_file;
        if file.exists() {
            match read_entries(file, &self.header) {
                Ok(Some(entries)) => {
                    tracing::info!("Shimmed cache manifest is up to date.");
                    self.entries = entries;
                    return Ok(());
                }
                Ok(None) => tracing::info!("Shimmed cache manifest is outdated."),
                Err(e) => {
                    tracing::warn!("Shimmed cache manifest could not be loaded {}: {}", file, e);
                    if let Err(e) = std::fs::remove_file(file) {
                        tracing::warn!("Could not delete shimmed cache manifest {}: {}", file, e);
                    }
                }
            }
        }
        fs::setup_clean_directory(&self.layout.shimmed_dir)?;
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let mut content = self.header.clone();
        for entry in self.entries.values() {
            content.push('\n');
            content.push_str(&entry.to_line());
        }
        content.push('\n');
        write_atomic(&self.layout.shim_manifest_file, &content)
    }

    /// Path the host should load instead of `original`.
    ///
    /// Errors are logged and answered with the original path.
    pub fn shimmed_path_for(&mut self, original: &Utf8Path) -> Utf8PathBuf {
        let original = if original.is_absolute() {
            original.to_path_buf()
        } else {
            self.layout.game_dir.join(original)
        };
        if original.starts_with(&self.layout.shimmed_dir) {
            return original;
        }

        match self.try_shimmed_path_for(&original) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Error preparing module load for shim: {}", e);
                original
            }
        }
    }

    fn try_shimmed_path_for(&mut self, original: &Utf8Path) -> Result<Utf8PathBuf> {
        let time = fs::format_timestamp(&fs::last_write_time_utc(original)?);
        let original_rel = self.layout.relative_to_game(original);

        if let Some(entry) = self.entries.get(&original_rel) {
            if entry.time == time && entry.load_path.exists() {
                self.log_loading(original, &entry.load_path, None);
                return Ok(entry.load_path.clone());
            }
        }

        let begin = Instant::now();
        let load_path = self
            .relink_to_shimmed_dir(original)?
            .unwrap_or_else(|| original.to_path_buf());
        self.entries.insert(
            original_rel.clone(),
            ShimCacheEntry {
                time,
                original_path: original_rel,
                load_path: load_path.clone(),
            },
        );
        self.save()?;
        self.log_loading(original, &load_path, Some(begin));
        Ok(load_path)
    }

    fn relink_to_shimmed_dir(&self, original: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        let mut module = ModuleImage::load(original)?;
        if !self.shims.detect_and_relink(&mut module) {
            return Ok(None);
        }
        let path = self
            .layout
            .shimmed_dir
            .join(format!("{}.{}", module.name, MODULE_EXTENSION));
        tracing::info!(
            "Saving shimmed module to {}.",
            self.layout.relative_to_game(&path)
        );
        std::fs::create_dir_all(&self.layout.shimmed_dir)?;
        module.save(&path)?;
        Ok(Some(path))
    }

    fn log_loading(&self, original: &Utf8Path, load_path: &Utf8Path, begin: Option<Instant>) {
        if original == load_path {
            return;
        }
        let mut text = format!(
            "Loading shimmed module from {} instead of {}",
            self.layout.relative_to_game(load_path),
            self.layout.relative_to_game(original)
        );
        if let Some(begin) = begin {
            text.push_str(&format!(
                ", shimming took {:.3}s",
                begin.elapsed().as_secs_f64()
            ));
        }
        tracing::info!("{}.", text);
    }
}

/// `Ok(None)` when the header does not match.
fn read_entries(
    file: &Utf8Path,
    header: &str,
) -> Result<Option<BTreeMap<String, ShimCacheEntry>>> {
    let content = std::fs::read_to_string(file)?;
    let mut lines = content.lines();
    if lines.next() != Some(header) {
        return Ok(None);
    }
    let mut entries = BTreeMap::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let entry = ShimCacheEntry::parse(line)?;
        entries.insert(entry.original_path.clone(), entry);
    }
    Ok(Some(entries))
}

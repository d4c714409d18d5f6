//! Module resolution and per-pass module cache.
//!
//! [`AssemblyStore`] owns every module opened during one rewrite pass. Modules
//! are found through a [`CandidateTable`] that is scanned once: the override
//! directory first, the privileged library directory second and the game's
//! managed directory last, with the first hit for a name winning.

use crate::error::{Error, Result};
use crate::module::ModuleImage;
use camino::{Utf8Path, Utf8PathBuf};
use hangar_core::{fs, GameLayout, MODULE_EXTENSION};
use std::collections::BTreeMap;

/// Modules the host process has already loaded before any rewrite step runs.
pub const HOST_LOADED_MODULES: [&str; 4] = ["mscorlib", "System", "System.Core", "Mono.Security"];

/// Resolution interface handed to rewrite steps.
pub trait ModuleResolver {
    /// Opens a module for reading.
    fn resolve(&mut self, name: &str) -> Result<&ModuleImage>;

    /// Opens a module for modification and marks it dirty.
    fn resolve_mut(&mut self, name: &str) -> Result<&mut ModuleImage>;
}

/// Where a module name was found and whether it may be modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyCandidate {
    pub path: Utf8PathBuf,
    pub read_only: bool,
}

/// One directory of the module search order.
#[derive(Debug, Clone, Copy)]
pub struct SearchDir<'a> {
    pub path: &'a Utf8Path,
    /// Every module found here is read-only.
    pub privileged: bool,
}

/// Logical module name to candidate file, built by one directory scan.
#[derive(Debug, Clone, Default)]
pub struct CandidateTable {
    candidates: BTreeMap<String, AssemblyCandidate>,
}

impl CandidateTable {
    /// Scans `dirs` in order. Missing directories are skipped.
    pub fn scan(dirs: &[SearchDir<'_>], host_loaded: &[&str]) -> Result<Self> {
        let mut candidates = BTreeMap::new();
        for dir in dirs {
            for path in fs::list_files(dir.path, Some(MODULE_EXTENSION))? {
                let Some(stem) = path.file_stem() else {
                    continue;
                };
                let name = logical_module_name(stem).to_string();
                if candidates.contains_key(&name) {
                    continue;
                }
                let read_only = dir.privileged || host_loaded.contains(&name.as_str());
                candidates.insert(name, AssemblyCandidate { path, read_only });
            }
        }
        tracing::debug!("Module candidates: {}", candidates.len());
        Ok(Self { candidates })
    }

    /// Scans the search directories of a game layout.
    pub fn from_layout(layout: &GameLayout) -> Result<Self> {
        let [override_dir, lib_dir, managed_dir] = layout.module_search_dirs();
        Self::scan(
            &[
                SearchDir {
                    path: override_dir,
                    privileged: false,
                },
                SearchDir {
                    path: lib_dir,
                    privileged: true,
                },
                SearchDir {
                    path: managed_dir,
                    privileged: false,
                },
            ],
            &HOST_LOADED_MODULES,
        )
    }

    pub fn get(&self, name: &str) -> Option<&AssemblyCandidate> {
        self.candidates.get(name)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Maps a file stem to the module name it is registered under.
fn logical_module_name(stem: &str) -> &str {
    // shipped under the wrong file name
    if stem == "Dapper.Unity" {
        "Dapper"
    } else {
        stem
    }
}

/// A module opened during the current pass.
#[derive(Debug)]
pub struct ModuleRecord {
    pub name: String,
    pub read_only: bool,
    pub dirty: bool,
    pub image: ModuleImage,
}

/// Per-pass module cache.
#[derive(Debug)]
pub struct AssemblyStore {
    candidates: CandidateTable,
    records: BTreeMap<String, ModuleRecord>,
}

impl AssemblyStore {
    pub fn new(candidates: CandidateTable) -> Self {
        Self {
            candidates,
            records: BTreeMap::new(),
        }
    }

    /// Resolves `name`, opening it from disk on first use.
    ///
    /// The write policy is checked on every call. Any write request marks the
    /// record dirty, whether or not the caller ends up changing it.
    pub fn resolve_record(&mut self, name: &str, want_write: bool) -> Result<&mut ModuleRecord> {
        if !self.records.contains_key(name) {
            let candidate = self
                .candidates
                .get(name)
                .ok_or_else(|| Error::Resolution(name.to_string()))?;
            let image = ModuleImage::load(&candidate.path)?;
            tracing::debug!("Opened module {} from {}", name, candidate.path);
            self.records.insert(
                name.to_string(),
                ModuleRecord {
                    name: name.to_string(),
                    read_only: candidate.read_only,
                    dirty: false,
                    image,
                },
            );
        }

        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| Error::Resolution(name.to_string()))?;
        if want_write {
            if record.read_only {
                return Err(Error::WriteDenied(name.to_string()));
            }
            record.dirty = true;
        }
        Ok(record)
    }

    /// Names of the modules opened so far, in name order.
    pub fn opened(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.records.get(name).is_some_and(|r| r.dirty)
    }

    /// Wipes `output_dir` and writes every dirty module to `<output_dir>/<name>.dll`.
    ///
    /// Returns the written paths in name order.
    pub fn save_all(&self, output_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        fs::setup_clean_directory(output_dir)?;
        tracing::info!("Modules modified by rewrite steps and saved to {}:", output_dir);

        let mut saved = Vec::new();
        for record in self.records.values().filter(|r| r.dirty) {
            let path = output_dir.join(format!("{}.{}", record.name, MODULE_EXTENSION));
            tracing::info!("\t{}", path.file_name().unwrap_or(record.name.as_str()));
            record.image.save(&path)?;
            saved.push(path);
        }
        Ok(saved)
    }

    /// Drops every opened module. Safe to call more than once.
    pub fn dispose_all(&mut self) {
        self.records.clear();
    }
}

impl ModuleResolver for AssemblyStore {
    fn resolve(&mut self, name: &str) -> Result<&ModuleImage> {
        Ok(&self.resolve_record(name, false)?.image)
    }

    fn resolve_mut(&mut self, name: &str) -> Result<&mut ModuleImage> {
        Ok(&mut self.resolve_record(name, true)?.image)
    }
}

//! Persistent cache of merged resources.
//!
//! Mods queue contributions for a resource during discovery. When the game
//! later asks for the resource, the queued record is compared with the one
//! persisted from the previous run: if the original's timestamp and the
//! ordered list of contributions match, the merged output written last time
//! is served as is. Otherwise the merge is recomputed, written to
//! `MergeCache/<type>/<id><ext>` and the persisted record updated.
//!
//! Records are keyed by `"<type>:<id>"`. Contributions with an unknown type
//! are queued under `":<id>"` and moved to the typed key on first lookup.

use crate::advanced::{merge_into_target, AdvancedMerge};
use crate::error::Result;
use crate::json::{parse_game_json, parse_game_json_file, to_indented_string};
use crate::text::{append_text, AppendMode};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use hangar_core::fs::{has_extension, last_write_time_utc};
use hangar_core::{GameLayout, MergeConfig};
use hangar_manifest::ManifestEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

/// Type of mod entries that hold an [`AdvancedMerge`] document.
pub const ADVANCED_JSON_MERGE_TYPE: &str = "AdvancedJSONMerge";

pub fn cache_key(kind: Option<&str>, id: &str) -> String {
    format!("{}:{}", kind.unwrap_or_default(), id)
}

/// A mod file that wants to be merged into or appended to a game resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModContribution {
    pub id: String,
    pub kind: Option<String>,
    /// Absolute path of the mod's file.
    pub path: Utf8PathBuf,
    pub asset_bundle_name: Option<String>,
    pub should_merge_json: bool,
    pub should_append_text: bool,
}

impl ModContribution {
    pub fn merge_json(id: impl Into<String>, kind: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind.into()),
            path: path.into(),
            should_merge_json: true,
            ..Default::default()
        }
    }

    pub fn append_text(id: impl Into<String>, kind: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind: Some(kind.into()),
            path: path.into(),
            should_append_text: true,
            ..Default::default()
        }
    }

    /// An advanced merge file; its targets come from the file itself.
    pub fn advanced(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: path.file_stem().unwrap_or_default().to_string(),
            kind: Some(ADVANCED_JSON_MERGE_TYPE.to_string()),
            path,
            ..Default::default()
        }
    }

    fn is_valid_merge(&self) -> bool {
        let path = self.path.as_str();
        (self.should_merge_json && has_extension(path, "json"))
            || (self.should_append_text && (has_extension(path, "txt") || has_extension(path, "csv")))
    }
}

/// Identity of one contribution file at the time it was merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_bundle_name: Option<String>,
    /// Relative to the mods directory.
    pub path: String,
    pub updated_on: DateTime<Utc>,
}

impl FileVersion {
    pub fn from_contribution(contribution: &ModContribution, layout: &GameLayout) -> Result<Self> {
        Ok(Self {
            asset_bundle_name: contribution.asset_bundle_name.clone(),
            path: layout.relative_to_mods(&contribution.path),
            updated_on: last_write_time_utc(&contribution.path)?,
        })
    }

    pub fn absolute_path(&self, mods_dir: &Utf8Path) -> Utf8PathBuf {
        mods_dir.join(&self.path)
    }
}

/// What went into one merged output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MergeCacheRecord {
    /// Relative to the merge cache directory.
    pub cached_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_updated_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merges: Vec<FileVersion>,
}

impl MergeCacheRecord {
    fn new(kind: Option<&str>, id: &str, source_path: &Utf8Path) -> Self {
        Self {
            cached_path: cached_path_for(kind, id, source_path),
            original_updated_on: None,
            merges: Vec::new(),
        }
    }

    pub fn is_json_merge(&self) -> bool {
        has_extension(&self.cached_path, "json")
    }

    /// Applies every contribution to `original` in queue order.
    pub fn merge(&self, mods_dir: &Utf8Path, original: &str, normalize_csv: bool) -> Result<String> {
        if self.is_json_merge() {
            let mut target = parse_game_json(original)?;
            for version in &self.merges {
                let contribution = parse_game_json_file(&version.absolute_path(mods_dir))?;
                merge_into_target(&mut target, contribution)?;
            }
            return to_indented_string(&target);
        }

        let parts = self
            .merges
            .iter()
            .map(|version| fs::read_to_string(version.absolute_path(mods_dir)))
            .collect::<std::io::Result<Vec<_>>>()?;
        let mode = if normalize_csv && has_extension(&self.cached_path, "csv") {
            AppendMode::NormalizeCsv
        } else {
            AppendMode::Concat
        };
        Ok(append_text(original, &parts, mode))
    }
}

fn cached_path_for(kind: Option<&str>, id: &str, source_path: &Utf8Path) -> String {
    let file_name = match source_path.extension() {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    };
    match kind {
        Some(kind) if !kind.is_empty() => format!("{kind}/{file_name}"),
        _ => file_name,
    }
}

pub struct MergeCache {
    layout: GameLayout,
    normalize_csv: bool,
    /// Records whose outputs were written by a previous or the current run.
    persistent: BTreeMap<String, MergeCacheRecord>,
    /// Records built from this run's queued contributions.
    queued: BTreeMap<String, MergeCacheRecord>,
    has_changes: bool,
}

impl MergeCache {
    /// Loads the persisted records. A missing or unreadable file starts empty.
    pub fn load(layout: &GameLayout, config: &MergeConfig) -> Self {
        let persistent = match read_records(&layout.merge_cache_file) {
            Ok(Some(records)) => records,
            Ok(None) => {
                tracing::info!("Merge Cache: Rebuilding cache.");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!("Merge Cache: Loading merge cache failed: {}", e);
                if let Err(e) = fs::remove_file(&layout.merge_cache_file) {
                    tracing::warn!("Merge Cache: Couldn't delete {}: {}", layout.merge_cache_file, e);
                }
                tracing::info!("Merge Cache: Rebuilding cache.");
                BTreeMap::new()
            }
        };

        Self {
            layout: layout.clone(),
            normalize_csv: config.normalize_csv_on_append,
            persistent,
            queued: BTreeMap::new(),
            has_changes: false,
        }
    }

    /// Writes the persisted records if anything changed since the last save.
    pub fn save(&mut self) -> Result<()> {
        if !self.has_changes {
            tracing::debug!("Merge Cache: No changes detected, skipping save.");
            return Ok(());
        }
        let path = &self.layout.merge_cache_file;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.persistent)?)?;
        tracing::info!("Merge Cache: Saved to {}.", path);
        self.has_changes = false;
        Ok(())
    }

    /// Queues a mod file. Returns `false` when the file is not a merge at all.
    ///
    /// Invalid merges are logged and dropped but still count as handled.
    pub fn add_mod_entry(&mut self, contribution: &ModContribution) -> bool {
        if contribution.kind.as_deref() == Some(ADVANCED_JSON_MERGE_TYPE) {
            let Some(merge) = AdvancedMerge::from_file(&contribution.path) else {
                return true;
            };
            let targets = merge.targets();
            if targets.is_empty() {
                tracing::error!(
                    "AdvancedJSONMerge: \"{}\" didn't target any IDs. Skipping merge.",
                    self.layout.relative_to_mods(&contribution.path)
                );
                return true;
            }
            for target in targets {
                let copy = ModContribution {
                    id: target.to_string(),
                    kind: merge.target_type.clone(),
                    ..contribution.clone()
                };
                self.queue(&copy);
            }
            return true;
        }

        if !contribution.should_merge_json && !contribution.should_append_text {
            return false;
        }
        if contribution.is_valid_merge() {
            self.queue(contribution);
        } else {
            tracing::error!(
                "ShouldMergeJSON requires .json and ShouldAppendText requires .txt or .csv: \"{}\".",
                self.layout.relative_to_mods(&contribution.path)
            );
        }
        true
    }

    fn queue(&mut self, contribution: &ModContribution) {
        let version = match FileVersion::from_contribution(contribution, &self.layout) {
            Ok(version) => version,
            Err(e) => {
                tracing::error!("Merge Cache: Couldn't queue {}: {}", contribution.path, e);
                return;
            }
        };
        let kind = contribution.kind.as_deref();
        self.queued
            .entry(cache_key(kind, &contribution.id))
            .or_insert_with(|| MergeCacheRecord::new(kind, &contribution.id, &contribution.path))
            .merges
            .push(version);
    }

    /// Key of the queued record for `entry`, adopting an untyped record if needed.
    fn queued_key(&mut self, entry: &ManifestEntry) -> Option<String> {
        let key = cache_key(Some(&entry.kind), &entry.id);
        if self.queued.contains_key(&key) {
            return Some(key);
        }
        let mut record = self.queued.remove(&cache_key(None, &entry.id))?;
        record.cached_path = cached_path_for(Some(&entry.kind), &entry.id, Utf8Path::new(&entry.path));
        self.queued.insert(key.clone(), record);
        Some(key)
    }

    pub fn has_merges(&mut self, entry: &ManifestEntry) -> bool {
        self.queued_key(entry).is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Absolute path of the cached output when it is still valid for `entry`.
    pub fn cached_output(&mut self, entry: &ManifestEntry) -> Option<Utf8PathBuf> {
        let key = self.queued_key(entry)?;
        let record = self.queued.get_mut(&key)?;
        record.original_updated_on = entry.updated_on;

        let persisted = self.persistent.get(&key)?;
        if *persisted != *record {
            return None;
        }
        let path = self.layout.merge_cache_dir.join(&record.cached_path);
        path.is_file().then_some(path)
    }

    /// The cached merged content, or `None` when it must be recomputed.
    pub fn cached_content(&mut self, entry: &ManifestEntry) -> Option<String> {
        let path = self.cached_output(entry)?;
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!("Merge Cache: Couldn't read cached merge result at {}: {}", path, e);
                None
            }
        }
    }

    /// Merges the queued contributions into `original` and caches the result.
    ///
    /// Returns `None` when nothing is queued for `entry` or the merge failed.
    /// A failure to write the cache is logged but the merged content is still
    /// returned.
    pub fn merge_and_cache(&mut self, entry: &ManifestEntry, original: &str) -> Option<String> {
        let key = self.queued_key(entry)?;
        let record = self.queued.get_mut(&key)?;
        record.original_updated_on = entry.updated_on;
        let record = record.clone();

        let output_path = self.layout.merge_cache_dir.join(&record.cached_path);
        let merged = match record.merge(&self.layout.mods_dir, original, self.normalize_csv) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::error!("Merge Cache: Couldn't merge {}: {}", output_path, e);
                return None;
            }
        };

        match write_output(&output_path, &merged) {
            Ok(()) => {
                self.persistent.insert(key, record);
                self.has_changes = true;
                if let Err(e) = self.save() {
                    tracing::error!("Merge Cache: Couldn't write to {}: {}", self.layout.merge_cache_file, e);
                }
            }
            Err(e) => {
                tracing::error!("Merge Cache: Couldn't write cached merge result to {}: {}", output_path, e);
            }
        }
        Some(merged)
    }
}

fn read_records(path: &Utf8Path) -> Result<Option<BTreeMap<String, MergeCacheRecord>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_output(path: &Utf8Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

//! The composed manifest with its "all" and "owned" views.
//!
//! Both views are keyed by (type, id) and kept materialized: every write goes
//! to "all" and, when the entry passes the ownership predicate, to "owned".
//! Later writes for the same key replace earlier ones in that view.
//!
//! Text documents (see [`ManifestEntry::is_string_resource`]) are also indexed
//! by id alone. The first entry for an id wins in that index; a later
//! duplicate is reported and dropped.

use crate::entry::ManifestEntry;
use crate::overlay::Overlay;
use std::collections::{BTreeMap, BTreeSet};

type TypedMap = BTreeMap<String, BTreeMap<String, ManifestEntry>>;

#[derive(Debug, Clone, Default)]
pub struct ManifestLayer {
    all: TypedMap,
    owned: TypedMap,
    strings: BTreeMap<String, ManifestEntry>,
    active: BTreeSet<String>,
}

impl ManifestLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every view and applies `base` as owned.
    pub fn reset(&mut self, base: &[ManifestEntry]) {
        self.all.clear();
        self.owned.clear();
        self.strings.clear();
        self.active.clear();
        for entry in base {
            self.set_entry(entry, true);
        }
    }

    /// Folds all entries of `overlay` in order. `owned` is evaluated per entry.
    pub fn apply_overlay(&mut self, overlay: &Overlay, owned: impl Fn(&ManifestEntry) -> bool) {
        self.apply_entries(&overlay.entries, owned);
    }

    pub(crate) fn apply_entries(&mut self, entries: &[ManifestEntry], owned: impl Fn(&ManifestEntry) -> bool) {
        for entry in entries {
            self.set_entry(entry, owned(entry));
        }
    }

    fn set_entry(&mut self, entry: &ManifestEntry, owned: bool) {
        if owned {
            insert(&mut self.owned, entry);
        }
        insert(&mut self.all, entry);
        self.set_string_entry(entry);
    }

    fn set_string_entry(&mut self, entry: &ManifestEntry) {
        if !entry.is_string_resource() {
            return;
        }
        if self.strings.contains_key(&entry.id) {
            tracing::error!("Found duplicate entry for same id of string type {}", entry.id);
            return;
        }
        self.strings.insert(entry.id.clone(), entry.clone());
    }

    pub fn mark_active(&mut self, overlay_name: &str) {
        self.active.insert(overlay_name.to_string());
    }

    pub fn is_active(&self, overlay_name: &str) -> bool {
        self.active.contains(overlay_name)
    }

    pub fn active_overlays(&self) -> &BTreeSet<String> {
        &self.active
    }

    fn view(&self, filter_by_ownership: bool) -> &TypedMap {
        if filter_by_ownership {
            &self.owned
        } else {
            &self.all
        }
    }

    pub fn get(&self, id: &str, kind: &str, filter_by_ownership: bool) -> Option<&ManifestEntry> {
        self.view(filter_by_ownership).get(kind)?.get(id)
    }

    pub fn all_of_type(&self, kind: &str, filter_by_ownership: bool) -> Vec<&ManifestEntry> {
        self.view(filter_by_ownership)
            .get(kind)
            .map(|entries| entries.values().collect())
            .unwrap_or_default()
    }

    pub fn all_entries(&self, filter_by_ownership: bool) -> Vec<&ManifestEntry> {
        self.view(filter_by_ownership)
            .values()
            .flat_map(|entries| entries.values())
            .collect()
    }

    pub fn string_entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.strings.get(id)
    }

    /// One entry per type that has an entry with this id.
    pub fn entries_by_id(&self, id: &str) -> Vec<&ManifestEntry> {
        self.all
            .values()
            .filter_map(|entries| entries.get(id))
            .collect()
    }
}

fn insert(view: &mut TypedMap, entry: &ManifestEntry) {
    view.entry(entry.kind.clone())
        .or_default()
        .insert(entry.id.clone(), entry.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, kind: &str, path: &str) -> ManifestEntry {
        ManifestEntry::new(id, kind, path)
    }

    #[test]
    fn test_last_applied_wins() {
        let mut layer = ManifestLayer::new();
        layer.reset(&[entry("a", "MechDef", "base/a.json")]);
        layer.apply_overlay(
            &Overlay::new("one", vec![entry("a", "MechDef", "one/a.json")]),
            |_| true,
        );
        layer.apply_overlay(
            &Overlay::new("two", vec![entry("a", "MechDef", "two/a.bin")]),
            |_| true,
        );
        assert_eq!(layer.get("a", "MechDef", false).unwrap().path, "two/a.bin");
        assert_eq!(layer.get("a", "MechDef", true).unwrap().path, "two/a.bin");
        assert!(layer.get("a", "WeaponDef", false).is_none());
    }

    #[test]
    fn test_owned_view_follows_predicate() {
        let mut layer = ManifestLayer::new();
        layer.reset(&[entry("a", "MechDef", "base/a.json")]);
        layer.apply_overlay(
            &Overlay::new(
                "dlc",
                vec![entry("a", "MechDef", "dlc/a.bin"), entry("b", "MechDef", "dlc/b.bin")],
            ),
            |e| e.id == "b",
        );

        assert_eq!(layer.get("a", "MechDef", false).unwrap().path, "dlc/a.bin");
        assert_eq!(layer.get("a", "MechDef", true).unwrap().path, "base/a.json");
        assert_eq!(layer.all_of_type("MechDef", false).len(), 2);
        assert_eq!(layer.all_of_type("MechDef", true).len(), 2);
        assert!(layer.all_of_type("Missing", true).is_empty());
    }

    #[test]
    fn test_string_index_keeps_first() {
        let mut layer = ManifestLayer::new();
        layer.reset(&[
            entry("text", "Text", "base/text.txt"),
            entry("tex", "Texture", "base/tex.dds"),
        ]);
        layer.apply_overlay(
            &Overlay::new("mod", vec![entry("text", "Json", "mod/text.json")]),
            |_| true,
        );

        assert_eq!(layer.string_entry("text").unwrap().path, "base/text.txt");
        assert!(layer.string_entry("tex").is_none());
        assert_eq!(layer.entries_by_id("text").len(), 2);
        assert_eq!(layer.all_entries(false).len(), 3);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut layer = ManifestLayer::new();
        layer.apply_overlay(&Overlay::new("x", vec![entry("a", "Text", "a.txt")]), |_| true);
        layer.mark_active("x");
        layer.reset(&[]);
        assert!(layer.all_entries(false).is_empty());
        assert!(layer.string_entry("a").is_none());
        assert!(!layer.is_active("x"));
    }
}

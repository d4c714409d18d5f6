//! Overlay composition.
//!
//! [`ManifestComposer`] remembers the base manifest, the game's overlays,
//! the mods' overlays and per-overlay override entries, and rebuilds the
//! [`ManifestLayer`] from them whenever something changed:
//!
//! 1. base entries (owned)
//! 2. game overlays in registration order, owned per entry by the gate
//! 3. mod overlays in load order (owned), each only if all of its required
//!    overlays were active and owned after step 2
//!
//! Overrides registered for an overlay name are appended to that overlay's
//! entries before it is folded in.
//!
//! Memory stores are game overlays built in memory. They fold in like any
//! other game overlay, but their entries can be replaced after they were
//! applied, and a reverse index answers which stores declare a given entry.

use crate::entry::{write_manifest_csv, ManifestEntry};
use crate::error::Result;
use crate::layer::ManifestLayer;
use crate::memory_store::MemoryStoreIndex;
use crate::overlay::{ModOverlay, OverlayKind, OwnAll, OwnershipGate, Overlay};
use camino::Utf8Path;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

pub struct ManifestComposer {
    base: Vec<ManifestEntry>,
    game_overlays: Vec<Overlay>,
    mod_overlays: Vec<ModOverlay>,
    overrides: BTreeMap<String, Vec<ManifestEntry>>,
    gate: Box<dyn OwnershipGate>,
    memory_stores: MemoryStoreIndex,
    layer: ManifestLayer,
    has_changes: bool,
}

impl ManifestComposer {
    pub fn new(base: Vec<ManifestEntry>) -> Self {
        let mut composer = Self {
            base,
            game_overlays: Vec::new(),
            mod_overlays: Vec::new(),
            overrides: BTreeMap::new(),
            gate: Box::new(OwnAll),
            memory_stores: MemoryStoreIndex::new(),
            layer: ManifestLayer::new(),
            has_changes: true,
        };
        composer.refresh();
        composer
    }

    pub fn set_ownership(&mut self, gate: impl OwnershipGate + 'static) {
        self.gate = Box::new(gate);
        self.has_changes = true;
        self.refresh();
    }

    /// Registers a game overlay. An overlay whose name is already registered is ignored.
    pub fn apply_addendum(&mut self, overlay: Overlay) -> bool {
        if self.addendum_by_name(&overlay.name).is_some() {
            tracing::debug!("Overlay {} already applied, ignoring", overlay.name);
            return false;
        }
        self.game_overlays.push(overlay);
        self.has_changes = true;
        self.refresh();
        true
    }

    /// Unregisters a game overlay by name, memory stores included.
    pub fn remove_addendum(&mut self, name: &str) -> bool {
        let before = self.game_overlays.len();
        self.game_overlays.retain(|o| o.name != name);
        if self.game_overlays.len() == before {
            return false;
        }
        self.memory_stores.unindex(name);
        self.has_changes = true;
        self.refresh();
        true
    }

    pub fn addendum_by_name(&self, name: &str) -> Option<&Overlay> {
        self.game_overlays.iter().find(|o| o.name == name)
    }

    /// Registers `store` as a memory store. Ignored if any game overlay with
    /// that name is already registered.
    pub fn apply_memory_store(&mut self, store: Overlay) -> bool {
        let store = Overlay {
            kind: OverlayKind::MemoryStore,
            ..store
        };
        if self.addendum_by_name(&store.name).is_some() {
            tracing::debug!("Memory store {} already applied, ignoring", store.name);
            return false;
        }
        self.memory_stores.index(&store);
        self.game_overlays.push(store);
        self.has_changes = true;
        self.refresh();
        true
    }

    pub fn remove_memory_store(&mut self, name: &str) -> bool {
        if self.memory_store_by_name(name).is_none() {
            return false;
        }
        self.remove_addendum(name)
    }

    /// Replaces the entries of a registered memory store and re-indexes it.
    ///
    /// The layer is rebuilt on the next query.
    pub fn update_memory_store(&mut self, name: &str, entries: Vec<ManifestEntry>) -> bool {
        let Some(store) = self
            .game_overlays
            .iter_mut()
            .find(|o| o.name == name && o.is_memory_store())
        else {
            return false;
        };
        store.entries = entries;
        self.memory_stores.index(store);
        self.has_changes = true;
        true
    }

    pub fn memory_store_by_name(&self, name: &str) -> Option<&Overlay> {
        self.game_overlays
            .iter()
            .find(|o| o.name == name && o.is_memory_store())
    }

    /// Memory stores declaring an entry of `kind` with this id.
    pub fn memory_stores_containing_entry(&self, kind: &str, id: &str) -> Vec<&Overlay> {
        self.memory_stores
            .stores_containing(kind, id)
            .iter()
            .filter_map(|name| self.memory_store_by_name(name))
            .collect()
    }

    /// Queues a mod overlay; takes effect on the next refresh.
    pub fn add_mod_addendum(&mut self, overlay: ModOverlay) {
        self.mod_overlays.push(overlay);
        self.has_changes = true;
    }

    /// Appends `entry` to the overlay named `overlay_name` on every refresh.
    pub fn add_override_entry(&mut self, overlay_name: impl Into<String>, entry: ManifestEntry) {
        self.overrides.entry(overlay_name.into()).or_default().push(entry);
        self.has_changes = true;
    }

    pub fn has_changes(&self) -> bool {
        self.has_changes
    }

    /// Rebuilds the layer if anything changed since the last rebuild.
    ///
    /// Returns `true` if a rebuild happened.
    pub fn refresh(&mut self) -> bool {
        if !self.has_changes {
            return false;
        }
        let begin = Instant::now();
        self.layer.reset(&self.base);

        for overlay in &self.game_overlays {
            let entries = with_overrides(overlay, &self.overrides);
            let gate = self.gate.as_ref();
            self.layer
                .apply_entries(&entries, |e| gate.is_resource_owned(&e.id));
            if gate.is_overlay_owned(&overlay.name) {
                self.layer.mark_active(&overlay.name);
            }
        }

        let available: BTreeSet<String> = self.layer.active_overlays().clone();
        for modded in &self.mod_overlays {
            let missing: Vec<&str> = modded
                .required
                .iter()
                .filter(|r| !available.contains(*r))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                tracing::debug!(
                    "Skipping overlay {}, missing required overlays: {}",
                    modded.overlay.name,
                    missing.join(", ")
                );
                continue;
            }
            let entries = with_overrides(&modded.overlay, &self.overrides);
            self.layer.apply_entries(&entries, |_| true);
            self.layer.mark_active(&modded.overlay.name);
        }

        self.has_changes = false;
        let elapsed = begin.elapsed();
        if elapsed.as_millis() > 100 {
            tracing::info!("Manifest recompute took {:.3}s", elapsed.as_secs_f64());
        } else {
            tracing::debug!("Manifest recompute took {:.3}s", elapsed.as_secs_f64());
        }
        true
    }

    /// The composed layer, rebuilt first if needed.
    pub fn layer(&mut self) -> &ManifestLayer {
        self.refresh();
        &self.layer
    }

    pub fn entry_by_id(&mut self, id: &str, kind: &str, filter_by_ownership: bool) -> Option<&ManifestEntry> {
        self.layer().get(id, kind, filter_by_ownership)
    }

    pub fn all_entries_of_kind(&mut self, kind: &str, filter_by_ownership: bool) -> Vec<&ManifestEntry> {
        self.layer().all_of_type(kind, filter_by_ownership)
    }

    pub fn all_entries(&mut self, filter_by_ownership: bool) -> Vec<&ManifestEntry> {
        self.layer().all_entries(filter_by_ownership)
    }

    pub fn entries_by_id(&mut self, id: &str) -> Vec<&ManifestEntry> {
        self.layer().entries_by_id(id)
    }

    pub fn string_entry(&mut self, id: &str) -> Option<&ManifestEntry> {
        self.layer().string_entry(id)
    }

    /// Entries of `kind` declared by the game overlay `overlay_name`, ignoring overrides.
    pub fn entries_of_kind_from_addendum(
        &self,
        kind: &str,
        overlay_name: &str,
        filter_by_ownership: bool,
    ) -> Vec<&ManifestEntry> {
        let Some(overlay) = self.addendum_by_name(overlay_name) else {
            return Vec::new();
        };
        overlay
            .entries_of_kind(kind)
            .filter(|e| !filter_by_ownership || self.gate.is_resource_owned(&e.id))
            .collect()
    }

    /// Writes every entry of the "all" view as manifest CSV.
    pub fn dump_to_disk(&mut self, path: &Utf8Path) -> Result<()> {
        let entries = self.all_entries(false);
        let count = entries.len();
        write_manifest_csv(path, entries)?;
        tracing::info!("Manifest: saved {} entries to {}", count, path);
        Ok(())
    }
}

fn with_overrides<'a>(
    overlay: &'a Overlay,
    overrides: &BTreeMap<String, Vec<ManifestEntry>>,
) -> Cow<'a, [ManifestEntry]> {
    match overrides.get(&overlay.name) {
        Some(extra) if !extra.is_empty() => {
            let mut entries = overlay.entries.clone();
            entries.extend(extra.iter().cloned());
            Cow::Owned(entries)
        }
        _ => Cow::Borrowed(&overlay.entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::ContentPackOwnership;

    fn entry(id: &str, kind: &str, path: &str) -> ManifestEntry {
        ManifestEntry::new(id, kind, path)
    }

    fn composer() -> ManifestComposer {
        ManifestComposer::new(vec![
            entry("mech_a", "MechDef", "base/mech_a.json"),
            entry("mech_b", "MechDef", "base/mech_b.json"),
        ])
    }

    #[test]
    fn test_precedence_base_game_mod() {
        let mut c = composer();
        c.apply_addendum(Overlay::new(
            "game_patch",
            vec![entry("mech_a", "MechDef", "patch/mech_a.json")],
        ));
        c.add_mod_addendum(ModOverlay::new(Overlay::new(
            "my_mod",
            vec![entry("mech_b", "MechDef", "mod/mech_b.json")],
        )));
        assert!(c.has_changes());

        assert_eq!(c.entry_by_id("mech_a", "MechDef", false).unwrap().path, "patch/mech_a.json");
        assert_eq!(c.entry_by_id("mech_b", "MechDef", false).unwrap().path, "mod/mech_b.json");
        assert!(!c.has_changes());
    }

    #[test]
    fn test_duplicate_game_overlay_ignored() {
        let mut c = composer();
        assert!(c.apply_addendum(Overlay::new("x", vec![entry("a", "T", "first.bin")])));
        assert!(!c.apply_addendum(Overlay::new("x", vec![entry("a", "T", "second.bin")])));
        assert_eq!(c.entry_by_id("a", "T", false).unwrap().path, "first.bin");

        assert!(c.remove_addendum("x"));
        assert!(!c.remove_addendum("x"));
        assert!(c.entry_by_id("a", "T", false).is_none());
    }

    #[test]
    fn test_overrides_are_appended() {
        let mut c = composer();
        c.apply_addendum(Overlay::new("patch", vec![entry("a", "T", "patch/a.bin")]));
        c.add_override_entry("patch", entry("a", "T", "override/a.bin"));
        c.add_override_entry("patch", entry("z", "T", "override/z.bin"));

        assert_eq!(c.entry_by_id("a", "T", false).unwrap().path, "override/a.bin");
        assert!(c.entry_by_id("z", "T", false).is_some());
        assert_eq!(c.addendum_by_name("patch").unwrap().entries.len(), 1);
    }

    #[test]
    fn test_mod_requirements_use_state_after_game_overlays() {
        let mut c = composer();
        c.set_ownership(ContentPackOwnership {
            owned_overlays: ["dlc_owned".to_string()].into(),
            unowned_resources: Default::default(),
        });
        c.apply_addendum(Overlay::new("dlc_owned", vec![]));
        c.apply_addendum(Overlay::new("dlc_unowned", vec![]));

        c.add_mod_addendum(
            ModOverlay::new(Overlay::new("needs_owned", vec![entry("x", "T", "x.bin")]))
                .requiring(["dlc_owned"]),
        );
        c.add_mod_addendum(
            ModOverlay::new(Overlay::new("needs_unowned", vec![entry("y", "T", "y.bin")]))
                .requiring(["dlc_unowned"]),
        );
        // requirements on other mod overlays never pass
        c.add_mod_addendum(
            ModOverlay::new(Overlay::new("needs_mod", vec![entry("z", "T", "z.bin")]))
                .requiring(["needs_owned"]),
        );

        assert!(c.entry_by_id("x", "T", false).is_some());
        assert!(c.entry_by_id("y", "T", false).is_none());
        assert!(c.entry_by_id("z", "T", false).is_none());

        // becomes eligible once ownership changes
        c.set_ownership(OwnAll);
        assert!(c.entry_by_id("y", "T", false).is_some());
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let mut c = composer();
        assert!(c.apply_memory_store(Overlay::new(
            "runtime",
            vec![entry("mech_a", "MechDef", "mem/mech_a.json"), entry("w", "WeaponDef", "mem/w.json")],
        )));
        assert!(!c.apply_memory_store(Overlay::memory_store("runtime", vec![])));
        assert!(c.memory_store_by_name("runtime").unwrap().is_memory_store());
        assert_eq!(c.entry_by_id("mech_a", "MechDef", false).unwrap().path, "mem/mech_a.json");
        assert_eq!(c.memory_stores_containing_entry("MechDef", "mech_a").len(), 1);
        assert!(c.memory_stores_containing_entry("MechDef", "mech_b").is_empty());

        assert!(c.update_memory_store("runtime", vec![entry("mech_b", "MechDef", "mem/mech_b.json")]));
        assert!(c.has_changes());
        assert_eq!(c.entry_by_id("mech_a", "MechDef", false).unwrap().path, "base/mech_a.json");
        assert_eq!(c.entry_by_id("mech_b", "MechDef", false).unwrap().path, "mem/mech_b.json");
        assert!(c.entry_by_id("w", "WeaponDef", false).is_none());
        assert!(c.memory_stores_containing_entry("MechDef", "mech_a").is_empty());
        assert_eq!(c.memory_stores_containing_entry("MechDef", "mech_b")[0].name, "runtime");

        assert!(c.remove_memory_store("runtime"));
        assert!(!c.remove_memory_store("runtime"));
        assert!(c.memory_store_by_name("runtime").is_none());
        assert!(c.memory_stores_containing_entry("MechDef", "mech_b").is_empty());
        assert_eq!(c.entry_by_id("mech_b", "MechDef", false).unwrap().path, "base/mech_b.json");
    }

    #[test]
    fn test_plain_addenda_are_not_memory_stores() {
        let mut c = composer();
        c.apply_addendum(Overlay::new("patch", vec![entry("a", "T", "a.bin")]));
        assert!(c.memory_store_by_name("patch").is_none());
        assert!(!c.remove_memory_store("patch"));
        assert!(!c.update_memory_store("patch", vec![]));
        assert!(!c.apply_memory_store(Overlay::memory_store("patch", vec![])));
        assert!(c.memory_stores_containing_entry("T", "a").is_empty());
    }

    #[test]
    fn test_unowned_resources_stay_out_of_owned_view() {
        let mut c = composer();
        c.set_ownership(ContentPackOwnership {
            owned_overlays: Default::default(),
            unowned_resources: ["mech_a".to_string()].into(),
        });
        c.apply_addendum(Overlay::new(
            "dlc",
            vec![
                entry("mech_a", "MechDef", "dlc/mech_a.json"),
                entry("mech_c", "MechDef", "dlc/mech_c.json"),
            ],
        ));

        assert_eq!(c.entry_by_id("mech_a", "MechDef", false).unwrap().path, "dlc/mech_a.json");
        assert_eq!(c.entry_by_id("mech_a", "MechDef", true).unwrap().path, "base/mech_a.json");
        assert_eq!(c.entries_of_kind_from_addendum("MechDef", "dlc", true).len(), 1);
        assert_eq!(c.entries_of_kind_from_addendum("MechDef", "dlc", false).len(), 2);
        assert!(c.entries_of_kind_from_addendum("MechDef", "nope", false).is_empty());
    }
}

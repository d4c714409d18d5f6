//! Reverse index from (type, id) to the memory stores declaring that entry.

use crate::overlay::Overlay;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryStoreIndex {
    by_entry: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl MemoryStoreIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes the current entries of `store`, dropping whatever was indexed
    /// for it before.
    pub fn index(&mut self, store: &Overlay) {
        self.unindex(&store.name);
        for entry in &store.entries {
            let stores = self
                .by_entry
                .entry(entry.kind.clone())
                .or_default()
                .entry(entry.id.clone())
                .or_default();
            if !stores.contains(&store.name) {
                stores.push(store.name.clone());
            }
        }
    }

    /// Removes every index entry pointing at the store named `name`.
    ///
    /// Returns `true` if anything was removed.
    pub fn unindex(&mut self, name: &str) -> bool {
        let mut removed = false;
        for ids in self.by_entry.values_mut() {
            for stores in ids.values_mut() {
                let before = stores.len();
                stores.retain(|s| s != name);
                removed |= stores.len() != before;
            }
            ids.retain(|_, stores| !stores.is_empty());
        }
        self.by_entry.retain(|_, ids| !ids.is_empty());
        removed
    }

    /// Names of the stores declaring (kind, id), in the order they were indexed.
    pub fn stores_containing(&self, kind: &str, id: &str) -> &[String] {
        self.by_entry
            .get(kind)
            .and_then(|ids| ids.get(id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entry.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ManifestEntry;

    fn store(name: &str, ids: &[(&str, &str)]) -> Overlay {
        Overlay::memory_store(
            name,
            ids.iter()
                .map(|(id, kind)| ManifestEntry::new(*id, *kind, ""))
                .collect(),
        )
    }

    #[test]
    fn test_index_by_type_and_id() {
        let mut index = MemoryStoreIndex::new();
        index.index(&store("a", &[("mech_1", "MechDef"), ("mech_1", "ChassisDef")]));
        index.index(&store("b", &[("mech_1", "MechDef")]));

        assert_eq!(index.stores_containing("MechDef", "mech_1"), ["a", "b"]);
        assert_eq!(index.stores_containing("ChassisDef", "mech_1"), ["a"]);
        assert!(index.stores_containing("MechDef", "mech_2").is_empty());
        assert!(index.stores_containing("WeaponDef", "mech_1").is_empty());
    }

    #[test]
    fn test_reindex_replaces_previous_contents() {
        let mut index = MemoryStoreIndex::new();
        index.index(&store("a", &[("x", "T"), ("y", "T")]));
        index.index(&store("a", &[("z", "T")]));

        assert!(index.stores_containing("T", "x").is_empty());
        assert!(index.stores_containing("T", "y").is_empty());
        assert_eq!(index.stores_containing("T", "z"), ["a"]);
    }

    #[test]
    fn test_unindex_removes_every_entry() {
        let mut index = MemoryStoreIndex::new();
        index.index(&store("a", &[("x", "T"), ("y", "U")]));
        assert!(index.unindex("a"));
        assert!(!index.unindex("a"));
        assert!(index.is_empty());
    }
}

//! Overlays (addenda) and ownership gating.

use crate::entry::ManifestEntry;
use std::collections::BTreeSet;

/// Where an overlay's entries come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayKind {
    /// A fixed list, usually read from disk.
    #[default]
    Addendum,
    /// Built in memory; its entries may be replaced after it was applied.
    MemoryStore,
}

/// A named batch of entries applied on top of the base manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Overlay {
    pub name: String,
    pub entries: Vec<ManifestEntry>,
    pub kind: OverlayKind,
}

impl Overlay {
    pub fn new(name: impl Into<String>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
            kind: OverlayKind::Addendum,
        }
    }

    pub fn memory_store(name: impl Into<String>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            kind: OverlayKind::MemoryStore,
            ..Self::new(name, entries)
        }
    }

    pub fn is_memory_store(&self) -> bool {
        self.kind == OverlayKind::MemoryStore
    }

    /// Entries of `kind` in this overlay.
    pub fn entries_of_kind<'a, 'k>(&'a self, kind: &'k str) -> impl Iterator<Item = &'a ManifestEntry> + 'k
    where
        'a: 'k,
    {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

/// An overlay contributed by a mod, applied only when every required
/// overlay is active and owned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModOverlay {
    pub overlay: Overlay,
    pub required: Vec<String>,
}

impl ModOverlay {
    pub fn new(overlay: Overlay) -> Self {
        Self {
            overlay,
            required: Vec::new(),
        }
    }

    pub fn requiring(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Decides which resources and overlays the player owns (purchased content).
pub trait OwnershipGate {
    fn is_resource_owned(&self, id: &str) -> bool;
    fn is_overlay_owned(&self, name: &str) -> bool;
}

/// Owns everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnAll;

impl OwnershipGate for OwnAll {
    fn is_resource_owned(&self, _id: &str) -> bool {
        true
    }

    fn is_overlay_owned(&self, _name: &str) -> bool {
        true
    }
}

/// Ownership from explicit sets of owned overlay names and unowned resource ids.
#[derive(Debug, Clone, Default)]
pub struct ContentPackOwnership {
    pub owned_overlays: BTreeSet<String>,
    pub unowned_resources: BTreeSet<String>,
}

impl OwnershipGate for ContentPackOwnership {
    fn is_resource_owned(&self, id: &str) -> bool {
        !self.unowned_resources.contains(id)
    }

    fn is_overlay_owned(&self, name: &str) -> bool {
        self.owned_overlays.contains(name)
    }
}

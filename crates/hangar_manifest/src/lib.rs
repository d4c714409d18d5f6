//! Layered resource manifest for the Hangar mod loader.
//!
//! The game resolves resources by (type, id) through a manifest. Mods and
//! downloadable content extend it with overlays; [`ManifestComposer`] folds
//! them in a fixed order into a [`ManifestLayer`] that answers lookups for
//! both the full and the ownership-filtered view.

pub mod composer;
pub mod entry;
pub mod error;
pub mod layer;
pub mod memory_store;
pub mod overlay;

pub use composer::ManifestComposer;
pub use entry::{parse_manifest_csv, read_manifest_csv, to_manifest_csv, write_manifest_csv, ManifestEntry};
pub use error::{Error, Result};
pub use layer::ManifestLayer;
pub use memory_store::MemoryStoreIndex;
pub use overlay::{ContentPackOwnership, ModOverlay, OverlayKind, OwnAll, OwnershipGate, Overlay};

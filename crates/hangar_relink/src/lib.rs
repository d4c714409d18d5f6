//! Managed module rewriting for the Hangar mod loader.
//!
//! This crate decides whether the game's managed modules need to be rewritten
//! at startup and, if so, runs the rewrite pass:
//!
//! - **Fingerprint**: [`InjectionCacheManifest`] skips the pass when nothing
//!   it reads or writes has changed
//! - **Module store**: [`AssemblyStore`] resolves modules by name with a
//!   per-directory write policy and tracks what was modified
//! - **Shims**: [`ShimSet`] relinks modules built against older revisions of
//!   the patch library to the matching shim module
//! - **Rewrite pass**: [`RewriteEngine`] runs registered [`RewriteStep`]s
//!
//! # Example
//!
//! ```no_run
//! use hangar_core::GameLayout;
//! use hangar_relink::{RelinkModules, RewriteEngine, RewriteRegistry, ShimSet};
//!
//! # fn main() -> hangar_relink::Result<()> {
//! let layout = GameLayout::new("C:/Games/BATTLETECH");
//! let shims = ShimSet::load(&layout.lib_dir)?;
//!
//! let mut registry = RewriteRegistry::new();
//! registry.register_builtin(
//!     "relink",
//!     RelinkModules::new(shims, vec!["Assembly-CSharp".to_string()]),
//! );
//!
//! let report = RewriteEngine::new(layout, registry).run_if_stale()?;
//! println!("saved {} modules", report.saved_modules.len());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod module;
pub mod shim;
pub mod shim_cache;
pub mod store;

pub use engine::{RewriteEngine, RewriteRegistry, RewriteReport, RewriteStep};
pub use error::{Error, Result};
pub use fingerprint::{compute_fingerprint, FingerprintEntry, InjectionCacheManifest};
pub use module::{ModuleImage, ModuleReference, ModuleVersion};
pub use shim::{RelinkDecision, RelinkModules, ShimSet, ShimVersionRange, SUPPORTED_SHIMS};
pub use shim_cache::ShimCache;
pub use store::{AssemblyCandidate, AssemblyStore, CandidateTable, ModuleResolver};

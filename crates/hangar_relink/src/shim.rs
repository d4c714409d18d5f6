//! Patch-library version detection and shim relinking.
//!
//! Mods are compiled against one of several major revisions of the patch
//! library. Only the latest revision is loaded under the canonical name; older
//! revisions are served by shim modules that live in the privileged library
//! directory. Relinking rewrites a module's reference to the canonical name so
//! it points at the matching shim instead.

use crate::engine::RewriteStep;
use crate::error::{Error, Result};
use crate::module::{ModuleImage, ModuleVersion};
use crate::store::ModuleResolver;
use camino::Utf8Path;
use hangar_core::MODULE_EXTENSION;
use std::fmt;
use std::time::{Duration, Instant};

/// Module name the patch library is referenced by.
pub const PATCH_LIBRARY: &str = "0Harmony";

/// Dynamically generated modules that are never relinked.
const SKIPPED_PREFIX: &str = "DMDASM.";
const SKIPPED_NAME: &str = "MonoMod.Utils.GetManagedSizeHelper";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpperBound {
    Inclusive(ModuleVersion),
    Exclusive(ModuleVersion),
}

/// One supported major revision of the patch library and the module serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShimVersionRange {
    pub name: &'static str,
    pub lower: ModuleVersion,
    pub upper: UpperBound,
}

impl ShimVersionRange {
    pub const fn new(name: &'static str, lower: ModuleVersion, upper_exclusive: ModuleVersion) -> Self {
        Self {
            name,
            lower,
            upper: UpperBound::Exclusive(upper_exclusive),
        }
    }

    pub fn contains(&self, version: ModuleVersion) -> bool {
        let below_upper = match self.upper {
            UpperBound::Inclusive(upper) => version <= upper,
            UpperBound::Exclusive(upper) => version < upper,
        };
        self.lower <= version && below_upper
    }

    /// The unshimmed latest revision.
    pub fn is_canonical(&self) -> bool {
        self.name == PATCH_LIBRARY
    }
}

impl fmt::Display for ShimVersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            UpperBound::Inclusive(upper) => write!(f, "{}@[{},{}]", self.name, self.lower, upper),
            UpperBound::Exclusive(upper) => write!(f, "{}@[{},{})", self.name, self.lower, upper),
        }
    }
}

const fn v(major: u16, minor: u16) -> ModuleVersion {
    ModuleVersion::new(major, minor, 0, 0)
}

/// Supported revisions, checked in order.
pub const SUPPORTED_SHIMS: [ShimVersionRange; 4] = [
    // oldest revision, used by a handful of mods
    ShimVersionRange::new("0Harmony109", v(1, 0), v(1, 1)),
    // revision shipped with the game
    ShimVersionRange::new("0Harmony12", v(1, 1), v(1, 3)),
    ShimVersionRange::new("0Harmony20", v(2, 0), v(2, 1)),
    // later 2.x releases are compatible with each other
    ShimVersionRange::new(PATCH_LIBRARY, v(2, 1), v(2, 99)),
];

/// Outcome of inspecting one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelinkDecision {
    /// The module does not reference the patch library.
    NoReference,
    /// No supported range holds the referenced version.
    Incompatible(ModuleVersion),
    /// The reference already resolves to the canonical revision.
    Canonical,
    /// The reference must be renamed to `shim`.
    Relink {
        shim: &'static str,
        version: ModuleVersion,
    },
}

/// A verified, ordered set of shim ranges.
#[derive(Debug, Clone)]
pub struct ShimSet {
    ranges: Vec<ShimVersionRange>,
}

impl ShimSet {
    /// Uses `ranges` as given, without the library self-check.
    pub fn unverified(ranges: Vec<ShimVersionRange>) -> Self {
        Self { ranges }
    }

    /// Loads [`SUPPORTED_SHIMS`] and verifies them against `lib_dir`.
    pub fn load(lib_dir: &Utf8Path) -> Result<Self> {
        Self::verify(SUPPORTED_SHIMS.to_vec(), lib_dir)
    }

    /// Checks that every shim module exists in `lib_dir` and declares a version
    /// inside the range it stands for. Any failure is fatal.
    pub fn verify(ranges: Vec<ShimVersionRange>, lib_dir: &Utf8Path) -> Result<Self> {
        tracing::info!("Verifying patch library shims at {}", lib_dir);
        for range in &ranges {
            let path = lib_dir.join(format!("{}.{}", range.name, MODULE_EXTENSION));
            if !path.exists() {
                return Err(Error::ShimMissing {
                    name: range.name.to_string(),
                    path,
                });
            }
            let image = ModuleImage::load(&path)?;
            if !range.contains(image.version) {
                return Err(Error::ShimSelfCheck {
                    name: range.name.to_string(),
                    version: image.version.to_string(),
                    range: range.to_string(),
                });
            }
            tracing::debug!("Shim {} ok ({})", range, image.version);
        }
        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[ShimVersionRange] {
        &self.ranges
    }

    pub fn classify(&self, module: &ModuleImage) -> RelinkDecision {
        let Some(reference) = module.reference(PATCH_LIBRARY) else {
            return RelinkDecision::NoReference;
        };
        let version = reference.version;
        match self.ranges.iter().find(|r| r.contains(version)) {
            None => RelinkDecision::Incompatible(version),
            Some(range) if range.is_canonical() => RelinkDecision::Canonical,
            Some(range) => RelinkDecision::Relink {
                shim: range.name,
                version,
            },
        }
    }

    /// Renames the module's patch library reference to the matching shim.
    ///
    /// Returns `true` if the reference was rewritten. A module without a
    /// compatible shim is logged and left alone.
    pub fn detect_and_relink(&self, module: &mut ModuleImage) -> bool {
        match self.classify(module) {
            RelinkDecision::NoReference | RelinkDecision::Canonical => false,
            RelinkDecision::Incompatible(version) => {
                tracing::warn!(
                    "Module {} has no compatible shim to be relinked to for {} {}.",
                    module.name,
                    PATCH_LIBRARY,
                    version
                );
                false
            }
            RelinkDecision::Relink { shim, version } => {
                tracing::info!(
                    "Module {} using {}@{} is being relinked to {}.",
                    module.name,
                    PATCH_LIBRARY,
                    version,
                    shim
                );
                match module.reference_mut(PATCH_LIBRARY) {
                    Some(reference) => {
                        reference.name = shim.to_string();
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Relinks a module held in memory, replacing `buffer` on success.
    ///
    /// Returns how long the rewrite took, or `None` if the buffer was left as is.
    pub fn shim_buffer(&self, buffer: &mut Vec<u8>) -> Result<Option<Duration>> {
        let mut module = ModuleImage::from_bytes(buffer)?;
        if module.name.starts_with(SKIPPED_PREFIX) || module.name == SKIPPED_NAME {
            return Ok(None);
        }

        let begin = Instant::now();
        if !self.detect_and_relink(&mut module) {
            return Ok(None);
        }
        *buffer = module.to_bytes()?;

        let elapsed = begin.elapsed();
        tracing::info!(
            "Loading shimmed module {} from memory, shimming took {:.3}s.",
            module.name,
            elapsed.as_secs_f64()
        );
        Ok(Some(elapsed))
    }
}

/// Built-in rewrite step: opens each listed module for writing and relinks it.
///
/// Modules that do not exist are logged and skipped.
#[derive(Debug, Clone)]
pub struct RelinkModules {
    shims: ShimSet,
    modules: Vec<String>,
}

impl RelinkModules {
    pub fn new(shims: ShimSet, modules: Vec<String>) -> Self {
        Self { shims, modules }
    }
}

impl RewriteStep for RelinkModules {
    fn apply(&self, resolver: &mut dyn ModuleResolver) -> Result<()> {
        for name in &self.modules {
            // peek first so modules that need nothing are not marked dirty
            let decision = match resolver.resolve(name) {
                Ok(module) => self.shims.classify(module),
                Err(Error::Resolution(_)) => {
                    tracing::warn!("Relink target {} not found, skipping", name);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if matches!(decision, RelinkDecision::Relink { .. }) {
                let module = resolver.resolve_mut(name)?;
                self.shims.detect_and_relink(module);
            }
        }
        Ok(())
    }
}

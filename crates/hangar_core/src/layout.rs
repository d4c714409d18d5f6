//! Game directory layout and detection.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// File extension of managed modules.
pub const MODULE_EXTENSION: &str = "dll";

/// Every directory and state file the loader touches, derived from one game directory.
///
/// The layout is split into the loader's own install (`Mods/Hangar`) which is
/// maintained by users, and the state directory (`Mods/.hangar`) which is
/// owned by the loader and may be wiped at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLayout {
    pub game_dir: Utf8PathBuf,
    pub managed_dir: Utf8PathBuf,
    pub mods_dir: Utf8PathBuf,

    pub loader_dir: Utf8PathBuf,
    /// Privileged library directory; modules here are never opened for writing.
    pub lib_dir: Utf8PathBuf,
    pub injectors_dir: Utf8PathBuf,
    pub override_dir: Utf8PathBuf,
    pub config_file: Utf8PathBuf,

    pub state_dir: Utf8PathBuf,
    pub injected_dir: Utf8PathBuf,
    pub injection_manifest_file: Utf8PathBuf,
    pub shimmed_dir: Utf8PathBuf,
    pub shim_manifest_file: Utf8PathBuf,
    pub merge_cache_dir: Utf8PathBuf,
    pub merge_cache_file: Utf8PathBuf,
    pub logs_dir: Utf8PathBuf,
}

impl GameLayout {
    pub fn new(game_dir: impl Into<Utf8PathBuf>) -> Self {
        let game_dir = game_dir.into();
        let managed_dir = game_dir.join("BattleTech_Data").join("Managed");
        let mods_dir = game_dir.join("Mods");

        let loader_dir = mods_dir.join("Hangar");
        let state_dir = mods_dir.join(".hangar");
        let injected_dir = state_dir.join("AssembliesInjected");
        let shimmed_dir = state_dir.join("AssembliesShimmed");

        Self {
            lib_dir: loader_dir.join("lib"),
            injectors_dir: loader_dir.join("Injectors"),
            override_dir: loader_dir.join("AssembliesOverride"),
            config_file: loader_dir.join(crate::CONFIG_FILE_NAME),
            injection_manifest_file: injected_dir.join("_Manifest.csv"),
            shim_manifest_file: shimmed_dir.join("_Manifest.csv"),
            merge_cache_dir: state_dir.join("MergeCache"),
            merge_cache_file: state_dir.join("merge_cache.json"),
            logs_dir: state_dir.join("logs"),
            game_dir,
            managed_dir,
            mods_dir,
            loader_dir,
            state_dir,
            injected_dir,
            shimmed_dir,
        }
    }

    /// Like [`GameLayout::new`] but rejects directories that are not a game install.
    pub fn open(game_dir: impl Into<Utf8PathBuf>) -> Result<Self> {
        let game_dir = game_dir.into();
        if !is_valid_game_dir(&game_dir) {
            return Err(Error::InvalidGameDir(game_dir));
        }
        Ok(Self::new(game_dir))
    }

    /// Path of `path` relative to the game directory, with `/` separators.
    ///
    /// Paths outside the game directory are returned unchanged.
    pub fn relative_to_game(&self, path: &Utf8Path) -> String {
        relative_forward(&self.game_dir, path)
    }

    /// Path of `path` relative to the mods directory, with `/` separators.
    pub fn relative_to_mods(&self, path: &Utf8Path) -> String {
        relative_forward(&self.mods_dir, path)
    }

    /// Module search order: override first, then privileged lib, then the game's own managed code.
    pub fn module_search_dirs(&self) -> [&Utf8Path; 3] {
        [&self.override_dir, &self.lib_dir, &self.managed_dir]
    }
}

fn relative_forward(root: &Utf8Path, path: &Utf8Path) -> String {
    path.strip_prefix(root)
        .map(|rel| rel.as_str())
        .unwrap_or(path.as_str())
        .replace('\\', "/")
}

/// Checks whether `dir` looks like a game install (has `BattleTech_Data/Managed`).
pub fn is_valid_game_dir(dir: &Utf8Path) -> bool {
    dir.join("BattleTech_Data").join("Managed").is_dir()
}

/// Walks up from `start` until a valid game directory is found.
pub fn detect_game_dir(start: &Utf8Path) -> Option<Utf8PathBuf> {
    start
        .ancestors()
        .find(|dir| is_valid_game_dir(dir))
        .map(Utf8Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn test_layout_paths() {
        let layout = GameLayout::new("/games/BATTLETECH");
        assert_eq!(
            layout.managed_dir,
            Utf8PathBuf::from("/games/BATTLETECH/BattleTech_Data/Managed")
        );
        assert_eq!(
            layout.injection_manifest_file,
            Utf8PathBuf::from("/games/BATTLETECH/Mods/.hangar/AssembliesInjected/_Manifest.csv")
        );
        assert_eq!(
            layout.config_file,
            Utf8PathBuf::from("/games/BATTLETECH/Mods/Hangar/hangar.toml")
        );
        let dirs = layout.module_search_dirs();
        assert_eq!(dirs[0], layout.override_dir);
        assert_eq!(dirs[2], layout.managed_dir);
    }

    #[test]
    fn test_relative_paths() {
        let layout = GameLayout::new("/games/bt");
        assert_eq!(
            layout.relative_to_game(Utf8Path::new("/games/bt/Mods/Hangar/lib/a.dll")),
            "Mods/Hangar/lib/a.dll"
        );
        assert_eq!(
            layout.relative_to_mods(Utf8Path::new("/games/bt/Mods/MyMod/mech.json")),
            "MyMod/mech.json"
        );
        assert_eq!(
            layout.relative_to_game(Utf8Path::new("/elsewhere/x.dll")),
            "/elsewhere/x.dll"
        );
    }

    #[test]
    fn test_detect_game_dir() {
        let dir = tempdir().unwrap();
        let root = utf8(dir.path());
        std::fs::create_dir_all(root.join("BattleTech_Data/Managed")).unwrap();
        let nested = root.join("Mods/SomeMod");
        std::fs::create_dir_all(&nested).unwrap();

        assert!(is_valid_game_dir(&root));
        assert_eq!(detect_game_dir(&nested), Some(root.clone()));
        assert!(GameLayout::open(root).is_ok());
    }

    #[test]
    fn test_open_rejects_non_game_dir() {
        let dir = tempdir().unwrap();
        let root = utf8(dir.path());
        assert!(matches!(
            GameLayout::open(root),
            Err(Error::InvalidGameDir(_))
        ));
    }
}

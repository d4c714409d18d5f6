use crate::errors::CliError;
use camino::Utf8PathBuf;
use hangar_core::GameLayout;
use hangar_relink::{ShimCache, ShimSet};
use miette::Result;

pub struct ShimArgs {
    pub file: String,
}

/// Prints the path the game should load for `args.file`, shimmed if needed.
pub fn shim_module(layout: &GameLayout, args: ShimArgs) -> Result<()> {
    let file = Utf8PathBuf::from(args.file);
    let absolute = if file.is_absolute() {
        file.clone()
    } else {
        layout.game_dir.join(&file)
    };
    if !absolute.exists() {
        return Err(CliError::file_not_found(absolute).into());
    }

    let shims = ShimSet::load(&layout.lib_dir).map_err(CliError::relink)?;
    let mut cache = ShimCache::open(layout, shims).map_err(CliError::relink)?;
    println!("{}", cache.shimmed_path_for(&file));
    Ok(())
}

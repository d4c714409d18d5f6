use crate::utils::print_path_status;
use colored::Colorize;
use hangar_core::GameLayout;
use hangar_relink::InjectionCacheManifest;
use miette::Result;

pub fn show_status(layout: &GameLayout) -> Result<()> {
    println!();
    print_path_status("game_dir", &layout.game_dir);
    print_path_status("managed_dir", &layout.managed_dir);
    print_path_status("mods_dir", &layout.mods_dir);
    print_path_status("lib_dir", &layout.lib_dir);
    print_path_status("injectors_dir", &layout.injectors_dir);
    print_path_status("override_dir", &layout.override_dir);
    print_path_status("injected_dir", &layout.injected_dir);
    print_path_status("merge_cache", &layout.merge_cache_file);
    println!();

    match InjectionCacheManifest::load(layout) {
        Ok(manifest) if manifest.is_up_to_date() => {
            println!("  {} {}", "injection:".bright_white(), "up to date".bright_green());
        }
        Ok(_) => {
            println!(
                "  {} {}",
                "injection:".bright_white(),
                "outdated, run `hangar inject`".bright_yellow()
            );
        }
        Err(e) => {
            println!("  {} {}", "injection:".bright_white(), format!("unknown ({e})").bright_red());
        }
    }
    println!();
    Ok(())
}

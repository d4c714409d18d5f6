use crate::println_pad;
use colored::Colorize;
use hangar_core::{GameLayout, HangarConfig};
use miette::{IntoDiagnostic, Result};

pub fn show_config(layout: &GameLayout, config: &HangarConfig) -> Result<()> {
    let status = if layout.config_file.exists() {
        "✓".bright_green()
    } else {
        "✗".bright_red()
    };

    println!();
    println!(
        "  {} {} {}",
        "config_file:".bright_white(),
        layout.config_file,
        status
    );
    println!();
    println_pad!("{}", toml::to_string_pretty(config).into_diagnostic()?);
    println!();
    Ok(())
}

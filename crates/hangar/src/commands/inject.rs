use crate::errors::CliError;
use crate::println_pad;
use colored::Colorize;
use hangar_core::{GameLayout, HangarConfig};
use hangar_relink::{RelinkModules, RewriteEngine, RewriteRegistry, ShimSet};
use miette::Result;

pub struct InjectArgs {
    pub force: bool,
}

/// Runs the rewrite pass with the built-in steps enabled in `config`.
pub fn inject_modules(layout: &GameLayout, config: &HangarConfig, args: InjectArgs) -> Result<()> {
    let mut registry = RewriteRegistry::new();
    if config.relink.enabled {
        let shims = ShimSet::load(&layout.lib_dir).map_err(CliError::relink)?;
        registry.register_builtin("relink", RelinkModules::new(shims, config.relink.modules.clone()));
    } else {
        tracing::info!("Shim relinking is disabled");
    }

    let engine = RewriteEngine::new(layout.clone(), registry);
    let report = if args.force {
        engine.run()
    } else {
        engine.run_if_stale()
    }
    .map_err(CliError::relink)?;

    if report.up_to_date {
        println!("{}", "✓ Modules are up to date, nothing to do".bright_green().bold());
        return Ok(());
    }

    println!("{}", "✓ Rewrite pass finished".bright_green().bold());
    println!();
    println_pad!("{} {}", "Steps run:".bright_white().bold(), report.steps_run.join(", "));
    println_pad!("{} {}", "Modules opened:".bright_white().bold(), report.opened_modules.len());
    for path in &report.saved_modules {
        println_pad!("   {} {}", "•".bright_cyan(), path.as_str().bright_cyan());
    }
    for path in &report.skipped_injectors {
        println_pad!("   {} {} {}", "•".bright_yellow(), path, "(skipped)".dimmed());
    }
    Ok(())
}

use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{
    inject_modules, merge_documents, shim_module, show_config, show_status, InjectArgs, MergeArgs, ShimArgs,
};
use hangar_core::HangarConfig;
use miette::Result;

mod commands;
mod errors;
mod logging;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The game directory. Detected from the working directory when omitted.
    #[arg(long, global = true)]
    game_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the loader layout and whether the rewrite pass is up to date
    Status,
    /// Run the module rewrite pass
    Inject {
        /// Run even when the injection fingerprint is current
        #[arg(short, long)]
        force: bool,
    },
    /// Print the path the game should load for a module file
    Shim {
        /// The module file, absolute or relative to the game directory
        file: String,
    },
    /// Merge JSON contributions into a base document
    Merge {
        /// The document to merge into
        #[arg(short, long)]
        base: String,

        /// Resource type used to pick advanced merges that target it
        #[arg(short = 't', long = "type")]
        kind: Option<String>,

        /// Resource id used to pick advanced merges that target it
        #[arg(short, long)]
        id: Option<String>,

        /// Write the result here instead of printing it
        #[arg(short, long)]
        output: Option<String>,

        /// Contribution files, applied in order
        #[arg(required = true)]
        contributions: Vec<String>,
    },
    /// Show the effective loader configuration
    Config,
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(e) => e.exit(),
    }
}

fn main() -> Result<()> {
    let args = parse_args();

    let layout = utils::resolve_layout(args.game_dir.as_deref())?;
    let config = HangarConfig::load_or_create(&layout.config_file);
    let _log_guard = logging::init_logging(&layout.logs_dir, &config.log.filter);

    match args.command {
        Commands::Status => show_status(&layout),
        Commands::Inject { force } => inject_modules(&layout, &config, InjectArgs { force }),
        Commands::Shim { file } => shim_module(&layout, ShimArgs { file }),
        Commands::Merge {
            base,
            kind,
            id,
            output,
            contributions,
        } => merge_documents(MergeArgs {
            base,
            kind,
            id,
            output,
            contributions,
        }),
        Commands::Config => show_config(&layout, &config),
    }
}

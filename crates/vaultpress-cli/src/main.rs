//! CLI entry point: convert a notes vault into a Hugo site, once or on every change.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;
use vaultpress_core::{
    analyze_vault, app_data_dir, convert, load_config, load_config_from, save_config,
    ChangeMonitor, ConversionConfig, ConversionStats, MonitorExit,
};

#[derive(Parser)]
#[command(name = "vaultpress", version)]
#[command(about = "Convert a markdown notes vault into a Hugo (PaperMod) site")]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Convert the vault once.
    Convert {
        #[command(flatten)]
        paths: PathArgs,
        #[command(flatten)]
        features: FeatureArgs,
        /// Print the statistics as JSON.
        #[arg(long)]
        json: bool,
        /// Remember these settings as the defaults for later runs.
        #[arg(long)]
        save_config: bool,
    },
    /// Convert once, then re-convert whenever a note changes.
    Watch {
        #[command(flatten)]
        paths: PathArgs,
    },
    /// List the tags and links used in a vault.
    Analyze {
        /// Vault directory.
        #[arg(short = 'i', long = "obsidian-vault", value_name = "PATH")]
        vault: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show where vaultpress keeps its saved config.
    DataDir,
}

#[derive(Args)]
struct PathArgs {
    /// Vault directory.
    #[arg(short = 'i', long = "obsidian-vault", value_name = "PATH")]
    vault: Option<PathBuf>,
    /// Hugo content directory.
    #[arg(short = 'c', long)]
    hugo_content: Option<PathBuf>,
    /// Hugo static directory (attachments).
    #[arg(short = 's', long)]
    hugo_static: Option<PathBuf>,
    /// Hugo archetypes directory.
    #[arg(short = 'a', long)]
    hugo_archetypes: Option<PathBuf>,
    /// Hugo theme name.
    #[arg(short = 't', long)]
    theme: Option<String>,
    /// Include pattern (repeatable).
    #[arg(long = "include", value_name = "GLOB")]
    include: Vec<String>,
    /// Exclude pattern (repeatable).
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
    /// Load settings from this TOML file instead of the saved config.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct FeatureArgs {
    /// Attachment extension to copy (repeatable; replaces the default list).
    #[arg(long = "attachment-ext", value_name = "EXT")]
    attachment_extensions: Vec<String>,
    #[arg(long)]
    no_wikilinks: bool,
    /// Keep inline #tags in the body.
    #[arg(long)]
    no_tags: bool,
    #[arg(long)]
    no_attachments: bool,
    #[arg(long)]
    no_toc: bool,
    #[arg(long)]
    toc_max_depth: Option<u32>,
    /// Drop the notes' own front matter fields.
    #[arg(long)]
    no_front_matter: bool,
    /// Worker threads for converting notes.
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Convert {
            paths,
            features,
            json,
            save_config: save,
        } => {
            let mut config = base_config(&paths)?;
            apply_paths(&mut config, paths);
            apply_features(&mut config, features);
            if save {
                let path = save_config(&config)?;
                tracing::info!(path = %path.display(), "saved config");
            }
            let stats = convert(&config)?;
            print_stats(&stats, json)?;
        }
        Commands::Watch { paths } => {
            let mut config = base_config(&paths)?;
            apply_paths(&mut config, paths);
            print_stats(&convert(&config)?, false)?;

            let monitor = ChangeMonitor::start(config, |result| match result {
                Ok(stats) => println!("{stats}"),
                Err(e) => eprintln!("Conversion failed: {e}"),
            })?;
            println!("Watching for changes... Press Ctrl+C to stop");
            if let MonitorExit::Failed(e) = monitor.wait() {
                return Err(e.into());
            }
        }
        Commands::Analyze { vault, json } => {
            let analysis = analyze_vault(&vault)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                println!("Vault: {}", analysis.vault_path.display());
                println!("  files:        {}", analysis.total_files);
                println!("  unique tags:  {}", analysis.tags.len());
                println!("  unique links: {}", analysis.links.len());
                if !analysis.tags.is_empty() {
                    let tags: Vec<&str> = analysis.tags.iter().map(String::as_str).collect();
                    println!("Tags: {}", tags.join(", "));
                }
                if !analysis.links.is_empty() {
                    let links: Vec<&str> = analysis.links.iter().map(String::as_str).collect();
                    println!("Links: {}", links.join(", "));
                }
            }
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
    }
    Ok(())
}

/// Saved (or explicitly given) config, before command-line overrides.
fn base_config(paths: &PathArgs) -> Result<ConversionConfig, Box<dyn std::error::Error>> {
    Ok(match &paths.config {
        Some(file) => load_config_from(file)?,
        None => load_config(),
    })
}

fn apply_paths(config: &mut ConversionConfig, paths: PathArgs) {
    if let Some(v) = paths.vault {
        config.vault_path = v;
    }
    if let Some(v) = paths.hugo_content {
        config.content_path = v;
    }
    if let Some(v) = paths.hugo_static {
        config.static_path = v;
    }
    if let Some(v) = paths.hugo_archetypes {
        config.archetypes_path = v;
    }
    if let Some(v) = paths.theme {
        config.theme_name = v;
    }
    if !paths.include.is_empty() {
        config.include_patterns = paths.include;
    }
    if !paths.exclude.is_empty() {
        config.exclude_patterns = paths.exclude;
    }
}

fn apply_features(config: &mut ConversionConfig, features: FeatureArgs) {
    if !features.attachment_extensions.is_empty() {
        config.attachment_extensions = features
            .attachment_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
    }
    config.convert_wikilinks &= !features.no_wikilinks;
    config.convert_tags &= !features.no_tags;
    config.convert_attachments &= !features.no_attachments;
    config.create_toc &= !features.no_toc;
    config.preserve_front_matter &= !features.no_front_matter;
    if let Some(depth) = features.toc_max_depth {
        config.toc_max_depth = depth;
    }
    if features.jobs.is_some() {
        config.concurrency = features.jobs;
    }
}

fn print_stats(stats: &ConversionStats, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    println!("{stats}");
    for report in &stats.errors {
        eprintln!("  error: {}: {}", report.path.display(), report.message);
    }
    for report in &stats.warnings {
        eprintln!("  warning: {}: {}", report.path.display(), report.message);
    }
    if stats.error_files > 0 {
        println!("Some files had errors during conversion");
    } else {
        println!("Conversion completed successfully!");
    }
    Ok(())
}

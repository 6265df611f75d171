//! nest - browse, size and move files through archives as if they were folders.
//!
//! Usage:
//!   nest list [PATH]                 List a directory or archive interior
//!   nest size PATH...                Compute aggregate sizes
//!   nest copy SOURCE... DEST         Copy into a directory
//!   nest move SOURCE... DEST         Move into a directory
//!   nest extract ARCHIVE [DEST]      Extract a whole archive
//!   nest --help                      Show help

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use nestfs_list::{EngineConfig, EntryKind, Lister};
use nestfs_ops::{
    extract_archive, filter_self_drops, TransferEngine, TransferEvent, TransferItem, TransferMode,
};
use nestfs_size::SizeScheduler;

#[derive(Parser)]
#[command(
    name = "nest",
    version,
    about = "Browse, size and transfer files, looking inside archives",
    long_about = "nest treats archive files as folders.\n\n\
                  Paths such as `backup.tar.gz/etc/nginx` can be listed and \
                  sized directly, without extracting anything."
)]
struct Cli {
    /// Configuration file (defaults to <config dir>/nestfs/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory, an archive, or a folder inside an archive
    List {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Compute the aggregate size of paths
    Size {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Copy sources into a destination directory
    Copy {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,

        /// Exit with an error if any item fails
        #[arg(long)]
        strict: bool,
    },

    /// Move sources into a destination directory
    Move {
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,

        /// Exit with an error if any item fails
        #[arg(long)]
        strict: bool,
    },

    /// Extract a whole archive with the external tool
    Extract {
        archive: PathBuf,

        /// Destination directory (defaults to the archive's directory)
        destination: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::List { path, format } => run_list(&config, &path, format)?,
        Command::Size { paths } => run_size(&config, paths).await?,
        Command::Copy { paths, strict } => {
            run_transfer(&config, paths, TransferMode::Copy, strict).await?
        }
        Command::Move { paths, strict } => {
            run_transfer(&config, paths, TransferMode::Move, strict).await?
        }
        Command::Extract {
            archive,
            destination,
        } => run_extract(&config, &archive, destination).await?,
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the default filter.
fn init_logging(verbose: bool) {
    let default = if verbose { "nest=debug" } else { "nest=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the engine configuration.
///
/// An explicit `--config` file must exist. The default location is optional.
fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir() {
            Some(dir) => {
                let path = dir.join("nestfs").join("config.toml");
                if !path.exists() {
                    return Ok(EngineConfig::default());
                }
                path
            }
            None => return Ok(EngineConfig::default()),
        },
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Cannot read config {}", path.display()))?;
    let config: EngineConfig =
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
    config.validate()?;

    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// List one virtual directory.
fn run_list(config: &EngineConfig, path: &Path, format: OutputFormat) -> Result<()> {
    let lister = Lister::local(config);
    let listing = lister
        .list(path)
        .with_context(|| format!("Cannot list {}", path.display()))?;

    match format {
        OutputFormat::Text => {
            let origin = if listing.in_archive { " (archive)" } else { "" };
            println!("{}{}", path.display(), origin);
            println!("{}", "─".repeat(60));

            for entry in &listing.entries {
                let size = if entry.kind == EntryKind::Directory {
                    String::new()
                } else {
                    format_size(entry.size)
                };
                let name = match (&entry.kind, &entry.symlink_target) {
                    (EntryKind::Directory, _) => format!("{}/", entry.name),
                    (EntryKind::Symlink, Some(target)) => format!("{} -> {}", entry.name, target),
                    _ => entry.name.to_string(),
                };
                println!(" {:>10}  {}", size, name);
            }

            println!("{}", "─".repeat(60));
            println!(" {} entries", listing.entries.len());
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "path": listing.path,
                "in_archive": listing.in_archive,
                "entries": listing.entries,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

/// Compute sizes through the background scheduler and print them.
async fn run_size(config: &EngineConfig, paths: Vec<PathBuf>) -> Result<()> {
    let scheduler = SizeScheduler::new(Lister::local(config), config);
    let sizes = scheduler.measure_all(&paths).await;
    scheduler.shutdown().await;

    for path in &paths {
        match sizes.get(path).copied().flatten() {
            Some(size) => println!("{:>10}  {}", format_size(size), path.display()),
            None => println!("{:>10}  {}", "?", path.display()),
        }
    }

    Ok(())
}

/// Copy or move sources into the last path given.
async fn run_transfer(
    config: &EngineConfig,
    mut paths: Vec<PathBuf>,
    mode: TransferMode,
    strict: bool,
) -> Result<()> {
    let Some(destination) = paths.pop() else {
        bail!("No destination given");
    };

    let submitted = paths.len();
    let items = filter_self_drops(
        paths
            .into_iter()
            .map(|source| TransferItem::into_directory(source, &destination))
            .collect(),
    );
    if items.len() < submitted {
        eprintln!(
            "Skipping {} item(s) that would land on themselves",
            submitted - items.len()
        );
    }

    let engine = TransferEngine::new(Lister::local(config), config);
    let mut rx = engine.start(items, mode);

    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Progress(progress) => {
                let ratio = progress.percentage() / 100.0;
                eprint!(
                    "\r{} {:>5.1}%  {} / {}  ({}/{} files)",
                    make_bar(ratio, 30),
                    progress.percentage(),
                    format_size(progress.processed_bytes),
                    format_size(progress.total_bytes),
                    progress.processed_files,
                    progress.total_files,
                );
                let _ = std::io::stderr().flush();
            }
            TransferEvent::ItemFailed(failure) => {
                eprintln!("\nFailed: {}", failure);
            }
            TransferEvent::Complete(report) => {
                eprintln!();
                println!(
                    "{} ({})",
                    report.summary(),
                    format_size(report.bytes_processed)
                );
                if strict {
                    report.into_result()?;
                }
                return Ok(());
            }
            TransferEvent::Failed(err) => {
                eprintln!();
                return Err(err).context(format!("{} failed", mode));
            }
        }
    }

    bail!("Transfer ended without a result")
}

/// Extract an archive next to itself or into `destination`.
async fn run_extract(config: &EngineConfig, archive: &Path, destination: Option<PathBuf>) -> Result<()> {
    let destination = match destination {
        Some(dest) => dest,
        None => archive
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    eprintln!("Extracting {}...", archive.display());
    extract_archive(&config.archive_tool, archive, &destination)
        .await
        .context("Extraction failed")?;
    eprintln!("Extracted to {}", destination.display());

    Ok(())
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

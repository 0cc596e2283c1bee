mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use distrogen_lib::disk::PartitioningMode;

use crate::output::{OutputFormat, print_error};

/// distrogen - Image build manifest generator
#[derive(Parser)]
#[command(name = "distrogen")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List distributions, architectures and image types
  List {
    /// Only this distribution
    #[arg(long)]
    distro: Option<String>,

    /// Only this architecture
    #[arg(long)]
    arch: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the definition of one image type
  Info {
    distro: String,
    arch: String,
    image_type: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Generate a manifest for one image type
  Manifest {
    distro: String,
    arch: String,
    image_type: String,

    /// Blueprint file (TOML)
    #[arg(short, long)]
    blueprint: Option<PathBuf>,

    /// Seed for generated identifiers
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Image size in bytes (0 selects the default)
    #[arg(long, default_value_t = 0)]
    size: u64,

    /// OSTree repository URL
    #[arg(long)]
    ostree_url: Option<String>,

    /// OSTree ref to build or deploy
    #[arg(long)]
    ostree_ref: Option<String>,

    /// OSTree parent ref for new commits
    #[arg(long)]
    ostree_parent: Option<String>,

    /// How new mountpoints are added: auto-lvm, lvm or raw
    #[arg(long, default_value = "auto-lvm")]
    partitioning: PartitioningMode,

    /// Package snapshot (JSON) used to resolve package sets
    #[arg(long)]
    packages: Option<PathBuf>,

    /// Package resolution timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Write the manifest to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(err) = run(cli.command) {
    print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}

fn run(command: Commands) -> Result<()> {
  match command {
    Commands::List { distro, arch, json } => {
      cmd::cmd_list(distro.as_deref(), arch.as_deref(), format(json))
    }
    Commands::Info {
      distro,
      arch,
      image_type,
      json,
    } => cmd::cmd_info(&distro, &arch, &image_type, format(json)),
    Commands::Manifest {
      distro,
      arch,
      image_type,
      blueprint,
      seed,
      size,
      ostree_url,
      ostree_ref,
      ostree_parent,
      partitioning,
      packages,
      timeout,
      output,
    } => cmd::cmd_manifest(cmd::ManifestArgs {
      distro,
      arch,
      image_type,
      blueprint,
      seed,
      size,
      ostree_url,
      ostree_ref,
      ostree_parent,
      partitioning,
      packages,
      timeout,
      output,
    }),
  }
}

fn format(json: bool) -> OutputFormat {
  if json { OutputFormat::Json } else { OutputFormat::Text }
}

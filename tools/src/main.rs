use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codec::CodecLimits;
use ghostwire_tools::{
    collect_packet_entries, describe_registry, format_inspect_report, inspect_packet, load_registry,
    sort_by_size,
};
use schema::Registry;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ghostwire-tools",
    version,
    about = "ghostwire packet and registry inspection"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect packet structure and sizes.
    Inspect {
        /// Path to the packet bytes, or a directory of packets.
        packet_path: PathBuf,
        /// Registry JSON for per-record summaries.
        #[arg(long)]
        registry: Option<PathBuf>,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected packets.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected packets (after sorting).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print ghost type descriptors and hashes for a registry file.
    Registry {
        /// Registry JSON.
        registry_file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            packet_path,
            registry,
            glob,
            sort,
            limit,
        } => {
            let registry = registry
                .as_deref()
                .map(load_registry)
                .transpose()
                .context("load registry")?;
            if packet_path.is_dir() {
                let mut entries = collect_packet_entries(&packet_path, glob.as_deref())?;
                if matches!(sort, Some(InspectSort::Size)) {
                    sort_by_size(&mut entries);
                }
                let limit = limit.or(sort.map(|InspectSort::Size| 10));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                tracing::debug!(count = entries.len(), dir = %packet_path.display(), "inspecting packets");
                for entry in entries {
                    println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    print_packet(&entry.path, registry.as_ref())?;
                }
            } else {
                print_packet(&packet_path, registry.as_ref())?;
            }
        }
        Command::Registry { registry_file } => {
            let registry = load_registry(&registry_file).context("load registry")?;
            print!("{}", describe_registry(&registry));
        }
    }
    Ok(())
}

fn print_packet(path: &Path, registry: Option<&Registry>) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read packet {}", path.display()))?;
    let report = inspect_packet(
        &bytes,
        registry,
        &wire::Limits::default(),
        &CodecLimits::default(),
    )
    .with_context(|| format!("inspect {}", path.display()))?;
    print!("{}", format_inspect_report(&report));
    Ok(())
}

//! Introspection tools for ghostwire.
//!
//! - Summarize snapshot and ack packets: header, section sizes and, given the
//!   registry, a per-record breakdown.
//! - Print registry descriptors, lane layouts and hashes.
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to understand what the codec is doing.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use codec::{CodecLimits, PacketSummary};
use glob::Pattern;
use schema::{ComponentKind, Registry, RegistryFile};
use tick::NetworkTick;
use wire::{PacketHeader, SectionTag};

/// Reads and builds a registry from a JSON registry file.
pub fn load_registry(path: &Path) -> Result<Registry> {
    let contents = fs::read_to_string(path).with_context(|| format!("read registry {}", path.display()))?;
    let file: RegistryFile = serde_json::from_str(&contents).context("parse registry json")?;
    file.build()
        .map_err(|err| anyhow::anyhow!("registry build failed: {err}"))
}

/// What could be learned about one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectReport {
    pub header: PacketHeader,
    pub total_bytes: usize,
    pub sections: Vec<(SectionTag, usize)>,
    /// Present when the packet is a snapshot and a registry was supplied.
    pub snapshot: Option<PacketSummary>,
}

/// Inspects a packet; record summaries need the matching registry.
pub fn inspect_packet(
    bytes: &[u8],
    registry: Option<&Registry>,
    wire_limits: &wire::Limits,
    limits: &CodecLimits,
) -> Result<InspectReport> {
    let packet = wire::decode_packet(bytes, wire_limits).context("decode packet framing")?;
    let sections = packet
        .sections
        .iter()
        .map(|section| (section.tag, section.body.len()))
        .collect();
    let snapshot = match registry {
        Some(registry) if packet.header.flags.is_snapshot() => Some(
            codec::inspect_snapshot_packet(bytes, registry, wire_limits, limits).context("decode snapshot records")?,
        ),
        _ => None,
    };
    Ok(InspectReport {
        header: packet.header,
        total_bytes: bytes.len(),
        sections,
        snapshot,
    })
}

#[must_use]
pub fn format_inspect_report(report: &InspectReport) -> String {
    let header = &report.header;
    let kind = if header.flags.is_snapshot() {
        "snapshot"
    } else if header.flags.is_ack() {
        "ack"
    } else {
        "unknown"
    };
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{kind} v{} flags: 0x{:04x} registry_hash: 0x{:016x}",
        header.version,
        header.flags.raw(),
        header.registry_hash
    );
    let _ = writeln!(
        out,
        "tick: {} seq: {} echo: {} payload: {} bytes (total {})",
        NetworkTick::from_raw(header.tick),
        header.sequence,
        NetworkTick::from_raw(header.echo_tick),
        header.payload_len,
        report.total_bytes
    );
    let _ = writeln!(out, "sections:");
    for (tag, len) in &report.sections {
        let _ = writeln!(out, "  {tag:?}: {len} bytes");
    }
    if let Some(summary) = &report.snapshot {
        if !summary.despawns.is_empty() {
            let ids: Vec<String> = summary.despawns.iter().map(|ghost| ghost.raw().to_string()).collect();
            let _ = writeln!(out, "despawns: {}", ids.join(", "));
        }
        let _ = writeln!(out, "records: {}", summary.records.len());
        for record in &summary.records {
            let baselines: Vec<String> = record.baseline_ticks.iter().map(ToString::to_string).collect();
            let changed = if record.changed_components.is_empty() {
                "-".to_string()
            } else {
                record.changed_components.join(",")
            };
            let _ = writeln!(
                out,
                "  ghost {} {} baselines [{}] changed {} ({} bits, {} dynamic)",
                record.ghost.raw(),
                record.type_name,
                baselines.join(" "),
                changed,
                record.bits,
                record.dynamic_bits
            );
        }
    }
    out
}

/// Prints every ghost type with its components, fields, lanes and hashes.
#[must_use]
pub fn describe_registry(registry: &Registry) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "registry hash: 0x{:016x} ({} ghost types, {} templates)",
        registry.hash(),
        registry.len(),
        registry.templates().len()
    );
    for ghost_type in registry.ghost_types() {
        let _ = writeln!(
            out,
            "[{}] {} hash: 0x{:016x} importance: {} mode: {:?} baselines: {}{}",
            ghost_type.id.get(),
            ghost_type.name,
            ghost_type.hash,
            ghost_type.importance,
            ghost_type.mode,
            ghost_type.max_baselines(),
            if ghost_type.static_optimization { " static" } else { "" }
        );
        for component in &ghost_type.components {
            let kind = match component.kind {
                ComponentKind::Component => "component".to_string(),
                ComponentKind::Buffer { max_len } => format!("buffer[{max_len}]"),
            };
            let _ = writeln!(
                out,
                "  {} {} slots {:?}",
                component.name,
                kind,
                component.slot_range()
            );
            for field in &component.fields {
                let spec = &field.spec;
                let _ = writeln!(
                    out,
                    "    {}: {:?} {:?} {:?} template {}",
                    field.name, spec.field_type, spec.quantization, spec.smoothing, field.template_id
                );
            }
        }
        let _ = writeln!(out, "  lanes: {:?}", ghost_type.lanes);
    }
    out
}

/// A packet file found while inspecting a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// Lists files in `dir`, optionally filtered by a glob on the path or name.
pub fn collect_packet_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<PacketEntry>> {
    let pattern = glob
        .map(|value| Pattern::new(value).context("invalid glob pattern"))
        .transpose()?;
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !pattern.matches_path(&path) && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(PacketEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Largest first; equal sizes by path.
pub fn sort_by_size(entries: &mut [PacketEntry]) {
    entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
}

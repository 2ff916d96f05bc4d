//! Structural summaries of snapshot packets for tooling.
//!
//! Records are walked without baselines, so a summary shows what each
//! record references and which components it touched, not field values.

use schema::{GhostTypeId, Registry};
use tick::NetworkTick;
use wire::{PacketHeader, SectionTag};

use crate::error::CodecResult;
use crate::ghost::{read_record_body, read_record_header};
use crate::limits::CodecLimits;
use crate::packet::decode_snapshot_packet;
use crate::scratch::CodecScratch;
use crate::GhostId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub ghost: GhostId,
    pub type_id: GhostTypeId,
    pub type_name: String,
    pub baseline_ticks: Vec<NetworkTick>,
    pub changed_components: Vec<String>,
    /// Bits in the snapshot section.
    pub bits: usize,
    /// Bits in the dynamic section.
    pub dynamic_bits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketSummary {
    pub header: PacketHeader,
    pub total_bytes: usize,
    pub sections: Vec<(SectionTag, usize)>,
    pub despawns: Vec<GhostId>,
    pub records: Vec<RecordSummary>,
}

/// Summarizes a snapshot packet built against `registry`.
pub fn inspect_snapshot_packet(
    bytes: &[u8],
    registry: &Registry,
    wire_limits: &wire::Limits,
    limits: &CodecLimits,
) -> CodecResult<PacketSummary> {
    let sections = wire::decode_packet(bytes, wire_limits)?
        .sections
        .iter()
        .map(|section| (section.tag, section.body.len()))
        .collect();
    let packet = decode_snapshot_packet(bytes, registry.hash(), wire_limits, limits)?;
    let mut scratch = CodecScratch::new();
    let mut reader = packet.records();
    let mut records = Vec::with_capacity(packet.record_count);
    for _ in 0..packet.record_count {
        let start = reader.bit_position();
        let header = read_record_header(&mut reader, packet.tick)?;
        let descriptor = registry.ghost_type(header.type_id)?;
        let body = read_record_body(
            &mut reader,
            packet.dynamic,
            descriptor,
            &header,
            packet.tick,
            None,
            &mut scratch,
            limits,
        )?;
        records.push(RecordSummary {
            ghost: header.ghost,
            type_id: header.type_id,
            type_name: descriptor.name.clone(),
            changed_components: descriptor
                .components
                .iter()
                .filter(|component| body.changed_mask & (1 << component.index) != 0)
                .map(|component| component.name.clone())
                .collect(),
            baseline_ticks: header.baseline_ticks,
            bits: reader.bit_position() - start,
            dynamic_bits: body.dynamic_bits,
        });
    }
    Ok(PacketSummary {
        header: packet.header,
        total_bytes: bytes.len(),
        sections,
        despawns: packet.despawns,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::HistoryConfig;
    use crate::packet::SnapshotPacketWriter;
    use crate::server::ServerConnection;
    use crate::snapshot::SnapshotData;
    use crate::value::FieldValue;
    use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef};

    #[test]
    fn summarizes_records() {
        let registry = Registry::builder()
            .ghost_type(
                GhostTypeDef::new("lamp")
                    .component(ComponentDef::new("light").field(FieldDef::new("on", FieldType::Bool)))
                    .component(ComponentDef::new("power").field(FieldDef::new("watts", FieldType::UInt { bits: 12 }))),
            )
            .build()
            .unwrap();
        let lamp = registry.ghost_type_by_name("lamp").unwrap();
        let mut data = SnapshotData::new(lamp);
        data.set(lamp, "light", "on", &FieldValue::Bool(true)).unwrap();

        let mut server = ServerConnection::new(HistoryConfig::default()).unwrap();
        server.despawn(GhostId::new(40));
        let mut writer = SnapshotPacketWriter::new(NetworkTick::new(3), 1400, &CodecLimits::default());
        server.write_despawns(&mut writer);
        let mut scratch = CodecScratch::new();
        server
            .encode_ghost(&mut scratch, lamp, GhostId::new(6), &data, &mut writer)
            .unwrap();
        let bytes = server
            .finish_packet(writer, registry.hash(), &wire::Limits::default())
            .unwrap();

        let summary =
            inspect_snapshot_packet(&bytes, &registry, &wire::Limits::default(), &CodecLimits::default()).unwrap();
        assert_eq!(summary.total_bytes, bytes.len());
        assert_eq!(summary.despawns, vec![GhostId::new(40)]);
        assert_eq!(summary.sections.len(), 2);
        let record = &summary.records[0];
        assert_eq!(record.ghost, GhostId::new(6));
        assert_eq!(record.type_name, "lamp");
        assert_eq!(record.changed_components, vec!["light".to_owned()]);
        assert!(record.baseline_ticks.is_empty());
        assert!(record.bits > 0);
    }
}

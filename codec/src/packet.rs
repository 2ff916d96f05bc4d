//! Snapshot packet assembly and parsing.
//!
//! A snapshot packet carries up to three sections:
//!
//! - `GhostDespawn`: varint count, then one varint ghost id per despawn.
//! - `GhostSnapshot`: varint record count, then the bit-packed records.
//! - `GhostDynamic`: bit-packed dynamic buffer data referenced by records.

use bitstream::{BitReader, BitWriter};
use tick::NetworkTick;
use wire::{section_overhead, varu32_len, PacketHeader, SectionTag, HEADER_SIZE};

use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;
use crate::scratch::CodecScratch;
use crate::GhostId;

/// Builds one snapshot packet under a byte budget.
///
/// Records are encoded into a [`CodecScratch`] first and appended with
/// [`push_record`](Self::push_record) only if the whole packet still fits.
#[derive(Debug)]
pub struct SnapshotPacketWriter {
    tick: NetworkTick,
    max_bytes: usize,
    limits: CodecLimits,
    despawns: Vec<GhostId>,
    despawn_id_bytes: usize,
    records: BitWriter,
    record_count: usize,
    dynamic: BitWriter,
}

impl SnapshotPacketWriter {
    #[must_use]
    pub fn new(tick: NetworkTick, max_bytes: usize, limits: &CodecLimits) -> Self {
        Self {
            tick,
            max_bytes,
            limits: limits.clone(),
            despawns: Vec::new(),
            despawn_id_bytes: 0,
            records: BitWriter::with_capacity(max_bytes),
            record_count: 0,
            dynamic: BitWriter::new(),
        }
    }

    #[must_use]
    pub const fn tick(&self) -> NetworkTick {
        self.tick
    }

    /// Bit offset the next record's dynamic data will start at.
    #[must_use]
    pub fn dynamic_bits(&self) -> usize {
        self.dynamic.bits_written()
    }

    #[must_use]
    pub const fn record_count(&self) -> usize {
        self.record_count
    }

    #[must_use]
    pub fn despawns(&self) -> &[GhostId] {
        &self.despawns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_count == 0 && self.despawns.is_empty()
    }

    /// Encoded size of the packet as it stands.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.size_with(0, 0, 0, 0)
    }

    /// Whether the record currently in `scratch` would fit.
    #[must_use]
    pub fn fits(&self, scratch: &CodecScratch) -> bool {
        self.record_count < self.limits.max_ghosts_per_packet
            && self.size_with(0, 1, scratch.record().bits_written(), scratch.dynamic().bits_written())
                <= self.max_bytes
    }

    /// Appends the record in `scratch` if it fits; returns whether it did.
    pub fn push_record(&mut self, scratch: &CodecScratch) -> bool {
        if !self.fits(scratch) {
            return false;
        }
        self.records.append(scratch.record());
        self.dynamic.append(scratch.dynamic());
        self.record_count += 1;
        true
    }

    /// Adds a despawn if it fits; returns whether it did.
    pub fn push_despawn(&mut self, ghost: GhostId) -> bool {
        if self.despawns.len() >= self.limits.max_despawns_per_packet {
            return false;
        }
        let id_bytes = varu32_len(ghost.raw());
        if self.size_with(id_bytes, 0, 0, 0) > self.max_bytes {
            return false;
        }
        self.despawns.push(ghost);
        self.despawn_id_bytes += id_bytes;
        true
    }

    fn size_with(&self, extra_despawn: usize, extra_records: usize, record_bits: usize, dynamic_bits: usize) -> usize {
        let despawn_count = self.despawns.len() + usize::from(extra_despawn > 0);
        let despawn_body = if despawn_count == 0 {
            0
        } else {
            varu32_len(despawn_count as u32) + self.despawn_id_bytes + extra_despawn
        };
        let record_count = self.record_count + extra_records;
        let record_body = if record_count == 0 {
            0
        } else {
            varu32_len(record_count as u32) + (self.records.bits_written() + record_bits).div_ceil(8)
        };
        let dynamic_body = (self.dynamic.bits_written() + dynamic_bits).div_ceil(8);
        HEADER_SIZE + framed(despawn_body) + framed(record_body) + framed(dynamic_body)
    }

    /// Finishes the packet.
    pub fn finish(
        self,
        registry_hash: u64,
        sequence: u32,
        echo_tick: NetworkTick,
        wire_limits: &wire::Limits,
    ) -> CodecResult<Vec<u8>> {
        let mut despawns = BitWriter::new();
        if !self.despawns.is_empty() {
            despawns.write_varu32(self.despawns.len() as u32)?;
            for ghost in &self.despawns {
                despawns.write_varu32(ghost.raw())?;
            }
        }
        let mut records = BitWriter::new();
        if self.record_count > 0 {
            records.write_varu32(self.record_count as u32)?;
            records.append(&self.records);
        }
        let despawns = despawns.finish();
        let records = records.finish();
        let dynamic = self.dynamic.finish();
        let header = PacketHeader::snapshot(registry_hash, self.tick.raw(), sequence, echo_tick.raw(), 0);
        Ok(wire::encode_packet(
            header,
            &[
                (SectionTag::GhostDespawn, despawns.as_slice()),
                (SectionTag::GhostSnapshot, records.as_slice()),
                (SectionTag::GhostDynamic, dynamic.as_slice()),
            ],
            wire_limits,
        )?)
    }
}

fn framed(body: usize) -> usize {
    if body == 0 {
        0
    } else {
        section_overhead(body) + body
    }
}

/// A parsed snapshot packet; records still need a registry to decode.
#[derive(Debug, Clone)]
pub struct SnapshotPacket<'a> {
    pub header: PacketHeader,
    pub tick: NetworkTick,
    pub despawns: Vec<GhostId>,
    pub record_count: usize,
    records: &'a [u8],
    pub dynamic: &'a [u8],
}

impl<'a> SnapshotPacket<'a> {
    /// Reader positioned at the first record.
    #[must_use]
    pub fn records(&self) -> BitReader<'a> {
        BitReader::new(self.records)
    }
}

/// Parses a snapshot packet's framing, checking hash, tick and limits.
pub fn decode_snapshot_packet<'a>(
    bytes: &'a [u8],
    registry_hash: u64,
    wire_limits: &wire::Limits,
    limits: &CodecLimits,
) -> CodecResult<SnapshotPacket<'a>> {
    let packet = wire::decode_packet(bytes, wire_limits)?;
    let header = packet.header;
    if !header.flags.is_snapshot() {
        return Err(CodecError::UnexpectedPacket { expected: "snapshot" });
    }
    if header.registry_hash != registry_hash {
        return Err(CodecError::RegistryMismatch {
            expected: registry_hash,
            found: header.registry_hash,
        });
    }
    let tick = NetworkTick::from_raw(header.tick);
    if !tick.is_valid() {
        return Err(CodecError::InvalidTick { raw: header.tick });
    }
    for section in &packet.sections {
        if section.body.len() > limits.max_section_bytes {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::SectionBytes,
                limit: limits.max_section_bytes,
                actual: section.body.len(),
            });
        }
    }

    let mut despawns = Vec::new();
    if let Some(body) = packet.section(SectionTag::GhostDespawn) {
        let mut reader = BitReader::new(body);
        let count = reader.read_varu32()? as usize;
        if count > limits.max_despawns_per_packet {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::DespawnsPerPacket,
                limit: limits.max_despawns_per_packet,
                actual: count,
            });
        }
        despawns.reserve(count);
        for _ in 0..count {
            despawns.push(GhostId::new(reader.read_varu32()?));
        }
    }

    let (record_count, records) = match packet.section(SectionTag::GhostSnapshot) {
        Some(body) => {
            let mut reader = BitReader::new(body);
            let count = reader.read_varu32()? as usize;
            if count > limits.max_ghosts_per_packet {
                return Err(CodecError::LimitsExceeded {
                    kind: LimitKind::GhostsPerPacket,
                    limit: limits.max_ghosts_per_packet,
                    actual: count,
                });
            }
            (count, &body[reader.bit_position() / 8..])
        }
        None => (0, &[][..]),
    };

    Ok(SnapshotPacket {
        header,
        tick,
        despawns,
        record_count,
        records,
        dynamic: packet.section(SectionTag::GhostDynamic).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ghost::{encode_ghost_record, read_record_body, read_record_header};
    use crate::snapshot::SnapshotData;
    use crate::value::FieldValue;
    use schema::{ComponentDef, FieldDef, FieldType, GhostTypeDef, Registry};

    fn registry() -> Registry {
        Registry::builder()
            .ghost_type(
                GhostTypeDef::new("crate")
                    .component(ComponentDef::new("id").field(FieldDef::new("serial", FieldType::UInt { bits: 32 })))
                    .component(ComponentDef::buffer("tags", 4).field(FieldDef::new("tag", FieldType::UInt { bits: 8 }))),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn despawns_and_records_round_trip() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let tick = NetworkTick::new(10);
        let mut writer = SnapshotPacketWriter::new(tick, 1400, &CodecLimits::default());
        assert!(writer.push_despawn(GhostId::new(300)));
        assert!(writer.push_despawn(GhostId::new(4)));

        let mut scratch = CodecScratch::new();
        let mut expected = Vec::new();
        for i in 0..3u32 {
            let mut data = SnapshotData::new(descriptor);
            data.set(descriptor, "id", "serial", &FieldValue::UInt(1000 + i)).unwrap();
            for tag in 0..i {
                let at = data.push_element(descriptor, "tags").unwrap();
                data.set_element(descriptor, "tags", at, "tag", &FieldValue::UInt(tag * 3))
                    .unwrap();
            }
            encode_ghost_record(&mut scratch, descriptor, GhostId::new(i), tick, &data, &[], writer.dynamic_bits())
                .unwrap();
            assert!(writer.push_record(&scratch));
            expected.push(data);
        }
        let predicted_len = writer.encoded_len();
        let bytes = writer.finish(registry.hash(), 7, NetworkTick::new(3), &wire::Limits::default()).unwrap();
        assert_eq!(bytes.len(), predicted_len);

        let packet = decode_snapshot_packet(&bytes, registry.hash(), &wire::Limits::default(), &CodecLimits::default())
            .unwrap();
        assert_eq!(packet.tick, tick);
        assert_eq!(packet.header.sequence, 7);
        assert_eq!(packet.despawns, vec![GhostId::new(300), GhostId::new(4)]);
        assert_eq!(packet.record_count, 3);

        let mut reader = packet.records();
        for (i, data) in expected.iter().enumerate() {
            let header = read_record_header(&mut reader, tick).unwrap();
            assert_eq!(header.ghost, GhostId::new(i as u32));
            let body = read_record_body(
                &mut reader,
                packet.dynamic,
                descriptor,
                &header,
                tick,
                Some(&[][..]),
                &mut scratch,
                &CodecLimits::default(),
            )
            .unwrap();
            assert_eq!(body.data.as_ref(), Some(data));
        }
    }

    #[test]
    fn budget_is_respected() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let tick = NetworkTick::new(1);
        let budget = 64;
        let mut writer = SnapshotPacketWriter::new(tick, budget, &CodecLimits::default());
        let mut scratch = CodecScratch::new();
        let mut data = SnapshotData::new(descriptor);
        data.set(descriptor, "id", "serial", &FieldValue::UInt(u32::MAX)).unwrap();

        let mut pushed = 0;
        for i in 0..100 {
            encode_ghost_record(&mut scratch, descriptor, GhostId::new(i), tick, &data, &[], writer.dynamic_bits())
                .unwrap();
            if !writer.push_record(&scratch) {
                break;
            }
            pushed += 1;
        }
        assert!(pushed > 0 && pushed < 100);
        assert!(writer.encoded_len() <= budget);
        let bytes = writer.finish(registry.hash(), 0, NetworkTick::INVALID, &wire::Limits::default()).unwrap();
        assert!(bytes.len() <= budget);
    }

    #[test]
    fn ghost_limit_caps_records() {
        let registry = registry();
        let descriptor = registry.ghost_type_by_name("crate").unwrap();
        let limits = CodecLimits {
            max_ghosts_per_packet: 2,
            ..CodecLimits::default()
        };
        let mut writer = SnapshotPacketWriter::new(NetworkTick::new(1), 1400, &limits);
        let mut scratch = CodecScratch::new();
        let data = SnapshotData::new(descriptor);
        for i in 0..2 {
            encode_ghost_record(&mut scratch, descriptor, GhostId::new(i), NetworkTick::new(1), &data, &[], 0).unwrap();
            assert!(writer.push_record(&scratch));
        }
        assert!(!writer.fits(&scratch));
    }

    #[test]
    fn rejects_wrong_hash_and_ack_packets() {
        let registry = registry();
        let writer = SnapshotPacketWriter::new(NetworkTick::new(5), 1400, &CodecLimits::default());
        let bytes = writer.finish(registry.hash(), 0, NetworkTick::INVALID, &wire::Limits::default()).unwrap();
        assert!(matches!(
            decode_snapshot_packet(&bytes, registry.hash() ^ 1, &wire::Limits::default(), &CodecLimits::default()),
            Err(CodecError::RegistryMismatch { .. })
        ));

        let ack = crate::ack::encode_ack_packet(
            registry.hash(),
            0,
            &crate::ack::SnapshotAck::default(),
            &wire::Limits::default(),
        )
        .unwrap();
        assert!(matches!(
            decode_snapshot_packet(&ack, registry.hash(), &wire::Limits::default(), &CodecLimits::default()),
            Err(CodecError::UnexpectedPacket { .. })
        ));
    }

    #[test]
    fn invalid_tick_rejected() {
        let header = PacketHeader::snapshot(9, 0, 0, 0, 0);
        let bytes = wire::encode_packet(header, &[], &wire::Limits::default()).unwrap();
        assert!(matches!(
            decode_snapshot_packet(&bytes, 9, &wire::Limits::default(), &CodecLimits::default()),
            Err(CodecError::InvalidTick { raw: 0 })
        ));
    }
}

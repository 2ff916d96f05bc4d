//! Binary diagnostic packet.
//!
//! Layout, little-endian and byte-aligned:
//!
//! ```text
//! magic u32 | tick u32 | type count u16
//! per type: id u16 | entities u32 | size bits u64 | uncompressed u32 | chunks u32
//! error count u16 | errors f32...
//! sample count u16 | (command age f32, rtt ms f32, jitter ms f32)...
//! ```

use bitstream::{BitReader, BitWriter};
use schema::GhostTypeId;
use tick::NetworkTick;

use crate::accumulator::{TickStats, TimingSample, TypeStats};
use crate::error::{StatsError, StatsResult};

/// `"GWST"` in ASCII.
pub const STATS_MAGIC: u32 = 0x4757_5354;

const TYPE_RECORD_BYTES: usize = 2 + 4 + 8 + 4 + 4;

fn count(what: &'static str, len: usize) -> StatsResult<u16> {
    u16::try_from(len).map_err(|_| StatsError::TooMany { what, count: len })
}

pub fn encode_stats_packet(stats: &TickStats) -> StatsResult<Vec<u8>> {
    let types = count("ghost types", stats.types.len())?;
    let errors = count("prediction errors", stats.prediction_errors.len())?;
    let samples = count("timing samples", stats.timing.len())?;

    let mut writer = BitWriter::with_capacity(
        10 + stats.types.len() * TYPE_RECORD_BYTES + 4 + stats.prediction_errors.len() * 4 + stats.timing.len() * 12,
    );
    writer.write_u32_aligned(STATS_MAGIC)?;
    writer.write_u32_aligned(stats.tick.raw())?;
    writer.write_u16_aligned(types)?;
    for (type_id, record) in &stats.types {
        writer.write_u16_aligned(type_id.get())?;
        writer.write_u32_aligned(record.entity_count)?;
        writer.write_u64_aligned(record.size_bits)?;
        writer.write_u32_aligned(record.uncompressed_count)?;
        writer.write_u32_aligned(record.chunk_count)?;
    }
    writer.write_u16_aligned(errors)?;
    for error in &stats.prediction_errors {
        writer.write_u32_aligned(error.to_bits())?;
    }
    writer.write_u16_aligned(samples)?;
    for sample in &stats.timing {
        writer.write_u32_aligned(sample.command_age.to_bits())?;
        writer.write_u32_aligned(sample.rtt_ms.to_bits())?;
        writer.write_u32_aligned(sample.jitter_ms.to_bits())?;
    }
    Ok(writer.finish())
}

pub fn decode_stats_packet(bytes: &[u8]) -> StatsResult<TickStats> {
    let mut reader = BitReader::new(bytes);
    let magic = reader.read_u32_aligned()?;
    if magic != STATS_MAGIC {
        return Err(StatsError::BadMagic { found: magic });
    }
    let mut stats = TickStats {
        tick: NetworkTick::from_raw(reader.read_u32_aligned()?),
        ..TickStats::default()
    };
    for _ in 0..reader.read_u16_aligned()? {
        let type_id = GhostTypeId::new(reader.read_u16_aligned()?);
        let record = TypeStats {
            entity_count: reader.read_u32_aligned()?,
            size_bits: reader.read_u64_aligned()?,
            uncompressed_count: reader.read_u32_aligned()?,
            chunk_count: reader.read_u32_aligned()?,
        };
        stats.types.insert(type_id, record);
    }
    for _ in 0..reader.read_u16_aligned()? {
        stats
            .prediction_errors
            .push(f32::from_bits(reader.read_u32_aligned()?));
    }
    for _ in 0..reader.read_u16_aligned()? {
        stats.timing.push(TimingSample {
            command_age: f32::from_bits(reader.read_u32_aligned()?),
            rtt_ms: f32::from_bits(reader.read_u32_aligned()?),
            jitter_ms: f32::from_bits(reader.read_u32_aligned()?),
        });
    }
    if !reader.is_empty() {
        return Err(StatsError::TrailingBytes {
            remaining: reader.bits_remaining() / 8,
        });
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::StatsAccumulator;

    fn sample_stats() -> TickStats {
        let mut acc = StatsAccumulator::new();
        acc.record_ghost(GhostTypeId::new(3), 120, true);
        acc.record_ghost(GhostTypeId::new(3), 30, false);
        acc.record_prediction_error(0.125);
        acc.record_timing(TimingSample {
            command_age: 3.0,
            rtt_ms: 64.5,
            jitter_ms: 2.25,
        });
        TickStats::merge(NetworkTick::new(900), [acc])
    }

    #[test]
    fn layout_is_stable() {
        let bytes = encode_stats_packet(&sample_stats()).unwrap();
        assert_eq!(&bytes[..4], &STATS_MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &NetworkTick::new(900).raw().to_le_bytes());
        assert_eq!(&bytes[8..10], &1u16.to_le_bytes());
        assert_eq!(bytes.len(), 10 + TYPE_RECORD_BYTES + 2 + 4 + 2 + 12);
        assert_eq!(decode_stats_packet(&bytes).unwrap(), sample_stats());
    }

    #[test]
    fn rejects_foreign_and_padded_packets() {
        assert!(matches!(
            decode_stats_packet(&[0, 0, 0, 0]),
            Err(StatsError::BadMagic { found: 0 })
        ));
        let mut bytes = encode_stats_packet(&sample_stats()).unwrap();
        bytes.push(0);
        assert_eq!(
            decode_stats_packet(&bytes),
            Err(StatsError::TrailingBytes { remaining: 1 })
        );
        assert!(decode_stats_packet(&bytes[..12]).is_err());
    }
}

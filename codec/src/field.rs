//! Per-lane delta encoding.
//!
//! Predictable lanes carry a packed signed difference from the predicted
//! value (a single bit when unchanged). Raw lanes carry a changed bit and,
//! when changed, the new value in the lane's declared width.

use bitstream::{BitReader, BitWriter};
use schema::LaneKind;

use crate::error::CodecResult;

/// Encodes `current` against `predicted`, lane by lane.
pub(crate) fn encode_lanes(
    writer: &mut BitWriter,
    lanes: &[LaneKind],
    current: &[u32],
    predicted: &[u32],
) -> CodecResult<()> {
    for ((lane, &value), &base) in lanes.iter().zip(current).zip(predicted) {
        match *lane {
            LaneKind::Delta => writer.write_packed_i32(value.wrapping_sub(base) as i32),
            LaneKind::Raw { bits } => {
                let changed = value != base;
                writer.write_bit(changed);
                if changed {
                    writer.write_bits(u64::from(value), bits)?;
                }
            }
        }
    }
    Ok(())
}

/// Decodes lanes written by [`encode_lanes`] into `out`.
pub(crate) fn decode_lanes(
    reader: &mut BitReader<'_>,
    lanes: &[LaneKind],
    predicted: &[u32],
    out: &mut [u32],
) -> CodecResult<()> {
    for ((lane, &base), slot) in lanes.iter().zip(predicted).zip(out.iter_mut()) {
        *slot = match *lane {
            LaneKind::Delta => base.wrapping_add(reader.read_packed_i32()? as u32),
            LaneKind::Raw { bits } => {
                if reader.read_bit()? {
                    reader.read_bits(bits)? as u32
                } else {
                    base
                }
            }
        };
    }
    Ok(())
}

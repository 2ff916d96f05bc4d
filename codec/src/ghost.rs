//! Ghost records: one ghost's state delta-coded against its baselines.
//!
//! Record layout (bit-packed, MSB first):
//!
//! ```text
//! ghost id        packed u32
//! type id         packed u32
//! baseline count  2 bits (0..=3)
//! distances       packed u32 each, ticks back from the packet tick, increasing
//! change mask     one bit per component
//! fixed lanes     per changed fixed component, see `field`
//! dynamic ref     packed bit offset + packed bit length, only if a buffer changed
//! ```
//!
//! Changed buffer components are written to the packet's dynamic section as
//! an element count followed by each element's lanes, coded against the
//! newest baseline's elements when the counts match and against zero
//! otherwise.

use bitstream::{BitReader, BitWriter};
use schema::{ComponentDescriptor, GhostTypeDescriptor, GhostTypeId, SchemaError};
use tick::NetworkTick;

use crate::error::{CodecError, CodecResult, LimitKind};
use crate::field::{decode_lanes, encode_lanes};
use crate::limits::CodecLimits;
use crate::predictor::DeltaPredictor;
use crate::scratch::CodecScratch;
use crate::snapshot::SnapshotData;
use crate::GhostId;

/// Most baselines a record can reference.
pub const MAX_BASELINES: usize = 3;

/// Baseline distances at or beyond this are rejected.
const MAX_BASELINE_DISTANCE: u32 = 1 << 30;

/// Sizes of a record left in [`CodecScratch`] by [`encode_ghost_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedRecord {
    pub bits: usize,
    pub dynamic_bits: usize,
    pub changed_mask: u32,
    pub baselines: usize,
}

/// Encodes one ghost into the scratch record and dynamic writers.
///
/// `baselines` are acknowledged snapshots, newest first; at most
/// [`GhostTypeDescriptor::max_baselines`] of them are used. `dynamic_base`
/// is the bit position the scratch dynamic bits will have once appended to
/// the packet's dynamic section.
pub fn encode_ghost_record(
    scratch: &mut CodecScratch,
    descriptor: &GhostTypeDescriptor,
    ghost: GhostId,
    tick: NetworkTick,
    current: &SnapshotData,
    baselines: &[(NetworkTick, &SnapshotData)],
    dynamic_base: usize,
) -> CodecResult<EncodedRecord> {
    current.check_layout(descriptor)?;
    let count = baselines
        .len()
        .min(descriptor.max_baselines())
        .min(MAX_BASELINES);
    let baselines = &baselines[..count];

    let mut ticks = [NetworkTick::INVALID; MAX_BASELINES];
    let mut slot_refs: [&[u32]; MAX_BASELINES] = [&[]; MAX_BASELINES];
    let mut previous = 0;
    for (i, (baseline_tick, data)) in baselines.iter().enumerate() {
        data.check_layout(descriptor)?;
        let distance = tick.ticks_since(*baseline_tick);
        if distance <= previous {
            return Err(CodecError::InvalidBaselineDistance {
                ghost: ghost.raw(),
                distance: distance as u32,
            });
        }
        previous = distance;
        ticks[i] = *baseline_tick;
        slot_refs[i] = data.slots();
    }
    let newest = baselines.first().map(|(_, data)| *data);

    scratch.reset_writers();
    let CodecScratch {
        record,
        dynamic,
        predicted,
        zeros,
    } = scratch;

    record.write_packed_u32(ghost.raw());
    record.write_packed_u32(u32::from(descriptor.id.get()));
    record.write_bits(count as u64, 2)?;
    for baseline_tick in &ticks[..count] {
        record.write_packed_u32(tick.ticks_since(*baseline_tick) as u32);
    }

    DeltaPredictor::new(tick, &ticks[..count]).predict(&descriptor.lanes, &slot_refs[..count], predicted);

    let mut mask = 0u32;
    let mut buffer_at = 0;
    for component in &descriptor.components {
        let changed = if component.is_buffer() {
            let base = newest.map_or(&[][..], |data| data.buffers()[buffer_at].as_slice());
            buffer_at += 1;
            current.buffers()[buffer_at - 1].as_slice() != base
        } else {
            let range = component.slot_range();
            current.slots()[range.clone()] != predicted[range]
        };
        if changed {
            mask |= 1 << component.index;
        }
    }
    record.write_bits(u64::from(mask), descriptor.components.len() as u8)?;

    let mut buffer_at = 0;
    let mut any_buffer = false;
    for component in &descriptor.components {
        let changed = mask & (1 << component.index) != 0;
        if component.is_buffer() {
            if changed {
                any_buffer = true;
                let base = newest.map(|data| data.buffers()[buffer_at].as_slice());
                encode_buffer(dynamic, component, &current.buffers()[buffer_at], base, zeros)?;
            }
            buffer_at += 1;
        } else if changed {
            let range = component.slot_range();
            encode_lanes(
                record,
                &component.lanes,
                &current.slots()[range.clone()],
                &predicted[range],
            )?;
        }
    }
    if any_buffer {
        record.write_packed_u32(dynamic_base as u32);
        record.write_packed_u32(dynamic.bits_written() as u32);
    }

    Ok(EncodedRecord {
        bits: record.bits_written(),
        dynamic_bits: dynamic.bits_written(),
        changed_mask: mask,
        baselines: count,
    })
}

fn encode_buffer(
    writer: &mut BitWriter,
    component: &ComponentDescriptor,
    current: &[u32],
    baseline: Option<&[u32]>,
    zeros: &mut Vec<u32>,
) -> CodecResult<()> {
    let element_lanes = component.lanes.len();
    writer.write_packed_u32((current.len() / element_lanes) as u32);
    let base = baseline.filter(|base| base.len() == current.len());
    if zeros.len() < element_lanes {
        zeros.resize(element_lanes, 0);
    }
    let zero = &zeros[..element_lanes];
    for (i, element) in current.chunks_exact(element_lanes).enumerate() {
        let predicted = base.map_or(zero, |base| &base[i * element_lanes..(i + 1) * element_lanes]);
        encode_lanes(writer, &component.lanes, element, predicted)?;
    }
    Ok(())
}

/// Identity and baselines of a record, readable without the ghost's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub ghost: GhostId,
    pub type_id: GhostTypeId,
    /// Baseline ticks, newest first.
    pub baseline_ticks: Vec<NetworkTick>,
}

/// Reads a record header; `tick` is the packet's server tick.
pub fn read_record_header(reader: &mut BitReader<'_>, tick: NetworkTick) -> CodecResult<RecordHeader> {
    let ghost = GhostId::new(reader.read_packed_u32()?);
    let raw_type = reader.read_packed_u32()?;
    let type_id = u16::try_from(raw_type)
        .map(GhostTypeId::new)
        .map_err(|_| SchemaError::UnknownGhostType { id: u16::MAX })?;
    let count = reader.read_bits(2)? as usize;
    let mut baseline_ticks = Vec::with_capacity(count);
    let mut previous = 0;
    for _ in 0..count {
        let distance = reader.read_packed_u32()?;
        if distance <= previous || distance >= MAX_BASELINE_DISTANCE {
            return Err(CodecError::InvalidBaselineDistance {
                ghost: ghost.raw(),
                distance,
            });
        }
        previous = distance;
        baseline_ticks.push(tick.subtract(distance));
    }
    Ok(RecordHeader {
        ghost,
        type_id,
        baseline_ticks,
    })
}

/// Result of reading a record body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBody {
    /// Reconstructed data, or `None` when the record was only skipped.
    pub data: Option<SnapshotData>,
    pub changed_mask: u32,
    pub dynamic_bits: usize,
}

/// Reads a record body after [`read_record_header`].
///
/// With `baselines` set to the snapshots at `header.baseline_ticks` (newest
/// first) the ghost's data is reconstructed exactly. With `None` the body is
/// parsed only far enough to leave `reader` at the next record, which is how
/// a record with a missing baseline is dropped without losing the packet.
#[allow(clippy::too_many_arguments)]
pub fn read_record_body(
    reader: &mut BitReader<'_>,
    dynamic: &[u8],
    descriptor: &GhostTypeDescriptor,
    header: &RecordHeader,
    tick: NetworkTick,
    baselines: Option<&[&SnapshotData]>,
    scratch: &mut CodecScratch,
    limits: &CodecLimits,
) -> CodecResult<RecordBody> {
    let skip = baselines.is_none();
    let baselines = baselines.unwrap_or(&[]);
    let count = baselines.len().min(header.baseline_ticks.len());
    let mut slot_refs: [&[u32]; MAX_BASELINES] = [&[]; MAX_BASELINES];
    for (slot, data) in slot_refs.iter_mut().zip(&baselines[..count]) {
        data.check_layout(descriptor)?;
        *slot = data.slots();
    }
    let newest = baselines.first().copied();

    let CodecScratch {
        predicted, zeros, ..
    } = scratch;
    DeltaPredictor::new(tick, &header.baseline_ticks[..count]).predict(
        &descriptor.lanes,
        &slot_refs[..count],
        predicted,
    );

    let mask = reader.read_bits(descriptor.components.len() as u8)? as u32;
    let mut slots = predicted.clone();
    let mut buffer_changed = false;
    for component in &descriptor.components {
        if mask & (1 << component.index) == 0 {
            continue;
        }
        if component.is_buffer() {
            buffer_changed = true;
        } else {
            let range = component.slot_range();
            decode_lanes(reader, &component.lanes, &predicted[range.clone()], &mut slots[range])?;
        }
    }

    let mut buffers: Vec<Vec<u32>> = descriptor
        .components
        .iter()
        .filter(|component| component.is_buffer())
        .enumerate()
        .map(|(i, _)| newest.map(|data| data.buffers()[i].clone()).unwrap_or_default())
        .collect();

    let mut dynamic_bits = 0;
    if buffer_changed {
        let offset = reader.read_packed_u32()? as usize;
        let len = reader.read_packed_u32()? as usize;
        dynamic_bits = len;
        if !skip {
            let available = dynamic.len() * 8;
            if offset.checked_add(len).map_or(true, |end| end > available) {
                return Err(CodecError::DynamicOutOfRange {
                    offset,
                    len,
                    available,
                });
            }
            let mut dynamic_reader = BitReader::new(dynamic);
            dynamic_reader.seek_bits(offset)?;
            let mut buffer_at = 0;
            for component in &descriptor.components {
                if !component.is_buffer() {
                    continue;
                }
                if mask & (1 << component.index) != 0 {
                    let base = newest.map(|data| data.buffers()[buffer_at].as_slice());
                    buffers[buffer_at] =
                        decode_buffer(&mut dynamic_reader, component, base, limits, zeros)?;
                }
                buffer_at += 1;
            }
            if dynamic_reader.bit_position() - offset != len {
                return Err(CodecError::DynamicOutOfRange {
                    offset,
                    len,
                    available,
                });
            }
        }
    }

    Ok(RecordBody {
        data: (!skip).then(|| SnapshotData::from_parts(slots, buffers)),
        changed_mask: mask,
        dynamic_bits,
    })
}

fn decode_buffer(
    reader: &mut BitReader<'_>,
    component: &ComponentDescriptor,
    baseline: Option<&[u32]>,
    limits: &CodecLimits,
    zeros: &mut Vec<u32>,
) -> CodecResult<Vec<u32>> {
    let count = reader.read_packed_u32()? as usize;
    let max = component.max_elements().min(limits.max_buffer_elements);
    if count > max {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::BufferElements,
            limit: max,
            actual: count,
        });
    }
    let element_lanes = component.lanes.len();
    let mut out = vec![0u32; count * element_lanes];
    let base = baseline.filter(|base| base.len() == out.len());
    if zeros.len() < element_lanes {
        zeros.resize(element_lanes, 0);
    }
    let zero = &zeros[..element_lanes];
    for (i, element) in out.chunks_exact_mut(element_lanes).enumerate() {
        let predicted = base.map_or(zero, |base| &base[i * element_lanes..(i + 1) * element_lanes]);
        decode_lanes(reader, &component.lanes, predicted, element)?;
    }
    Ok(out)
}

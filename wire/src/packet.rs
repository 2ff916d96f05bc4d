//! Packet decoding and section framing.
//!
//! Layout: `header (32 bytes) | section*` where each section is
//! `tag u8 | len varu32 | body[len]`.

use crate::error::{DecodeError, EncodeError, LimitKind, SectionFramingError, WireResult};
use crate::header::{PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
use crate::limits::Limits;

/// Section tags for version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum SectionTag {
    /// Ghost ids removed on the server, resent until acknowledged.
    GhostDespawn = 1,
    /// Bit-packed ghost records.
    GhostSnapshot = 2,
    /// Out-of-line dynamic buffer data referenced by ghost records.
    GhostDynamic = 3,
    /// Client acknowledgement of received snapshot ticks.
    SnapshotAck = 4,
}

impl SectionTag {
    /// Parses a section tag from a raw byte.
    pub const fn parse(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            1 => Ok(Self::GhostDespawn),
            2 => Ok(Self::GhostSnapshot),
            3 => Ok(Self::GhostDynamic),
            4 => Ok(Self::SnapshotAck),
            _ => Err(DecodeError::UnknownSectionTag { tag }),
        }
    }
}

/// A section within a wire packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireSection<'a> {
    pub tag: SectionTag,
    pub body: &'a [u8],
}

/// A decoded wire packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePacket<'a> {
    pub header: PacketHeader,
    pub sections: Vec<WireSection<'a>>,
}

impl<'a> WirePacket<'a> {
    /// Returns the body of the first section with `tag`, if any.
    pub fn section(&self, tag: SectionTag) -> Option<&'a [u8]> {
        self.sections
            .iter()
            .find(|section| section.tag == tag)
            .map(|section| section.body)
    }
}

/// Decodes only the packet header, validating magic, version, flags and payload length.
pub fn decode_header(buf: &[u8], limits: &Limits) -> WireResult<PacketHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::PacketTooSmall {
            actual: buf.len(),
            required: HEADER_SIZE,
        });
    }
    if buf.len() > limits.max_packet_bytes {
        return Err(DecodeError::LimitsExceeded {
            kind: LimitKind::PacketBytes,
            limit: limits.max_packet_bytes,
            actual: buf.len(),
        });
    }

    let magic = le_u32(buf, 0);
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }

    let version = le_u16(buf, 4);
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion { found: version });
    }

    let flags_raw = le_u16(buf, 6);
    let flags = PacketFlags::from_raw(flags_raw);
    if !flags.is_valid() {
        return Err(DecodeError::InvalidFlags { flags: flags_raw });
    }

    let payload_len = le_u32(buf, 28);
    let actual_payload_len = buf.len() - HEADER_SIZE;
    if payload_len as usize != actual_payload_len {
        return Err(DecodeError::PayloadLengthMismatch {
            header_len: payload_len,
            actual_len: actual_payload_len,
        });
    }

    Ok(PacketHeader {
        version,
        flags,
        registry_hash: le_u64(buf, 8),
        tick: le_u32(buf, 16),
        sequence: le_u32(buf, 20),
        echo_tick: le_u32(buf, 24),
        payload_len,
    })
}

/// Decodes a wire packet into header + section slices.
pub fn decode_packet<'a>(buf: &'a [u8], limits: &Limits) -> WireResult<WirePacket<'a>> {
    let header = decode_header(buf, limits)?;
    let sections = decode_sections(&buf[HEADER_SIZE..], limits)?;
    Ok(WirePacket { header, sections })
}

/// Decodes sections from a payload buffer (no packet header).
pub fn decode_sections<'a>(payload: &'a [u8], limits: &Limits) -> WireResult<Vec<WireSection<'a>>> {
    let mut offset = 0usize;
    let mut sections = Vec::new();

    while offset < payload.len() {
        if sections.len() >= limits.max_sections {
            return Err(DecodeError::LimitsExceeded {
                kind: LimitKind::SectionCount,
                limit: limits.max_sections,
                actual: sections.len() + 1,
            });
        }

        let tag = payload[offset];
        offset += 1;
        let (len, new_offset) = read_varu32(payload, offset)?;
        offset = new_offset;
        let len = len as usize;

        if len > limits.max_section_len {
            return Err(DecodeError::LimitsExceeded {
                kind: LimitKind::SectionLength,
                limit: limits.max_section_len,
                actual: len,
            });
        }
        if offset + len > payload.len() {
            return Err(SectionFramingError::Truncated {
                needed: offset + len,
                available: payload.len(),
            }
            .into());
        }

        let tag = SectionTag::parse(tag)?;
        sections.push(WireSection {
            tag,
            body: &payload[offset..offset + len],
        });
        offset += len;
    }

    Ok(sections)
}

/// Encodes a packet header into the provided output buffer.
pub fn encode_header(header: &PacketHeader, out: &mut [u8]) -> Result<usize, EncodeError> {
    if out.len() < HEADER_SIZE {
        return Err(EncodeError::BufferTooSmall {
            needed: HEADER_SIZE,
            available: out.len(),
        });
    }

    out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    out[4..6].copy_from_slice(&header.version.to_le_bytes());
    out[6..8].copy_from_slice(&header.flags.raw().to_le_bytes());
    out[8..16].copy_from_slice(&header.registry_hash.to_le_bytes());
    out[16..20].copy_from_slice(&header.tick.to_le_bytes());
    out[20..24].copy_from_slice(&header.sequence.to_le_bytes());
    out[24..28].copy_from_slice(&header.echo_tick.to_le_bytes());
    out[28..32].copy_from_slice(&header.payload_len.to_le_bytes());

    Ok(HEADER_SIZE)
}

/// Encodes a single section into the provided output buffer.
pub fn encode_section(tag: SectionTag, body: &[u8], out: &mut [u8]) -> Result<usize, EncodeError> {
    let len_u32 = u32::try_from(body.len())
        .map_err(|_| EncodeError::LengthOverflow { length: body.len() })?;
    let needed = section_overhead(body.len()) + body.len();
    if out.len() < needed {
        return Err(EncodeError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }

    out[0] = tag as u8;
    let mut offset = 1;
    offset += write_varu32(len_u32, &mut out[offset..]);
    out[offset..offset + body.len()].copy_from_slice(body);
    Ok(needed)
}

/// Bytes of framing (tag + length varint) a section with `body_len` bytes costs.
pub const fn section_overhead(body_len: usize) -> usize {
    1 + varu32_len(body_len as u32)
}

/// Encodes a complete packet, filling in `header.payload_len`.
///
/// Empty sections are skipped.
pub fn encode_packet(
    mut header: PacketHeader,
    sections: &[(SectionTag, &[u8])],
    limits: &Limits,
) -> Result<Vec<u8>, EncodeError> {
    let present: Vec<_> = sections.iter().filter(|(_, body)| !body.is_empty()).collect();
    if present.len() > limits.max_sections {
        return Err(EncodeError::LimitsExceeded {
            kind: LimitKind::SectionCount,
            limit: limits.max_sections,
            actual: present.len(),
        });
    }
    let mut payload_len = 0usize;
    for (_, body) in &present {
        if body.len() > limits.max_section_len {
            return Err(EncodeError::LimitsExceeded {
                kind: LimitKind::SectionLength,
                limit: limits.max_section_len,
                actual: body.len(),
            });
        }
        payload_len += section_overhead(body.len()) + body.len();
    }
    let total = HEADER_SIZE + payload_len;
    if total > limits.max_packet_bytes {
        return Err(EncodeError::LimitsExceeded {
            kind: LimitKind::PacketBytes,
            limit: limits.max_packet_bytes,
            actual: total,
        });
    }

    header.payload_len =
        u32::try_from(payload_len).map_err(|_| EncodeError::LengthOverflow { length: payload_len })?;
    let mut out = vec![0u8; total];
    let mut offset = encode_header(&header, &mut out)?;
    for (tag, body) in present {
        offset += encode_section(*tag, body, &mut out[offset..])?;
    }
    debug_assert_eq!(offset, total);
    Ok(out)
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    u64::from(le_u32(buf, at)) | (u64::from(le_u32(buf, at + 4)) << 32)
}

fn read_varu32(buf: &[u8], mut offset: usize) -> Result<(u32, usize), DecodeError> {
    let mut value = 0u32;
    for shift in (0..35).step_by(7) {
        let Some(&byte) = buf.get(offset) else {
            return Err(SectionFramingError::Truncated {
                needed: offset + 1,
                available: buf.len(),
            }
            .into());
        };
        offset += 1;
        if shift == 28 && byte & 0xF0 != 0 {
            break;
        }
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, offset));
        }
    }
    Err(SectionFramingError::InvalidVarint.into())
}

fn write_varu32(mut value: u32, out: &mut [u8]) -> usize {
    let mut offset = 0;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out[offset] = byte;
        offset += 1;
        if value == 0 {
            break;
        }
    }
    offset
}

/// Bytes a LEB128 varint takes for `value`.
pub const fn varu32_len(mut value: u32) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

//! Snapshot acknowledgements.

use bitstream::{BitReader, BitWriter};
use tick::NetworkTick;
use wire::{PacketHeader, SectionTag};

use crate::error::{CodecError, CodecResult};

/// Ticks covered by an [`AckState`] mask.
pub const ACK_WINDOW: u32 = 64;

/// Which recent snapshot ticks a client has received.
///
/// Bit `i` of the mask means tick `last - i` was received; bit 0 is `last`
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckState {
    last: NetworkTick,
    mask: u64,
}

impl AckState {
    /// Nothing received yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: NetworkTick::INVALID,
            mask: 0,
        }
    }

    #[must_use]
    pub const fn from_parts(last: NetworkTick, mask: u64) -> Self {
        Self { last, mask }
    }

    /// Newest received tick, or invalid.
    #[must_use]
    pub const fn last(&self) -> NetworkTick {
        self.last
    }

    #[must_use]
    pub const fn mask(&self) -> u64 {
        self.mask
    }

    /// Marks `tick` as received.
    pub fn record(&mut self, tick: NetworkTick) {
        if !tick.is_valid() {
            return;
        }
        if !self.last.is_valid() {
            self.last = tick;
            self.mask = 1;
            return;
        }
        if tick.is_newer_than(self.last) {
            let shift = tick.ticks_since(self.last).unsigned_abs();
            self.mask = if shift >= ACK_WINDOW { 0 } else { self.mask << shift };
            self.mask |= 1;
            self.last = tick;
        } else {
            let back = self.last.ticks_since(tick).unsigned_abs();
            if back < ACK_WINDOW {
                self.mask |= 1 << back;
            }
        }
    }

    /// Whether `tick` is known to have been received.
    #[must_use]
    pub fn contains(&self, tick: NetworkTick) -> bool {
        if !tick.is_valid() || !self.last.is_valid() || tick.is_newer_than(self.last) {
            return false;
        }
        let back = self.last.ticks_since(tick).unsigned_abs();
        back < ACK_WINDOW && self.mask & (1 << back) != 0
    }
}

/// Body of a client's ack packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotAck {
    /// Snapshot ticks received.
    pub received: AckState,
    /// Client predicted tick, i.e. the tick its commands are for.
    pub client_tick: NetworkTick,
    /// Newest server tick seen, echoed back for RTT estimation.
    pub echo_tick: NetworkTick,
}

impl SnapshotAck {
    /// Encoded size of the ack section body.
    pub const BODY_LEN: usize = 4 + 8 + 4 + 4;

    pub fn encode_body(&self) -> CodecResult<Vec<u8>> {
        let mut writer = BitWriter::with_capacity(Self::BODY_LEN);
        writer.write_u32_aligned(self.received.last().raw())?;
        writer.write_u64_aligned(self.received.mask())?;
        writer.write_u32_aligned(self.client_tick.raw())?;
        writer.write_u32_aligned(self.echo_tick.raw())?;
        Ok(writer.finish())
    }

    pub fn decode_body(body: &[u8]) -> CodecResult<Self> {
        let mut reader = BitReader::new(body);
        let last = NetworkTick::from_raw(reader.read_u32_aligned()?);
        let mask = reader.read_u64_aligned()?;
        let client_tick = NetworkTick::from_raw(reader.read_u32_aligned()?);
        let echo_tick = NetworkTick::from_raw(reader.read_u32_aligned()?);
        Ok(Self {
            received: AckState::from_parts(last, mask),
            client_tick,
            echo_tick,
        })
    }
}

/// Encodes a complete client→server ack packet.
pub fn encode_ack_packet(
    registry_hash: u64,
    sequence: u32,
    ack: &SnapshotAck,
    limits: &wire::Limits,
) -> CodecResult<Vec<u8>> {
    let body = ack.encode_body()?;
    let header = PacketHeader::ack(
        registry_hash,
        ack.client_tick.raw(),
        sequence,
        ack.echo_tick.raw(),
        0,
    );
    Ok(wire::encode_packet(
        header,
        &[(SectionTag::SnapshotAck, body.as_slice())],
        limits,
    )?)
}

/// Decodes a client→server ack packet, checking the registry hash.
pub fn decode_ack_packet(
    bytes: &[u8],
    registry_hash: u64,
    limits: &wire::Limits,
) -> CodecResult<(PacketHeader, SnapshotAck)> {
    let packet = wire::decode_packet(bytes, limits)?;
    if !packet.header.flags.is_ack() {
        return Err(CodecError::UnexpectedPacket { expected: "ack" });
    }
    if packet.header.registry_hash != registry_hash {
        return Err(CodecError::RegistryMismatch {
            expected: registry_hash,
            found: packet.header.registry_hash,
        });
    }
    let body = packet
        .section(SectionTag::SnapshotAck)
        .ok_or(CodecError::MissingSection {
            section: SectionTag::SnapshotAck,
        })?;
    Ok((packet.header, SnapshotAck::decode_body(body)?))
}

//! Packet header types and constants.

/// Magic number identifying ghostwire packets.
///
/// This value is fixed and must never change across versions.
pub const MAGIC: u32 = 0x4748_5354; // "GHST" in ASCII

/// Current wire format version.
pub const VERSION: u16 = 1;

/// Header size in bytes (32 total).
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 8 + 4 + 4 + 4 + 4;

/// Packet flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    /// Server-to-client ghost snapshot.
    pub const SNAPSHOT: u16 = 1 << 0;

    /// Client-to-server snapshot acknowledgement.
    pub const ACK: u16 = 1 << 1;

    /// Reserved bits mask (must be zero in version 1).
    const RESERVED_MASK: u16 = !0b11;

    /// Creates new flags from a raw value.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        self.0 & Self::SNAPSHOT != 0
    }

    #[must_use]
    pub const fn is_ack(self) -> bool {
        self.0 & Self::ACK != 0
    }

    /// Returns `true` if exactly one packet kind is set and no reserved bits are set.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        let has_reserved = self.0 & Self::RESERVED_MASK != 0;
        (self.is_snapshot() ^ self.is_ack()) && !has_reserved
    }

    #[must_use]
    pub const fn snapshot() -> Self {
        Self(Self::SNAPSHOT)
    }

    #[must_use]
    pub const fn ack() -> Self {
        Self(Self::ACK)
    }
}

/// Packet header.
///
/// The magic number is validated during decoding and is not stored here.
/// Tick fields carry raw network tick values (0 = invalid / none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Wire format version.
    pub version: u16,
    /// Packet flags.
    pub flags: PacketFlags,
    /// Registry hash for compatibility checking.
    pub registry_hash: u64,
    /// Sender's tick: server tick for snapshots, client predicted tick for acks.
    pub tick: u32,
    /// Monotonic per-connection packet sequence.
    pub sequence: u32,
    /// Latest tick received from the peer, echoed back for RTT estimation.
    pub echo_tick: u32,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl PacketHeader {
    /// Creates a header for a snapshot packet.
    #[must_use]
    pub const fn snapshot(
        registry_hash: u64,
        tick: u32,
        sequence: u32,
        echo_tick: u32,
        payload_len: u32,
    ) -> Self {
        Self {
            version: VERSION,
            flags: PacketFlags::snapshot(),
            registry_hash,
            tick,
            sequence,
            echo_tick,
            payload_len,
        }
    }

    /// Creates a header for an ack packet.
    #[must_use]
    pub const fn ack(
        registry_hash: u64,
        tick: u32,
        sequence: u32,
        echo_tick: u32,
        payload_len: u32,
    ) -> Self {
        Self {
            version: VERSION,
            flags: PacketFlags::ack(),
            registry_hash,
            tick,
            sequence,
            echo_tick,
            payload_len,
        }
    }
}

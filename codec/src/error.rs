//! Error types for codec operations.

use std::fmt;

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building, encoding or decoding snapshots.
///
/// Errors raised while decoding a single ghost record are protocol
/// consistency errors: the receiver drops that ghost's update and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Wire framing error; the whole packet is dropped.
    #[error("wire error: {0}")]
    Wire(#[from] wire::DecodeError),

    /// Wire framing failed while encoding.
    #[error("wire encode error: {0}")]
    WireEncode(#[from] wire::EncodeError),

    /// Bitstream error, usually a truncated record.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] bitstream::BitError),

    /// Registry lookup failed.
    #[error("registry error: {0}")]
    Schema(#[from] schema::SchemaError),

    /// A configuration value is out of range.
    #[error("invalid codec config `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// Peer built a different registry.
    #[error("registry hash mismatch: expected 0x{expected:016X}, found 0x{found:016X}")]
    RegistryMismatch { expected: u64, found: u64 },

    /// Packet kind does not match what the caller expected.
    #[error("unexpected packet: expected {expected}")]
    UnexpectedPacket { expected: &'static str },

    /// A tick received from the peer is not a valid network tick.
    #[error("invalid network tick 0x{raw:08X}")]
    InvalidTick { raw: u32 },

    /// A required section is missing.
    #[error("missing section {section:?}")]
    MissingSection { section: wire::SectionTag },

    /// Limits exceeded.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// A record references a baseline the receiver no longer holds.
    #[error("baseline tick {tick} not found for ghost {ghost}")]
    BaselineNotFound { ghost: u32, tick: u32 },

    /// Baseline distances must be positive and strictly increasing.
    #[error("invalid baseline distance {distance} for ghost {ghost}")]
    InvalidBaselineDistance { ghost: u32, distance: u32 },

    /// A ghost was referenced that does not exist.
    #[error("ghost {ghost} not found")]
    GhostNotFound { ghost: u32 },

    /// A record's type disagrees with the ghost's known type.
    #[error("ghost {ghost} changed type from {expected} to {found}")]
    GhostTypeMismatch { ghost: u32, expected: u16, found: u16 },

    /// Dynamic data referenced by a record lies outside the dynamic section.
    #[error("dynamic range {offset}+{len} bits outside {available} bits")]
    DynamicOutOfRange {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// A component or field name is not part of the ghost type.
    #[error("unknown field `{component}.{field}`")]
    UnknownField { component: String, field: String },

    /// A component was used as the wrong kind.
    #[error("component `{component}` is {actual}")]
    ComponentKindMismatch {
        component: String,
        actual: &'static str,
    },

    /// A value does not match the field's declared type.
    #[error("field `{field}` expects {expected:?}, got {found}")]
    ValueTypeMismatch {
        field: String,
        expected: schema::FieldTypeKind,
        found: &'static str,
    },

    /// An integer does not fit the field's bit width.
    #[error("value {value} out of range for {bits}-bit field `{field}`")]
    ValueOutOfRange { field: String, value: i64, bits: u8 },

    /// A string exceeds the field's byte capacity.
    #[error("string of {len} bytes exceeds {max} for field `{field}`")]
    StringTooLong { field: String, len: usize, max: u16 },

    /// A buffer element index is out of range.
    #[error("element {index} out of range for buffer `{component}` of {len}")]
    ElementOutOfRange {
        component: String,
        index: usize,
        len: usize,
    },

    /// A buffer is already at its declared capacity.
    #[error("buffer `{component}` full at {max} elements")]
    BufferFull { component: String, max: usize },

    /// Snapshot data does not match the ghost type's layout.
    #[error("snapshot layout mismatch: expected {expected} slots, found {found}")]
    LayoutMismatch { expected: usize, found: usize },

    /// A snapshot too old to keep: older than the newest entry of a strict
    /// history, or than every entry of a full one.
    #[error("stale tick {tick}: history holds {last}")]
    StaleTick { last: u32, tick: u32 },
}

/// Specific codec limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    GhostsPerPacket,
    DespawnsPerPacket,
    BufferElements,
    SectionBytes,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GhostsPerPacket => "ghosts per packet",
            Self::DespawnsPerPacket => "despawns per packet",
            Self::BufferElements => "buffer elements",
            Self::SectionBytes => "section bytes",
        };
        write!(f, "{name}")
    }
}

impl CodecError {
    /// Whether this error only invalidates one ghost record.
    #[must_use]
    pub const fn is_per_ghost(&self) -> bool {
        matches!(
            self,
            Self::BaselineNotFound { .. }
                | Self::GhostNotFound { .. }
                | Self::GhostTypeMismatch { .. }
                | Self::InvalidBaselineDistance { .. }
                | Self::DynamicOutOfRange { .. }
            | Self::StaleTick { .. }
                | Self::LimitsExceeded {
                    kind: LimitKind::BufferElements,
                    ..
                }
        )
    }
}

//! Error types for wire format operations.

use std::fmt;

use thiserror::Error;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, DecodeError>;

/// High-level decode errors for wire framing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Packet is too small to contain the required header.
    #[error("packet too small: {actual} bytes, need at least {required}")]
    PacketTooSmall { actual: usize, required: usize },

    /// Invalid magic number in packet header.
    #[error("invalid magic number: 0x{found:08X}")]
    InvalidMagic { found: u32 },

    /// Unsupported wire version.
    #[error("unsupported wire version: {found}")]
    UnsupportedVersion { found: u16 },

    /// Invalid flags combination.
    #[error("invalid flags: 0x{flags:04X}")]
    InvalidFlags { flags: u16 },

    /// Payload length mismatch.
    #[error("payload length mismatch: header {header_len} bytes but {actual_len} available")]
    PayloadLengthMismatch { header_len: u32, actual_len: usize },

    /// Unknown section tag encountered.
    #[error("unknown section tag: {tag}")]
    UnknownSectionTag { tag: u8 },

    /// Limits exceeded.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Section framing error.
    #[error("section framing error: {0}")]
    SectionFraming(#[from] SectionFramingError),
}

/// Specific wire limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    PacketBytes,
    SectionCount,
    SectionLength,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PacketBytes => "packet bytes",
            Self::SectionCount => "section count",
            Self::SectionLength => "section length",
        };
        write!(f, "{name}")
    }
}

/// Errors that can occur while framing sections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionFramingError {
    #[error("invalid varint")]
    InvalidVarint,
    #[error("truncated section: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

/// Errors that can occur during encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("length overflow: {length}")]
    LengthOverflow { length: usize },
    #[error("{kind} limit exceeded while encoding: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },
}

//! Error types for stats encoding.

use thiserror::Error;

/// Result type for stats operations.
pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StatsError {
    #[error("bitstream error: {0}")]
    Bitstream(#[from] bitstream::BitError),

    /// Not a stats packet.
    #[error("bad stats packet magic 0x{found:08X}")]
    BadMagic { found: u32 },

    /// A list is too long for its u16 count.
    #[error("too many {what}: {count}")]
    TooMany { what: &'static str, count: usize },

    /// Bytes left over after the last record.
    #[error("{remaining} trailing bytes in stats packet")]
    TrailingBytes { remaining: usize },
}

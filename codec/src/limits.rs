//! Limits and history sizes for the codec.

use crate::error::{CodecError, CodecResult};

/// Codec-specific limits enforced while encoding and decoding snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum number of ghost records in one packet.
    pub max_ghosts_per_packet: usize,
    /// Maximum number of despawns in one packet.
    pub max_despawns_per_packet: usize,
    /// Maximum number of elements a decoded dynamic buffer may claim.
    pub max_buffer_elements: usize,
    /// Maximum number of bytes in a section body.
    pub max_section_bytes: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_ghosts_per_packet: 1024,
            max_despawns_per_packet: 1024,
            max_buffer_elements: 1024,
            max_section_bytes: 64 * 1024,
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_ghosts_per_packet: 64,
            max_despawns_per_packet: 32,
            max_buffer_elements: 64,
            max_section_bytes: 4096,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_ghosts_per_packet: usize::MAX,
            max_despawns_per_packet: usize::MAX,
            max_buffer_elements: usize::MAX,
            max_section_bytes: usize::MAX,
        }
    }
}

/// Snapshot history sizes on both sides of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Snapshots kept per ghost on the client.
    pub client_history: usize,
    /// Sent snapshots kept per ghost and connection on the server, awaiting ack.
    pub sent_history: usize,
    /// Acknowledged baselines kept per ghost and connection (at most 3).
    pub acked_baselines: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            client_history: 32,
            sent_history: 32,
            acked_baselines: 3,
        }
    }
}

impl HistoryConfig {
    /// Smaller histories that make eviction easy to observe.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            client_history: 4,
            sent_history: 8,
            acked_baselines: 3,
        }
    }

    pub fn validate(&self) -> CodecResult<()> {
        if self.client_history == 0 {
            return Err(CodecError::InvalidConfig {
                field: "client_history",
                reason: "must be positive",
            });
        }
        if self.sent_history == 0 {
            return Err(CodecError::InvalidConfig {
                field: "sent_history",
                reason: "must be positive",
            });
        }
        if !(1..=3).contains(&self.acked_baselines) {
            return Err(CodecError::InvalidConfig {
                field: "acked_baselines",
                reason: "must be in 1..=3",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_reasonable() {
        let limits = CodecLimits::default();
        assert!(limits.max_ghosts_per_packet >= 128);
        assert!(limits.max_section_bytes >= 1024);
    }

    #[test]
    fn testing_limits_smaller() {
        let test_limits = CodecLimits::for_testing();
        let default_limits = CodecLimits::default();
        assert!(test_limits.max_ghosts_per_packet < default_limits.max_ghosts_per_packet);
        assert!(test_limits.max_section_bytes < default_limits.max_section_bytes);
    }

    #[test]
    fn unlimited_limits() {
        let limits = CodecLimits::unlimited();
        assert_eq!(limits.max_ghosts_per_packet, usize::MAX);
        assert_eq!(limits.max_section_bytes, usize::MAX);
    }

    #[test]
    fn history_validation() {
        assert!(HistoryConfig::default().validate().is_ok());
        let too_many = HistoryConfig {
            acked_baselines: 4,
            ..HistoryConfig::default()
        };
        assert!(too_many.validate().is_err());
    }
}

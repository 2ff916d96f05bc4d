//! Configurable limits for bounded decoding.

/// Wire-level limits for packet encoding and decoding.
///
/// These limits are enforced during decoding to prevent resource exhaustion
/// and keep memory usage bounded. Section body parsing limits belong to the
/// codec layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum packet size in bytes.
    pub max_packet_bytes: usize,

    /// Maximum number of sections in a packet.
    pub max_sections: usize,

    /// Maximum length of a single section body in bytes.
    pub max_section_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // Stays under a typical 1500-byte MTU after UDP/IP overhead.
            max_packet_bytes: 1400,
            max_sections: 8,
            max_section_len: 1400,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_packet_bytes: 512,
            max_sections: 4,
            max_section_len: 480,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_packet_bytes: usize::MAX,
            max_sections: usize::MAX,
            max_section_len: usize::MAX,
        }
    }

    /// Returns a copy with a different packet size cap.
    #[must_use]
    pub const fn with_max_packet_bytes(mut self, bytes: usize) -> Self {
        self.max_packet_bytes = bytes;
        if self.max_section_len > bytes {
            self.max_section_len = bytes;
        }
        self
    }
}

//! Reusable scratch buffers for codec operations.

use bitstream::BitWriter;

/// Scratch buffers for encoding and decoding ghost records.
///
/// A ghost is encoded into [`record`](Self::record) and
/// [`dynamic`](Self::dynamic) first and only appended to the packet once it
/// is known to fit, so a packet never holds a partial record.
#[derive(Debug, Default)]
pub struct CodecScratch {
    pub(crate) record: BitWriter,
    pub(crate) dynamic: BitWriter,
    pub(crate) predicted: Vec<u32>,
    pub(crate) zeros: Vec<u32>,
}

impl CodecScratch {
    /// Creates a new scratch buffer with no pre-allocated capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits of the last encoded record.
    #[must_use]
    pub fn record(&self) -> &BitWriter {
        &self.record
    }

    /// Bits of the last encoded record's dynamic buffers.
    #[must_use]
    pub fn dynamic(&self) -> &BitWriter {
        &self.dynamic
    }

    pub(crate) fn reset_writers(&mut self) {
        self.record.clear();
        self.dynamic.clear();
    }
}

//! Bit-level writer for encoding packed binary data.

use crate::error::{BitError, BitResult};
use crate::packed::{zigzag_encode, PACKED_CLASSES};

/// A bit-level writer for encoding packed binary data.
///
/// Bits are written MSB-first into an internal buffer. Call
/// [`finish`](Self::finish) to get the final byte buffer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    /// The accumulated bytes.
    bytes: Vec<u8>,
    /// Current byte being written (not yet pushed to bytes).
    current_byte: u8,
    /// Number of bits written to `current_byte` (0-7).
    bit_count: u8,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }

    /// Returns the number of bytes [`finish`](Self::finish) would produce.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bits_written().div_ceil(8)
    }

    /// Clears the writer for reuse, keeping its allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.current_byte = 0;
        self.bit_count = 0;
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, value: bool) {
        self.current_byte = (self.current_byte << 1) | u8::from(value);
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// Writes up to 64 bits from an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 64`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }

        if self.bit_count == 0 && bits % 8 == 0 {
            for i in (0..bits / 8).rev() {
                self.bytes.push((value >> (u32::from(i) * 8)) as u8);
            }
            return Ok(());
        }
        for i in (0..bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        while self.bit_count != 0 {
            self.write_bit(false);
        }
    }

    /// Writes a byte-aligned `u8`.
    pub fn write_u8_aligned(&mut self, value: u8) -> BitResult<()> {
        self.ensure_aligned()?;
        self.bytes.push(value);
        Ok(())
    }

    /// Writes a byte-aligned `u16` (little-endian).
    pub fn write_u16_aligned(&mut self, value: u16) -> BitResult<()> {
        self.write_aligned_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u32` (little-endian).
    pub fn write_u32_aligned(&mut self, value: u32) -> BitResult<()> {
        self.write_aligned_bytes(&value.to_le_bytes())
    }

    /// Writes a byte-aligned `u64` (little-endian).
    pub fn write_u64_aligned(&mut self, value: u64) -> BitResult<()> {
        self.write_aligned_bytes(&value.to_le_bytes())
    }

    /// Writes raw bytes at a byte boundary.
    pub fn write_aligned_bytes(&mut self, data: &[u8]) -> BitResult<()> {
        self.ensure_aligned()?;
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Writes a byte-aligned LEB128 varint `u32`.
    pub fn write_varu32(&mut self, mut value: u32) -> BitResult<()> {
        self.ensure_aligned()?;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.bytes.push(byte);
                return Ok(());
            }
            self.bytes.push(byte | 0x80);
        }
    }

    /// Writes a byte-aligned zigzag varint `i32`.
    pub fn write_vars32(&mut self, value: i32) -> BitResult<()> {
        self.write_varu32(zigzag_encode(value))
    }

    /// Writes an unaligned prefix-coded `u32`.
    ///
    /// Small values are cheap: zero costs a single bit.
    pub fn write_packed_u32(&mut self, value: u32) {
        for (class, &(prefix_bits, payload_bits)) in PACKED_CLASSES.iter().enumerate() {
            let last = class + 1 == PACKED_CLASSES.len();
            if last || u64::from(value) < (1u64 << payload_bits) {
                let ones = prefix_bits - u8::from(!last);
                for _ in 0..ones {
                    self.write_bit(true);
                }
                if !last {
                    self.write_bit(false);
                }
                for i in (0..payload_bits).rev() {
                    self.write_bit((value >> i) & 1 == 1);
                }
                return;
            }
        }
    }

    /// Writes an unaligned prefix-coded zigzag `i32`.
    pub fn write_packed_i32(&mut self, value: i32) {
        self.write_packed_u32(zigzag_encode(value));
    }

    /// Appends every bit written to `other`, preserving bit alignment.
    pub fn append(&mut self, other: &Self) {
        if self.bit_count == 0 {
            self.bytes.extend_from_slice(&other.bytes);
        } else {
            for &byte in &other.bytes {
                for i in (0..8).rev() {
                    self.write_bit((byte >> i) & 1 == 1);
                }
            }
        }
        for i in (0..other.bit_count).rev() {
            self.write_bit((other.current_byte >> i) & 1 == 1);
        }
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, it is padded with zeros on the right.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_partial();
        self.bytes
    }

    /// Finishes writing and appends to the provided buffer.
    pub fn finish_into(mut self, buf: &mut Vec<u8>) {
        self.flush_partial();
        buf.append(&mut self.bytes);
    }

    fn flush_partial(&mut self) {
        if self.bit_count > 0 {
            self.current_byte <<= 8 - self.bit_count;
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    fn ensure_aligned(&self) -> BitResult<()> {
        if self.bit_count != 0 {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bits_written(),
            });
        }
        Ok(())
    }
}

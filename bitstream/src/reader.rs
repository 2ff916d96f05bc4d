//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};
use crate::packed::{zigzag_decode, PACKED_CLASSES};

/// A bit-level reader for decoding packed binary data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Moves the cursor to an absolute bit position.
    pub fn seek_bits(&mut self, bit_position: usize) -> BitResult<()> {
        let total = self.data.len().saturating_mul(8);
        if bit_position > total {
            return Err(BitError::UnexpectedEof {
                requested: bit_position,
                available: total,
            });
        }
        self.bit_pos = bit_position;
        Ok(())
    }

    /// Reads a single bit as a boolean.
    pub fn read_bit(&mut self) -> BitResult<bool> {
        self.ensure_bits(1)?;
        let byte_idx = self.bit_pos / 8;
        let bit_idx = self.bit_pos % 8;
        let bit = (self.data[byte_idx] >> (7 - bit_idx)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 64 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits as usize)?;

        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Aligns to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let rem = self.bit_pos % 8;
        if rem == 0 {
            return Ok(());
        }
        let skip = 8 - rem;
        self.ensure_bits(skip)?;
        self.bit_pos += skip;
        Ok(())
    }

    /// Reads a byte-aligned `u8`.
    pub fn read_u8_aligned(&mut self) -> BitResult<u8> {
        let [value] = self.read_aligned_array::<1>()?;
        Ok(value)
    }

    /// Reads a byte-aligned `u16` (little-endian).
    pub fn read_u16_aligned(&mut self) -> BitResult<u16> {
        Ok(u16::from_le_bytes(self.read_aligned_array::<2>()?))
    }

    /// Reads a byte-aligned `u32` (little-endian).
    pub fn read_u32_aligned(&mut self) -> BitResult<u32> {
        Ok(u32::from_le_bytes(self.read_aligned_array::<4>()?))
    }

    /// Reads a byte-aligned `u64` (little-endian).
    pub fn read_u64_aligned(&mut self) -> BitResult<u64> {
        Ok(u64::from_le_bytes(self.read_aligned_array::<8>()?))
    }

    /// Reads `len` raw bytes at a byte boundary, borrowing from the input.
    pub fn read_aligned_bytes(&mut self, len: usize) -> BitResult<&'a [u8]> {
        self.ensure_aligned()?;
        self.ensure_bits(len.saturating_mul(8))?;
        let idx = self.bit_pos / 8;
        let out = &self.data[idx..idx + len];
        self.bit_pos += len * 8;
        Ok(out)
    }

    /// Reads a byte-aligned varint `u32`.
    pub fn read_varu32(&mut self) -> BitResult<u32> {
        self.ensure_aligned()?;
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8_aligned()?;
            if shift == 28 && byte & 0xF0 != 0 {
                return Err(BitError::InvalidVarint);
            }
            result |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(BitError::InvalidVarint)
    }

    /// Reads a byte-aligned zigzag varint `i32`.
    pub fn read_vars32(&mut self) -> BitResult<i32> {
        Ok(zigzag_decode(self.read_varu32()?))
    }

    /// Reads an unaligned prefix-coded `u32`.
    pub fn read_packed_u32(&mut self) -> BitResult<u32> {
        let last = PACKED_CLASSES.len() - 1;
        let mut class = 0;
        while class < last && self.read_bit()? {
            class += 1;
        }
        let (_, payload_bits) = PACKED_CLASSES[class];
        Ok(self.read_bits(payload_bits)? as u32)
    }

    /// Reads an unaligned prefix-coded zigzag `i32`.
    pub fn read_packed_i32(&mut self) -> BitResult<i32> {
        Ok(zigzag_decode(self.read_packed_u32()?))
    }

    fn ensure_aligned(&self) -> BitResult<()> {
        if self.bit_pos % 8 != 0 {
            return Err(BitError::MisalignedAccess {
                bit_position: self.bit_pos,
            });
        }
        Ok(())
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEof {
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    fn read_aligned_array<const N: usize>(&mut self) -> BitResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_aligned_bytes(N)?);
        Ok(out)
    }
}

//! Prefix-coded integer size classes shared by reader and writer.
//!
//! | prefix | payload |
//! |--------|---------|
//! | `0`    | 0 bits (value 0) |
//! | `10`   | 4 bits  |
//! | `110`  | 8 bits  |
//! | `1110` | 16 bits |
//! | `1111` | 32 bits |

/// `(prefix_bits, payload_bits)` per class, smallest first.
pub(crate) const PACKED_CLASSES: [(u8, u8); 5] = [(1, 0), (2, 4), (3, 8), (4, 16), (4, 32)];

pub(crate) const fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

pub(crate) const fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ (-((value & 1) as i32))
}

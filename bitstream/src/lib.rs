//! Low-level bit packing primitives for the ghostwire snapshot protocol.
//!
//! This crate provides [`BitWriter`] and [`BitReader`] for bit-level encoding and decoding,
//! byte-aligned little-endian integers, LEB128 varints and prefix-coded "packed" integers
//! used for field deltas.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked.
//! - **No domain knowledge** - This crate knows nothing about ghosts, ticks, or game state.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitWriter, BitReader};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bit(true);
//! writer.write_bits(42, 7).unwrap();
//! writer.write_packed_i32(-3);
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bit().unwrap());
//! assert_eq!(reader.read_bits(7).unwrap(), 42);
//! assert_eq!(reader.read_packed_i32().unwrap(), -3);
//! ```

mod error;
mod packed;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use reader::BitReader;
pub use writer::BitWriter;

//! Wire framing and packet layout for the ghostwire snapshot protocol.
//!
//! This crate handles the binary wire format: packet headers, section framing,
//! and limit enforcement. It does not know about ghosts or field codecs, only
//! the structure of packets.
//!
//! # Design Principles
//!
//! - **Stable wire format** - The format is versioned and the header layout is fixed.
//! - **Bounded decoding** - All length fields are validated against limits before iteration.
//! - **No domain knowledge** - This crate handles framing, not game logic.

mod error;
mod header;
mod limits;
mod packet;

pub use error::{DecodeError, EncodeError, LimitKind, SectionFramingError, WireResult};
pub use header::{PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
pub use limits::Limits;
pub use packet::{
    decode_header, decode_packet, decode_sections, encode_header, encode_packet, encode_section,
    section_overhead, varu32_len, SectionTag, WirePacket, WireSection,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn header_size_constant_correct() {
        assert_eq!(
            HEADER_SIZE,
            size_of::<u32>() // magic
                + size_of::<u16>() // version
                + size_of::<u16>() // flags
                + size_of::<u64>() // registry_hash
                + size_of::<u32>() // tick
                + size_of::<u32>() // sequence
                + size_of::<u32>() // echo_tick
                + size_of::<u32>() // payload_len
        );
    }

    #[test]
    fn default_limits_fit_one_mtu() {
        let limits = Limits::default();
        assert!(limits.max_packet_bytes <= 1500);
        assert!(limits.max_section_len <= limits.max_packet_bytes);
    }
}

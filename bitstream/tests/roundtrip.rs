use bitstream::{BitError, BitReader, BitWriter};

#[test]
fn writer_roundtrip_mixed() {
    let mut writer = BitWriter::new();
    writer.write_bit(true);
    writer.write_bits(0b1010, 4).unwrap();
    writer.align_to_byte();
    writer.write_u16_aligned(0xBEEF).unwrap();
    writer.write_varu32(300).unwrap();
    writer.write_vars32(-1).unwrap();
    writer.write_packed_i32(-17);
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    assert!(reader.read_bit().unwrap());
    assert_eq!(reader.read_bits(4).unwrap(), 0b1010);
    reader.align_to_byte().unwrap();
    assert_eq!(reader.read_u16_aligned().unwrap(), 0xBEEF);
    assert_eq!(reader.read_varu32().unwrap(), 300);
    assert_eq!(reader.read_vars32().unwrap(), -1);
    assert_eq!(reader.read_packed_i32().unwrap(), -17);
}

#[test]
fn scratch_append_matches_direct_write() {
    let mut direct = BitWriter::new();
    direct.write_bits(0b11, 2).unwrap();
    direct.write_packed_u32(1234);
    direct.write_bit(false);

    let mut scratch = BitWriter::new();
    scratch.write_packed_u32(1234);
    scratch.write_bit(false);
    let mut joined = BitWriter::new();
    joined.write_bits(0b11, 2).unwrap();
    joined.append(&scratch);

    assert_eq!(joined.bits_written(), direct.bits_written());
    assert_eq!(joined.finish(), direct.finish());
}

#[test]
fn truncated_input_never_panics() {
    let mut writer = BitWriter::new();
    writer.write_packed_u32(u32::MAX);
    let bytes = writer.finish();
    for len in 0..bytes.len() {
        let mut reader = BitReader::new(&bytes[..len]);
        assert!(matches!(
            reader.read_packed_u32(),
            Err(BitError::UnexpectedEof { .. })
        ));
    }
}

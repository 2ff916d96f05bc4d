#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Input bytes drive a bounded sequence of reads.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 8;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bit();
            }
            1 => {
                let bits = (data[idx.saturating_sub(1)] % 64).saturating_add(1);
                let _ = reader.read_bits(bits);
            }
            2 => {
                let _ = reader.align_to_byte();
            }
            3 => {
                let _ = reader.read_u32_aligned();
            }
            4 => {
                let _ = reader.read_varu32();
            }
            5 => {
                let _ = reader.read_vars32();
            }
            6 => {
                let _ = reader.read_packed_i32();
            }
            _ => {
                let target = usize::from(data[idx.saturating_sub(1)]) * 3;
                let _ = reader.seek_bits(target);
            }
        }
    }
});

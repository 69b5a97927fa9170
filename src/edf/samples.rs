//! Little-endian sample codec.
//!
//! Values are expected to be clamped into the file type's digital limits before
//! encoding; bits beyond the sample width are dropped.

use super::FileType;

/// Appends the encoding of one sample to `out`.
#[inline]
pub fn encode_sample(file_type: FileType, value: i32, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes()[..file_type.bytes_per_sample()]);
}

/// Appends the encoding of `values` to `out`.
pub fn encode_into(file_type: FileType, values: &[i32], out: &mut Vec<u8>) {
    out.reserve(values.len() * file_type.bytes_per_sample());
    for &value in values {
        encode_sample(file_type, value, out);
    }
}

/// Decodes one sample from the first `bytes_per_sample` bytes of `bytes`.
#[inline]
pub fn decode(file_type: FileType, bytes: &[u8]) -> i32 {
    match file_type {
        FileType::Edf => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        FileType::Bdf => {
            let sign = if bytes[2] & 0x80 != 0 { 0xFF } else { 0x00 };
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], sign])
        }
    }
}

/// Decodes every complete sample in `bytes`, appending to `out`.
pub fn decode_into(file_type: FileType, bytes: &[u8], out: &mut Vec<i32>) {
    let width = file_type.bytes_per_sample();
    out.extend(bytes.chunks_exact(width).map(|chunk| decode(file_type, chunk)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edf_samples_are_two_byte_little_endian() {
        let mut out = Vec::new();
        encode_into(FileType::Edf, &[1, -2, 0x1234], &mut out);
        assert_eq!(out, vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);

        let mut decoded = Vec::new();
        decode_into(FileType::Edf, &out, &mut decoded);
        assert_eq!(decoded, vec![1, -2, 0x1234]);
    }

    #[test]
    fn bdf_samples_sign_extend() {
        let mut out = Vec::new();
        encode_into(FileType::Bdf, &[-1, 8_388_607, -8_388_608], &mut out);
        assert_eq!(
            out,
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0x00, 0x00, 0x80]
        );

        let mut decoded = Vec::new();
        decode_into(FileType::Bdf, &out, &mut decoded);
        assert_eq!(decoded, vec![-1, 8_388_607, -8_388_608]);
    }
}

//! EDF and BDF file storage.
//!
//! A file is a fixed-width ASCII header followed by data records. Each record holds
//! every signal's samples for one record duration as contiguous little-endian
//! blocks, 2 bytes per sample for EDF and 3 bytes per sample for BDF.
//!
//! - [`header`]: header layout, encoding and decoding.
//! - [`samples`]: sample byte codec.
//! - [`writer`]: the terminal pipeline stage writing a file.
//! - [`reader`]: random-access reading with per-signal cursors.

pub mod header;
pub mod reader;
pub mod samples;
pub mod writer;

pub use header::{header_size, EdfHeader};
pub use reader::EdfReader;
pub use writer::{CloseHandle, EdfWriter, WriterOptions};

use serde::{Deserialize, Serialize};

/// On-disk sample width, selected by the header's version field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// European Data Format, 16-bit samples.
    #[default]
    Edf,
    /// BioSemi Data Format, 24-bit samples.
    Bdf,
}

const BDF_MIN: i32 = -(1 << 23);
const BDF_MAX: i32 = (1 << 23) - 1;

impl FileType {
    /// Bytes used to store one sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            FileType::Edf => 2,
            FileType::Bdf => 3,
        }
    }

    /// Smallest and largest digital value the sample width can hold.
    pub fn digital_limits(self) -> (i32, i32) {
        match self {
            FileType::Edf => (i32::from(i16::MIN), i32::from(i16::MAX)),
            FileType::Bdf => (BDF_MIN, BDF_MAX),
        }
    }

    /// The 8-byte version field identifying this format.
    pub fn version_field(self) -> [u8; 8] {
        match self {
            FileType::Edf => *b"0       ",
            FileType::Bdf => [0xFF, b'B', b'I', b'O', b'S', b'E', b'M', b'I'],
        }
    }

    /// Identifies the format from a version field.
    pub fn from_version_field(field: &[u8]) -> Option<Self> {
        if field.first() == Some(&0xFF) && field.get(1..8) == Some(b"BIOSEMI".as_slice()) {
            return Some(FileType::Bdf);
        }
        match std::str::from_utf8(field).map(str::trim) {
            Ok("0") => Some(FileType::Edf),
            _ => None,
        }
    }

    /// Text stored in the general header's reserved field.
    pub(crate) fn reserved_field(self) -> &'static str {
        match self {
            FileType::Edf => "",
            FileType::Bdf => "24BIT",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Edf => write!(f, "EDF"),
            FileType::Bdf => write!(f, "BDF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_field_identifies_format() {
        for file_type in [FileType::Edf, FileType::Bdf] {
            assert_eq!(
                FileType::from_version_field(&file_type.version_field()),
                Some(file_type)
            );
        }
        assert_eq!(FileType::from_version_field(b"1       "), None);
    }

    #[test]
    fn limits_match_sample_width() {
        assert_eq!(FileType::Edf.digital_limits(), (-32768, 32767));
        assert_eq!(FileType::Bdf.digital_limits(), (-8_388_608, 8_388_607));
        assert_eq!(FileType::Bdf.bytes_per_sample(), 3);
    }
}

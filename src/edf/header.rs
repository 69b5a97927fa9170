//! Fixed-width ASCII header codec.
//!
//! ```text
//! general block (256 bytes)
//!   version 8 | patient id 80 | recording id 80 | start date 8 | start time 8
//!   header bytes 8 | reserved 44 | record count 8 | record duration 8 | signals 4
//! per-signal block (256 bytes per signal, column-major)
//!   label 16×n | transducer 80×n | dimension 8×n | physical min 8×n
//!   physical max 8×n | digital min 8×n | digital max 8×n | prefiltering 80×n
//!   samples per record 8×n | reserved 32×n
//! ```
//!
//! Text is space padded and cut to the field width. Characters outside printable
//! ASCII are stored as `_`. An unknown record count is stored as `-1`.

use super::FileType;
use crate::error::{EdfError, EdfResult};
use crate::record::{RecordConfig, SignalDescriptor};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::io::{ErrorKind, Read};
use std::str::FromStr;
use tracing::debug;

/// Size of the general block and of each signal's share of the signal block.
pub const BLOCK_SIZE: usize = 256;

/// Header size in bytes for a file with `signal_count` signals.
pub const fn header_size(signal_count: usize) -> usize {
    BLOCK_SIZE * (signal_count + 1)
}

/// Years a two-digit header date can express.
const FIRST_YEAR: i32 = 1985;
const LAST_YEAR: i32 = 2084;

/// File-level metadata plus the record layout.
#[derive(Debug, Clone, PartialEq)]
pub struct EdfHeader {
    /// Sample width and version field.
    pub file_type: FileType,
    /// Local patient identification.
    pub patient_id: String,
    /// Local recording identification.
    pub recording_id: String,
    /// Start of the recording, to the second.
    pub start: NaiveDateTime,
    /// Number of data records, `None` while a writer is still appending.
    pub record_count: Option<u64>,
    /// Record duration and signal descriptors.
    pub config: RecordConfig,
}

impl EdfHeader {
    /// A header starting now with empty identifications and unknown record count.
    pub fn new(file_type: FileType, config: RecordConfig) -> Self {
        Self {
            file_type,
            patient_id: String::new(),
            recording_id: String::new(),
            start: now_to_the_second(),
            record_count: None,
            config,
        }
    }

    /// Header size in bytes.
    pub fn header_size(&self) -> usize {
        header_size(self.config.signal_count())
    }

    /// Bytes occupied by one data record.
    pub fn record_bytes(&self) -> usize {
        self.config.record_length() * self.file_type.bytes_per_sample()
    }

    /// Encodes the header.
    ///
    /// Fails with a `Config` error when a numeric field does not fit its width or the
    /// start date cannot be written with a two-digit year.
    pub fn encode(&self) -> EdfResult<Vec<u8>> {
        let signals = &self.config.signals;
        let size = self.header_size();
        let mut out = Vec::with_capacity(size);

        out.extend_from_slice(&self.file_type.version_field());
        put_text(&mut out, &self.patient_id, 80);
        put_text(&mut out, &self.recording_id, 80);
        put_text(&mut out, &format_date(self.start)?, 8);
        put_text(&mut out, &self.start.format("%H.%M.%S").to_string(), 8);
        put_number(&mut out, "header_bytes", size.to_string(), 8)?;
        put_text(&mut out, self.file_type.reserved_field(), 44);
        let count = self
            .record_count
            .map_or_else(|| "-1".to_string(), |count| count.to_string());
        put_number(&mut out, "record_count", count, 8)?;
        put_real(&mut out, "record_duration", self.config.duration)?;
        put_number(&mut out, "signal_count", signals.len().to_string(), 4)?;

        for signal in signals {
            put_text(&mut out, &signal.label, 16);
        }
        for signal in signals {
            put_text(&mut out, &signal.transducer, 80);
        }
        for signal in signals {
            put_text(&mut out, &signal.physical_dimension, 8);
        }
        for signal in signals {
            put_real(&mut out, "physical_min", signal.physical_min)?;
        }
        for signal in signals {
            put_real(&mut out, "physical_max", signal.physical_max)?;
        }
        for signal in signals {
            put_number(&mut out, "digital_min", signal.digital_min.to_string(), 8)?;
        }
        for signal in signals {
            put_number(&mut out, "digital_max", signal.digital_max.to_string(), 8)?;
        }
        for signal in signals {
            put_text(&mut out, &signal.prefiltering, 80);
        }
        for signal in signals {
            let samples = signal.samples_per_record.to_string();
            put_number(&mut out, "samples_per_record", samples, 8)?;
        }
        out.resize(size, b' ');
        Ok(out)
    }

    /// Decodes a header from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> EdfResult<Self> {
        if bytes.len() < BLOCK_SIZE {
            return Err(EdfError::header(
                "header",
                format!("need at least {BLOCK_SIZE} bytes, got {}", bytes.len()),
            ));
        }
        let mut general = Fields::new(&bytes[..BLOCK_SIZE]);

        let version = general.take(8);
        let file_type = FileType::from_version_field(version).ok_or_else(|| {
            EdfError::header(
                "version",
                format!("unknown version '{}'", String::from_utf8_lossy(version)),
            )
        })?;
        let patient_id = general.text(80);
        let recording_id = general.text(80);
        let date = general.text(8);
        let time = general.text(8);
        let start = parse_start(&date, &time)?;
        let declared_size: usize = general.number(8, "header_bytes")?;
        general.take(44);
        let record_count = parse_record_count(&general.text(8))?;
        let duration: f64 = general.number(8, "record_duration")?;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(EdfError::header(
                "record_duration",
                format!("'{duration}' is not a positive duration"),
            ));
        }
        let signal_count: usize = general.number(4, "signal_count")?;

        let expected = header_size(signal_count);
        if declared_size != expected {
            return Err(EdfError::header(
                "header_bytes",
                format!(
                    "declared {declared_size} bytes but {signal_count} signals need {expected}"
                ),
            ));
        }
        if bytes.len() < expected {
            return Err(EdfError::header(
                "header",
                format!("need {expected} bytes, got {}", bytes.len()),
            ));
        }

        let n = signal_count;
        let mut block = Fields::new(&bytes[BLOCK_SIZE..expected]);
        let labels = block.texts(n, 16);
        let transducers = block.texts(n, 80);
        let dimensions = block.texts(n, 8);
        let physical_min: Vec<f64> = block.numbers(n, 8, "physical_min")?;
        let physical_max: Vec<f64> = block.numbers(n, 8, "physical_max")?;
        let digital_min: Vec<i32> = block.numbers(n, 8, "digital_min")?;
        let digital_max: Vec<i32> = block.numbers(n, 8, "digital_max")?;
        let prefiltering = block.texts(n, 80);
        let samples: Vec<usize> = block.numbers(n, 8, "samples_per_record")?;

        let signals = (0..n)
            .map(|i| SignalDescriptor {
                label: labels[i].clone(),
                transducer: transducers[i].clone(),
                prefiltering: prefiltering[i].clone(),
                physical_dimension: dimensions[i].clone(),
                digital_min: digital_min[i],
                digital_max: digital_max[i],
                physical_min: physical_min[i],
                physical_max: physical_max[i],
                samples_per_record: samples[i],
            })
            .collect();

        debug!(
            %file_type,
            signals = n,
            duration,
            records = ?record_count,
            "header decoded"
        );
        Ok(Self {
            file_type,
            patient_id,
            recording_id,
            start,
            record_count,
            config: RecordConfig { duration, signals },
        })
    }

    /// Reads and decodes a header from `reader`, leaving it positioned at the first
    /// data record.
    pub fn read_from<R: Read>(reader: &mut R) -> EdfResult<Self> {
        let mut bytes = vec![0u8; BLOCK_SIZE];
        read_header_bytes(reader, &mut bytes)?;

        let signal_count: usize = Fields::new(&bytes[252..BLOCK_SIZE]).number(4, "signal_count")?;
        let size = header_size(signal_count);
        bytes.resize(size, 0);
        read_header_bytes(reader, &mut bytes[BLOCK_SIZE..])?;
        Self::decode(&bytes)
    }
}

fn read_header_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> EdfResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => EdfError::header("header", "file ends inside the header"),
        _ => EdfError::Io(e),
    })
}

/// Current local time with the fractional second dropped.
pub(crate) fn now_to_the_second() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Checks that `start` can be written with a two-digit year.
pub(crate) fn check_start(start: NaiveDateTime) -> EdfResult<()> {
    if (FIRST_YEAR..=LAST_YEAR).contains(&start.year()) {
        Ok(())
    } else {
        Err(EdfError::Config(format!(
            "start year {} outside {FIRST_YEAR}..={LAST_YEAR}",
            start.year()
        )))
    }
}

fn format_date(start: NaiveDateTime) -> EdfResult<String> {
    check_start(start)?;
    Ok(start.format("%d.%m.%y").to_string())
}

fn parse_start(date: &str, time: &str) -> EdfResult<NaiveDateTime> {
    let invalid_date = || EdfError::header("start_date", format!("cannot parse '{date}'"));
    let invalid_time = || EdfError::header("start_time", format!("cannot parse '{time}'"));

    let [day, month, year] = split_triplet(date).ok_or_else(invalid_date)?;
    let year = if year >= 85 { 1900 + year } else { 2000 + year };
    let year = i32::try_from(year).map_err(|_| invalid_date())?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid_date)?;

    let [hour, minute, second] = split_triplet(time).ok_or_else(invalid_time)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid_time)?;
    Ok(date.and_time(time))
}

fn split_triplet(text: &str) -> Option<[u32; 3]> {
    let mut parts = text.split(['.', ':']).map(|p| p.trim().parse::<u32>());
    let triplet = [
        parts.next()?.ok()?,
        parts.next()?.ok()?,
        parts.next()?.ok()?,
    ];
    parts.next().is_none().then_some(triplet)
}

fn parse_record_count(text: &str) -> EdfResult<Option<u64>> {
    match text.parse::<i64>() {
        Ok(-1) => Ok(None),
        Ok(count) => u64::try_from(count).map(Some).map_err(|_| {
            EdfError::header("record_count", format!("'{text}' is not a record count"))
        }),
        Err(_) => Err(EdfError::header(
            "record_count",
            format!("cannot parse '{text}'"),
        )),
    }
}

fn put_text(out: &mut Vec<u8>, text: &str, width: usize) {
    let start = out.len();
    out.extend(text.chars().take(width).map(|c| {
        if c.is_ascii_graphic() || c == ' ' {
            c as u8
        } else {
            b'_'
        }
    }));
    out.resize(start + width, b' ');
}

fn put_number(out: &mut Vec<u8>, field: &str, text: String, width: usize) -> EdfResult<()> {
    if text.len() > width {
        return Err(EdfError::Config(format!(
            "{field} value {text} does not fit in {width} characters"
        )));
    }
    put_text(out, &text, width);
    Ok(())
}

fn put_real(out: &mut Vec<u8>, field: &str, value: f64) -> EdfResult<()> {
    let text = format_real(value, 8).ok_or_else(|| {
        EdfError::Config(format!("{field} value {value} does not fit in 8 characters"))
    })?;
    put_text(out, &text, 8);
    Ok(())
}

/// Renders `value` in at most `width` characters, dropping fractional digits only
/// when the full representation is too wide. A non-zero value that would render as
/// `0` has no representation.
pub(crate) fn format_real(value: f64, width: usize) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    if value == 0.0 {
        return Some("0".to_string());
    }
    let exact = value.to_string();
    if exact.len() <= width {
        return Some(exact);
    }
    (0..width).rev().find_map(|decimals| {
        let text = format!("{value:.decimals$}");
        let text = if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.')
        } else {
            text.as_str()
        };
        (text.len() <= width && text != "0" && text != "-0").then(|| text.to_string())
    })
}

/// Sequential reader over fixed-width fields.
struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, width: usize) -> &'a [u8] {
        let end = (self.pos + width).min(self.bytes.len());
        let field = &self.bytes[self.pos..end];
        self.pos = end;
        field
    }

    fn text(&mut self, width: usize) -> String {
        let raw = self.take(width);
        let text: String = raw
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '_' })
            .collect();
        text.trim_end().to_string()
    }

    fn texts(&mut self, count: usize, width: usize) -> Vec<String> {
        (0..count).map(|_| self.text(width)).collect()
    }

    fn number<T: FromStr>(&mut self, width: usize, field: &str) -> EdfResult<T> {
        let text = self.text(width);
        text.trim()
            .parse()
            .map_err(|_| EdfError::header(field, format!("cannot parse '{text}'")))
    }

    fn numbers<T: FromStr>(&mut self, count: usize, width: usize, field: &str) -> EdfResult<Vec<T>> {
        (0..count).map(|_| self.number(width, field)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 30)
            .unwrap()
    }

    fn header(file_type: FileType) -> EdfHeader {
        let config = RecordConfig::new(
            0.5,
            vec![
                SignalDescriptor::new("EEG Fp1", 128, (-32768, 32767), (-3276.8, 3276.7))
                    .with_dimension("uV")
                    .with_transducer("AgCl electrode")
                    .with_prefiltering("HP:0.1Hz"),
                SignalDescriptor::new("Temp", 1, (0, 1000), (20.0, 45.0)).with_dimension("degC"),
            ],
        )
        .unwrap();
        EdfHeader {
            file_type,
            patient_id: "X F 01-JAN-1980 Anon".into(),
            recording_id: "Startdate 07-MAR-2024 bench".into(),
            start: start(),
            record_count: Some(42),
            config,
        }
    }

    #[test]
    fn header_round_trips_with_expected_size() {
        for file_type in [FileType::Edf, FileType::Bdf] {
            let header = header(file_type);
            let bytes = header.encode().unwrap();
            assert_eq!(bytes.len(), 256 * 3);
            assert_eq!(EdfHeader::decode(&bytes).unwrap(), header);
        }
    }

    #[test]
    fn header_size_follows_signal_count() {
        let template = header(FileType::Bdf).config.signals[0].clone();
        for n in [0, 1, 5] {
            let mut header = header(FileType::Bdf);
            header.config.signals = (0..n)
                .map(|i| {
                    let mut signal = template.clone();
                    signal.label = format!("CH{i}");
                    signal
                })
                .collect();
            let bytes = header.encode().unwrap();
            assert_eq!(bytes.len(), 256 * (n + 1));
            assert_eq!(header_size(n), 256 * (n + 1));

            let decoded = EdfHeader::decode(&bytes).unwrap();
            assert_eq!(decoded.header_size(), 256 * (n + 1));
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn general_block_layout() {
        let bytes = header(FileType::Edf).encode().unwrap();
        assert_eq!(&bytes[0..8], b"0       ");
        assert_eq!(&bytes[168..176], b"07.03.24");
        assert_eq!(&bytes[176..184], b"09.05.30");
        assert_eq!(&bytes[184..192], b"768     ");
        assert_eq!(&bytes[236..244], b"42      ");
        assert_eq!(&bytes[244..252], b"0.5     ");
        assert_eq!(&bytes[252..256], b"2   ");
        // labels are stored column-major
        assert_eq!(&bytes[256..272], b"EEG Fp1         ");
        assert_eq!(&bytes[272..288], b"Temp            ");
    }

    #[test]
    fn bdf_marks_version_and_reserved_field() {
        let bytes = header(FileType::Bdf).encode().unwrap();
        assert_eq!(bytes[0], 0xFF);
        assert_eq!(&bytes[1..8], b"BIOSEMI");
        assert_eq!(&bytes[192..197], b"24BIT");
    }

    #[test]
    fn unknown_record_count_is_minus_one() {
        let mut header = header(FileType::Edf);
        header.record_count = None;
        let bytes = header.encode().unwrap();
        assert_eq!(&bytes[236..244], b"-1      ");
        assert_eq!(EdfHeader::decode(&bytes).unwrap().record_count, None);
    }

    #[test]
    fn size_mismatch_names_field() {
        let mut bytes = header(FileType::Edf).encode().unwrap();
        bytes[184..192].copy_from_slice(b"512     ");
        match EdfHeader::decode(&bytes) {
            Err(EdfError::HeaderFormat { field, .. }) => assert_eq!(field, "header_bytes"),
            other => panic!("expected header format error, got {other:?}"),
        }
    }

    #[test]
    fn bad_number_reports_raw_text() {
        let mut bytes = header(FileType::Edf).encode().unwrap();
        // first digital_min entry: 256 + 2 * (16 + 80 + 8 + 8 + 8)
        let offset = 256 + 2 * 120;
        bytes[offset..offset + 8].copy_from_slice(b"abc     ");
        match EdfHeader::decode(&bytes) {
            Err(EdfError::HeaderFormat { field, message }) => {
                assert_eq!(field, "digital_min");
                assert!(message.contains("abc"));
            }
            other => panic!("expected header format error, got {other:?}"),
        }
    }

    #[test]
    fn text_is_sanitised_and_truncated() {
        let mut header = header(FileType::Edf);
        header.config.signals[0].label = "Ωmega label that is too long".into();
        let bytes = header.encode().unwrap();
        assert_eq!(&bytes[256..272], b"_mega label that");
    }

    #[test]
    fn reals_fit_eight_characters() {
        assert_eq!(format_real(0.5, 8).as_deref(), Some("0.5"));
        assert_eq!(format_real(-3276.8, 8).as_deref(), Some("-3276.8"));
        assert_eq!(format_real(1.0 / 3.0, 8).as_deref(), Some("0.333333"));
        assert_eq!(format_real(-1.0 / 3.0, 8).as_deref(), Some("-0.33333"));
        assert_eq!(format_real(12_345_678.0, 8).as_deref(), Some("12345678"));
        assert_eq!(format_real(123_456_789.0, 8), None);
        assert_eq!(format_real(0.0000123, 8).as_deref(), Some("0.000012"));
    }

    #[test]
    fn tiny_reals_do_not_collapse_to_zero() {
        assert_eq!(format_real(5e-9, 8), None);
        assert_eq!(format_real(-5e-9, 8), None);
        assert_eq!(format_real(0.0, 8).as_deref(), Some("0"));

        let mut header = header(FileType::Edf);
        header.config.signals[1].physical_min = -5e-9;
        header.config.signals[1].physical_max = 5e-9;
        assert!(matches!(header.encode(), Err(EdfError::Config(_))));
    }

    #[test]
    fn two_digit_years_pivot_at_85() {
        assert_eq!(parse_start("01.01.85", "00.00.00").unwrap().year(), 1985);
        assert_eq!(parse_start("01.01.84", "00.00.00").unwrap().year(), 2084);
        assert!(parse_start("32.01.20", "00.00.00").is_err());
        assert!(format_date(start().with_year(2100).unwrap()).is_err());
    }

    #[test]
    fn truncated_input_is_a_header_error() {
        let bytes = header(FileType::Edf).encode().unwrap();
        let mut reader = &bytes[..300];
        assert!(matches!(
            EdfHeader::read_from(&mut reader),
            Err(EdfError::HeaderFormat { .. })
        ));
    }
}

//! Random-access reading of EDF and BDF files.
//!
//! Each signal has its own sample cursor; whole-record reads share one record
//! cursor. Reads past the end return fewer samples, never an error.
//!
//! Record counts come from the current file size, so a reader opened next to a
//! writer that is still recording sees records as they are appended.

use super::header::EdfHeader;
use super::{samples, FileType};
use crate::calibration::Calibration;
use crate::error::{EdfError, EdfResult};
use crate::record::DataRecord;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Reads samples and records from a file written by [`EdfWriter`](super::EdfWriter)
/// or any other EDF/BDF producer.
pub struct EdfReader {
    file: BufReader<File>,
    header: EdfHeader,
    calibrations: Vec<Calibration>,
    signal_offsets: Vec<usize>,
    header_size: u64,
    record_bytes: u64,
    sample_positions: Vec<u64>,
    record_position: u64,
    scratch: Vec<u8>,
}

impl EdfReader {
    /// Opens `path` and decodes its header.
    pub fn open(path: impl AsRef<Path>) -> EdfResult<Self> {
        let path = path.as_ref();
        let mut file = BufReader::new(File::open(path)?);
        let header = EdfHeader::read_from(&mut file)?;
        let calibrations = Calibration::for_config(&header.config)
            .map_err(|e| EdfError::header("calibration", e.to_string()))?;

        let header_size = header.header_size() as u64;
        let record_bytes = header.record_bytes() as u64;
        let file_size = file.get_ref().metadata()?.len();
        let record_count = records_in(file_size, header_size, record_bytes);
        if let Some(declared) = header.record_count {
            if declared != record_count {
                debug!(declared, found = record_count, "record count differs from file size");
            }
        }

        let signal_offsets = header
            .config
            .signal_ranges()
            .into_iter()
            .map(|r| r.start)
            .collect();
        debug!(
            path = %path.display(),
            file_type = %header.file_type,
            signals = header.config.signal_count(),
            records = record_count,
            "recording file opened for reading"
        );

        Ok(Self {
            file,
            sample_positions: vec![0; header.config.signal_count()],
            header,
            calibrations,
            signal_offsets,
            header_size,
            record_bytes,
            record_position: 0,
            scratch: Vec::new(),
        })
    }

    /// The decoded header.
    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    /// Sample width of the file.
    pub fn file_type(&self) -> FileType {
        self.header.file_type
    }

    /// Complete records present in the file right now.
    pub fn number_of_records(&self) -> EdfResult<u64> {
        let file_size = self.file.get_ref().metadata()?.len();
        Ok(records_in(file_size, self.header_size, self.record_bytes))
    }

    /// Samples of `signal` not yet read.
    pub fn available_samples(&self, signal: usize) -> EdfResult<u64> {
        let total = self.total_samples(signal)?;
        Ok(total.saturating_sub(self.sample_positions[signal]))
    }

    /// Records not yet read through the record cursor.
    pub fn available_records(&self) -> EdfResult<u64> {
        Ok(self.number_of_records()?.saturating_sub(self.record_position))
    }

    /// Current sample cursor of `signal`.
    pub fn sample_position(&self, signal: usize) -> EdfResult<u64> {
        self.header.config.check_signal(signal)?;
        Ok(self.sample_positions[signal])
    }

    /// Moves the cursor of `signal`, clamped to the end of the signal.
    pub fn set_sample_position(&mut self, signal: usize, position: u64) -> EdfResult<()> {
        let total = self.total_samples(signal)?;
        self.sample_positions[signal] = position.min(total);
        Ok(())
    }

    /// Current record cursor.
    pub fn record_position(&self) -> u64 {
        self.record_position
    }

    /// Moves the record cursor, clamped to the number of records.
    pub fn set_record_position(&mut self, position: u64) -> EdfResult<()> {
        self.record_position = position.min(self.number_of_records()?);
        Ok(())
    }

    /// Resets every cursor to the start of the file.
    pub fn rewind(&mut self) {
        self.sample_positions.iter_mut().for_each(|p| *p = 0);
        self.record_position = 0;
    }

    fn total_samples(&self, signal: usize) -> EdfResult<u64> {
        let descriptor = self.header.config.check_signal(signal)?;
        let per_record = descriptor.samples_per_record as u64;
        Ok(self.number_of_records()? * per_record)
    }

    /// Reads up to `n` digital samples of `signal` from its cursor.
    pub fn read_samples(&mut self, signal: usize, n: usize) -> EdfResult<Vec<i32>> {
        let available = self.available_samples(signal)?;
        let per_record = self.header.config.signals[signal].samples_per_record as u64;
        let width = self.header.file_type.bytes_per_sample() as u64;
        let file_type = self.header.file_type;

        let mut remaining = (n as u64).min(available);
        let mut out = Vec::with_capacity(remaining as usize);
        let mut position = self.sample_positions[signal];
        while remaining > 0 {
            let record = position / per_record;
            let within = position % per_record;
            let chunk = remaining.min(per_record - within);
            let offset = self.header_size
                + record * self.record_bytes
                + (self.signal_offsets[signal] as u64 + within) * width;

            self.scratch.resize((chunk * width) as usize, 0);
            self.file.seek(SeekFrom::Start(offset))?;
            if !read_fully(&mut self.file, &mut self.scratch)? {
                break;
            }
            samples::decode_into(file_type, &self.scratch, &mut out);
            position += chunk;
            remaining -= chunk;
        }
        self.sample_positions[signal] = position;
        Ok(out)
    }

    /// Reads up to `n` samples of `signal` converted to physical values.
    pub fn read_physical_samples(&mut self, signal: usize, n: usize) -> EdfResult<Vec<f64>> {
        let digital = self.read_samples(signal, n)?;
        let calibration = self.calibrations[signal];
        Ok(digital.into_iter().map(|d| calibration.to_physical(d)).collect())
    }

    /// Reads up to `n` whole digital records from the record cursor.
    pub fn read_data_records(&mut self, n: usize) -> EdfResult<Vec<DataRecord>> {
        let count = (n as u64).min(self.available_records()?);
        if count == 0 {
            return Ok(Vec::new());
        }
        let offset = self.header_size + self.record_position * self.record_bytes;
        self.scratch.resize((count * self.record_bytes) as usize, 0);
        self.file.seek(SeekFrom::Start(offset))?;
        if !read_fully(&mut self.file, &mut self.scratch)? {
            return Ok(Vec::new());
        }

        let file_type = self.header.file_type;
        let records = self
            .scratch
            .chunks_exact(self.record_bytes as usize)
            .map(|bytes| {
                let mut record = Vec::with_capacity(self.header.config.record_length());
                samples::decode_into(file_type, bytes, &mut record);
                record
            })
            .collect();
        self.record_position += count;
        Ok(records)
    }

    /// Reads up to `n` whole records converted to physical values.
    pub fn read_physical_data_records(&mut self, n: usize) -> EdfResult<Vec<Vec<f64>>> {
        let ranges = self.header.config.signal_ranges();
        let records = self.read_data_records(n)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let mut physical = Vec::with_capacity(record.len());
                for (range, calibration) in ranges.iter().zip(&self.calibrations) {
                    physical.extend(record[range.clone()].iter().map(|&d| calibration.to_physical(d)));
                }
                physical
            })
            .collect())
    }
}

fn records_in(file_size: u64, header_size: u64, record_bytes: u64) -> u64 {
    match record_bytes {
        0 => 0,
        bytes => file_size.saturating_sub(header_size) / bytes,
    }
}

/// Fills `buf`, returning false if the file ended first.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> EdfResult<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edf::{EdfWriter, WriterOptions};
    use crate::record::{RecordConfig, SignalDescriptor};
    use crate::stream::RecordStream;
    use tempfile::tempdir;

    fn write_file(path: &Path, records: u32) {
        let config = RecordConfig::new(
            1.0,
            vec![
                SignalDescriptor::new("A", 3, (-1000, 1000), (-1.0, 1.0)),
                SignalDescriptor::new("B", 2, (-1000, 1000), (-1.0, 1.0)),
            ],
        )
        .unwrap();
        let mut writer = EdfWriter::new(path, WriterOptions::default());
        writer.configure(&config).unwrap();
        for r in 0..records {
            let r = r as i32;
            writer
                .write(&[r * 10, r * 10 + 1, r * 10 + 2, -r * 10, -r * 10 - 1])
                .unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn signal_reads_span_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("span.edf");
        write_file(&path, 3);

        let mut reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.number_of_records().unwrap(), 3);
        assert_eq!(reader.read_samples(0, 4).unwrap(), vec![0, 1, 2, 10]);
        assert_eq!(reader.read_samples(1, 3).unwrap(), vec![0, -1, -10]);
        assert_eq!(reader.available_samples(0).unwrap(), 5);
        assert_eq!(reader.read_samples(0, 100).unwrap(), vec![11, 12, 20, 21, 22]);
        assert!(reader.read_samples(0, 1).unwrap().is_empty());
    }

    #[test]
    fn record_cursor_is_independent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.edf");
        write_file(&path, 2);

        let mut reader = EdfReader::open(&path).unwrap();
        reader.read_samples(0, 2).unwrap();
        let records = reader.read_data_records(5).unwrap();
        assert_eq!(records, vec![vec![0, 1, 2, 0, -1], vec![10, 11, 12, -10, -11]]);
        assert_eq!(reader.available_records().unwrap(), 0);
        assert_eq!(reader.sample_position(0).unwrap(), 2);

        reader.rewind();
        reader.set_record_position(1).unwrap();
        assert_eq!(reader.read_data_records(1).unwrap().len(), 1);
    }

    #[test]
    fn physical_reads_apply_calibration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phys.edf");
        write_file(&path, 2);

        let mut reader = EdfReader::open(&path).unwrap();
        reader.set_sample_position(0, 3).unwrap();
        let values = reader.read_physical_samples(0, 1).unwrap();
        assert!((values[0] - 0.01).abs() < 1e-9);
    }

    #[test]
    fn counts_follow_a_growing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.edf");
        let config = RecordConfig::new(
            1.0,
            vec![SignalDescriptor::new("A", 2, (-1000, 1000), (-1.0, 1.0))],
        )
        .unwrap();
        let mut writer = EdfWriter::new(&path, WriterOptions::default());
        writer.configure(&config).unwrap();
        for r in 0..3 {
            writer.write(&[r, -r]).unwrap();
        }

        let mut reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.header().record_count, None);
        assert_eq!(reader.number_of_records().unwrap(), 3);
        assert_eq!(reader.read_data_records(10).unwrap().len(), 3);

        writer.write(&[3, -3]).unwrap();
        writer.write(&[4, -4]).unwrap();
        assert_eq!(reader.number_of_records().unwrap(), 5);
        assert_eq!(reader.available_records().unwrap(), 2);
        assert_eq!(reader.available_samples(0).unwrap(), 10);
        assert_eq!(
            reader.read_data_records(10).unwrap(),
            vec![vec![3, -3], vec![4, -4]]
        );
        writer.close().unwrap();
    }

    #[test]
    fn garbage_file_is_a_header_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.edf");
        std::fs::write(&path, vec![b'x'; 300]).unwrap();
        assert!(matches!(
            EdfReader::open(&path),
            Err(EdfError::HeaderFormat { .. })
        ));
    }
}

//! Terminal pipeline stage that writes an EDF or BDF file.
//!
//! The writer moves through `Unopened → Open → Closed`. The file is created and a
//! provisional header (record count `-1`) written on the first successful write,
//! so a crashed session still leaves a readable file. Each write goes straight to
//! the file, so a reader can follow the recording while it grows. `close` rewrites
//! the header in place with the final record count.
//!
//! Writes must be serialized by the caller. `close` may come from another thread,
//! through a [`CloseHandle`]; it rejects further writes at once and waits on a
//! condition variable until a write already in flight has finished.

use super::header::{self, EdfHeader};
use super::{samples, FileType};
use crate::calibration::Calibration;
use crate::error::{EdfError, EdfResult};
use crate::record::RecordConfig;
use crate::stream::RecordStream;
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use parking_lot::{Condvar, Mutex};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Options fixed for the lifetime of a writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// EDF (16-bit) or BDF (24-bit) samples.
    pub file_type: FileType,
    /// Replace the nominal record duration in the final header with the measured
    /// average wall-clock time between records.
    pub average_record_duration: bool,
}

impl WriterOptions {
    /// Options for `file_type` with duration averaging off.
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            average_record_duration: false,
        }
    }

    /// Enables or disables duration averaging.
    pub fn with_average_record_duration(mut self, enabled: bool) -> Self {
        self.average_record_duration = enabled;
        self
    }
}

#[derive(Default)]
struct Session {
    config: Option<RecordConfig>,
    calibrations: Vec<Calibration>,
    patient_id: String,
    recording_id: String,
    /// Start set explicitly by the caller.
    start: Option<NaiveDateTime>,
    /// Start written into the provisional header.
    provisional_start: Option<NaiveDateTime>,
    opened: bool,
    writing: bool,
    closed: bool,
    /// Signal expected by the next single-signal write.
    next_signal: usize,
    bytes_written: u64,
    first_record: Option<(Instant, NaiveDateTime)>,
    last_record: Option<Instant>,
}

impl Session {
    fn record_bytes(&self, file_type: FileType) -> u64 {
        self.config
            .as_ref()
            .map_or(0, |c| (c.record_length() * file_type.bytes_per_sample()) as u64)
    }

    fn header(
        &self,
        file_type: FileType,
        config: RecordConfig,
        start: NaiveDateTime,
        record_count: Option<u64>,
    ) -> EdfHeader {
        EdfHeader {
            file_type,
            patient_id: self.patient_id.clone(),
            recording_id: self.recording_id.clone(),
            start,
            record_count,
            config,
        }
    }
}

struct Shared {
    path: PathBuf,
    options: WriterOptions,
    session: Mutex<Session>,
    idle: Condvar,
    file: Mutex<Option<File>>,
}

/// Resets the writing flag and wakes a waiting `close`, however the write ends.
struct WritingGuard<'a>(&'a Shared);

impl Drop for WritingGuard<'_> {
    fn drop(&mut self) {
        self.0.session.lock().writing = false;
        self.0.idle.notify_all();
    }
}

/// Writes digital data records to an EDF or BDF file.
pub struct EdfWriter {
    shared: Arc<Shared>,
    buffer: Vec<u8>,
}

/// Closes an [`EdfWriter`] from any thread.
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<Shared>,
}

impl CloseHandle {
    /// Closes the writer. See [`RecordStream::close`].
    pub fn close(&self) -> EdfResult<()> {
        close_shared(&self.shared)
    }

    /// Whether the writer has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.session.lock().closed
    }
}

impl EdfWriter {
    /// A writer for `path`. Nothing touches the filesystem before the first write.
    pub fn new(path: impl Into<PathBuf>, options: WriterOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                options,
                session: Mutex::new(Session::default()),
                idle: Condvar::new(),
                file: Mutex::new(None),
            }),
            buffer: Vec::new(),
        }
    }

    /// Target file path.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Options the writer was created with.
    pub fn options(&self) -> WriterOptions {
        self.shared.options
    }

    /// A handle that can close this writer from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether the writer has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.session.lock().closed
    }

    /// Complete records written so far.
    pub fn records_written(&self) -> u64 {
        let session = self.shared.session.lock();
        match session.record_bytes(self.shared.options.file_type) {
            0 => 0,
            record_bytes => session.bytes_written / record_bytes,
        }
    }

    /// Sets the patient identification written into the header.
    pub fn set_patient_id(&mut self, patient_id: impl Into<String>) -> EdfResult<()> {
        let mut session = self.open_session()?;
        session.patient_id = patient_id.into();
        Ok(())
    }

    /// Sets the recording identification written into the header.
    pub fn set_recording_id(&mut self, recording_id: impl Into<String>) -> EdfResult<()> {
        let mut session = self.open_session()?;
        session.recording_id = recording_id.into();
        Ok(())
    }

    /// Sets an explicit start time instead of deriving it from the first record.
    pub fn set_start(&mut self, start: NaiveDateTime) -> EdfResult<()> {
        header::check_start(start)?;
        let mut session = self.open_session()?;
        session.start = Some(start.with_nanosecond(0).unwrap_or(start));
        Ok(())
    }

    fn open_session(&self) -> EdfResult<parking_lot::MutexGuard<'_, Session>> {
        let session = self.shared.session.lock();
        if session.closed {
            return Err(EdfError::State("writer is closed".into()));
        }
        Ok(session)
    }

    /// Writes the samples of the next signal in round-robin order.
    pub fn write_signal(&mut self, samples: &[i32]) -> EdfResult<()> {
        self.append(samples, false)
    }

    /// Converts one record of physical values to digital values and writes it.
    ///
    /// Values are rounded to the nearest digital step and clamped like any other write.
    pub fn write_physical_record(&mut self, record: &[f64]) -> EdfResult<()> {
        let digital = {
            let session = self.open_session()?;
            let config = session.config.as_ref().ok_or_else(|| {
                EdfError::State("writer received data before configure".into())
            })?;
            if record.len() != config.record_length() {
                return Err(EdfError::State(format!(
                    "writer expected a record of {} samples, got {}",
                    config.record_length(),
                    record.len()
                )));
            }
            let mut digital = Vec::with_capacity(record.len());
            for (range, calibration) in config.signal_ranges().into_iter().zip(&session.calibrations) {
                digital.extend(
                    record[range]
                        .iter()
                        .map(|&p| calibration.to_digital(p).round() as i32),
                );
            }
            digital
        };
        self.append(&digital, true)
    }

    fn append(&mut self, values: &[i32], whole_record: bool) -> EdfResult<()> {
        let file_type = self.shared.options.file_type;
        let (provisional, next_signal) = {
            let mut session = self.shared.session.lock();
            if session.closed {
                return Err(EdfError::State("writer is closed".into()));
            }
            let config = session.config.as_ref().ok_or_else(|| {
                EdfError::State("writer received data before configure".into())
            })?;
            let count = config.signal_count();
            if count == 0 {
                return Err(EdfError::State(
                    "cannot write records with zero signals configured".into(),
                ));
            }

            let first = session.next_signal;
            let (signals, next_signal) = if whole_record {
                if first != 0 {
                    return Err(EdfError::State(format!(
                        "whole record written while signal {first} of a partial record is due"
                    )));
                }
                (0..count, 0)
            } else {
                (first..first + 1, (first + 1) % count)
            };

            let descriptors = &config.signals[signals];
            let expected: usize = descriptors.iter().map(|s| s.samples_per_record).sum();
            if values.len() != expected {
                return Err(EdfError::State(format!(
                    "writer expected {expected} samples, got {}",
                    values.len()
                )));
            }

            self.buffer.clear();
            let mut rest = values;
            for descriptor in descriptors {
                let (block, tail) = rest.split_at(descriptor.samples_per_record);
                rest = tail;
                for &value in block {
                    samples::encode_sample(file_type, descriptor.clamp(value), &mut self.buffer);
                }
            }

            let provisional = if session.opened {
                None
            } else {
                let start = session.start.unwrap_or_else(header::now_to_the_second);
                let header = session.header(file_type, config.clone(), start, None);
                let bytes = header.encode()?;
                session.provisional_start = Some(start);
                Some(bytes)
            };
            session.writing = true;
            (provisional, next_signal)
        };

        let guard = WritingGuard(&self.shared);
        let mut file = self.shared.file.lock();
        if let Some(header) = provisional {
            let mut created = File::create(&self.shared.path)?;
            created.write_all(&header)?;
            info!(
                path = %self.shared.path.display(),
                %file_type,
                header_bytes = header.len(),
                "recording file opened"
            );
            *file = Some(created);
        }
        let out = file
            .as_mut()
            .ok_or_else(|| EdfError::State("recording file is not open".into()))?;
        out.write_all(&self.buffer)?;
        drop(file);

        let mut session = self.shared.session.lock();
        session.opened = true;
        session.bytes_written += self.buffer.len() as u64;
        session.next_signal = next_signal;
        if next_signal == 0 {
            let now = Instant::now();
            if session.first_record.is_none() {
                session.first_record = Some((now, chrono::Local::now().naive_local()));
            }
            session.last_record = Some(now);
        }
        drop(session);
        drop(guard);
        Ok(())
    }
}

fn close_shared(shared: &Shared) -> EdfResult<()> {
    let file_type = shared.options.file_type;
    let mut session = shared.session.lock();
    if session.closed {
        return Ok(());
    }
    session.closed = true;
    while session.writing {
        shared.idle.wait(&mut session);
    }

    let Some(mut out) = shared.file.lock().take() else {
        info!(path = %shared.path.display(), "writer closed before any data was written");
        return Ok(());
    };
    let Some(nominal) = session.config.clone() else {
        return Err(EdfError::State("recording file open without a configuration".into()));
    };

    let record_bytes = session.record_bytes(file_type);
    let records = if record_bytes == 0 {
        0
    } else {
        session.bytes_written / record_bytes
    };
    if record_bytes != 0 && session.bytes_written % record_bytes != 0 {
        warn!(
            next_signal = session.next_signal,
            "closing with a partial record; it is not counted"
        );
    }

    let mut config = nominal.clone();
    if shared.options.average_record_duration && records > 0 {
        if let (Some((first, _)), Some(last)) = (session.first_record, session.last_record) {
            let average = last.duration_since(first).as_secs_f64() / records as f64;
            if average > 0.0 {
                config.duration = average;
            }
        }
    }

    let start = session
        .start
        .or_else(|| {
            let (_, arrived) = session.first_record?;
            let one_record = TimeDelta::try_milliseconds((nominal.duration * 1000.0) as i64)?;
            let start = arrived.checked_sub_signed(one_record)?;
            Some(start.with_nanosecond(0).unwrap_or(start))
        })
        .or(session.provisional_start)
        .unwrap_or_else(header::now_to_the_second);

    let header = session.header(file_type, config, start, Some(records));
    let bytes = header.encode()?;
    out.seek(SeekFrom::Start(0))?;
    out.write_all(&bytes)?;
    out.flush()?;

    info!(
        path = %shared.path.display(),
        records,
        duration = header.config.duration,
        "recording file closed"
    );
    Ok(())
}

impl RecordStream for EdfWriter {
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        let file_type = self.shared.options.file_type;
        let mut session = self.open_session()?;
        if session.opened {
            if session.config.as_ref() == Some(config) {
                return Ok(());
            }
            return Err(EdfError::State(
                "writer cannot change its record layout once data has been written".into(),
            ));
        }

        config.validate()?;
        let (low, high) = file_type.digital_limits();
        if let Some(signal) = config
            .signals
            .iter()
            .find(|s| s.digital_min < low || s.digital_max > high)
        {
            return Err(EdfError::Config(format!(
                "signal '{}': digital range {}..={} exceeds {file_type} limits {low}..={high}",
                signal.label, signal.digital_min, signal.digital_max
            )));
        }
        let calibrations = Calibration::for_config(config)?;
        let start = session.start.unwrap_or_else(header::now_to_the_second);
        session
            .header(file_type, config.clone(), start, None)
            .encode()?;

        debug!(
            signals = config.signal_count(),
            record_length = config.record_length(),
            duration = config.duration,
            "writer configured"
        );
        session.config = Some(config.clone());
        session.calibrations = calibrations;
        session.next_signal = 0;
        Ok(())
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        self.append(record, true)
    }

    fn close(&mut self) -> EdfResult<()> {
        close_shared(&self.shared)
    }
}

impl Drop for EdfWriter {
    fn drop(&mut self) {
        if let Err(e) = close_shared(&self.shared) {
            warn!(path = %self.shared.path.display(), error = %e, "failed to close recording file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SignalDescriptor;
    use tempfile::tempdir;

    fn config() -> RecordConfig {
        RecordConfig::new(
            1.0,
            vec![
                SignalDescriptor::new("A", 2, (-100, 100), (-1.0, 1.0)),
                SignalDescriptor::new("B", 1, (0, 10), (0.0, 10.0)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn file_appears_on_first_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.edf");
        let mut writer = EdfWriter::new(&path, WriterOptions::default());
        writer.configure(&config()).unwrap();
        assert!(!path.exists());

        writer.write(&[1, 2, 3]).unwrap();
        assert_eq!(writer.records_written(), 1);
        writer.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 768 + 6);
    }

    #[test]
    fn unrepresentable_physical_range_is_rejected_at_configure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.edf");
        let mut writer = EdfWriter::new(&path, WriterOptions::default());
        let tiny = RecordConfig::new(
            1.0,
            vec![SignalDescriptor::new("tiny", 1, (-100, 100), (-5e-9, 5e-9))],
        )
        .unwrap();
        assert!(matches!(writer.configure(&tiny), Err(EdfError::Config(_))));
        assert!(matches!(writer.write(&[1]), Err(EdfError::State(_))));
        assert!(!path.exists());
    }

    #[test]
    fn records_reach_the_file_before_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.edf");
        let mut writer = EdfWriter::new(&path, WriterOptions::default());
        writer.configure(&config()).unwrap();
        for _ in 0..3 {
            writer.write(&[1, 2, 3]).unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 768 + 3 * 6);
    }

    #[test]
    fn round_robin_order_is_enforced() {
        let dir = tempdir().unwrap();
        let mut writer = EdfWriter::new(dir.path().join("rr.edf"), WriterOptions::default());
        writer.configure(&config()).unwrap();

        writer.write_signal(&[1, 2]).unwrap();
        assert!(matches!(writer.write(&[1, 2, 3]), Err(EdfError::State(_))));
        assert!(matches!(writer.write_signal(&[1, 2]), Err(EdfError::State(_))));
        writer.write_signal(&[3]).unwrap();
        writer.write(&[1, 2, 3]).unwrap();
        assert_eq!(writer.records_written(), 2);
    }

    #[test]
    fn zero_signals_cannot_be_written() {
        let dir = tempdir().unwrap();
        let mut writer = EdfWriter::new(dir.path().join("empty.edf"), WriterOptions::default());
        writer.configure(&RecordConfig::new(1.0, vec![]).unwrap()).unwrap();
        assert!(matches!(writer.write(&[]), Err(EdfError::State(_))));
    }

    #[test]
    fn write_after_close_is_rejected() {
        let dir = tempdir().unwrap();
        let mut writer = EdfWriter::new(dir.path().join("c.edf"), WriterOptions::default());
        writer.configure(&config()).unwrap();
        writer.close().unwrap();
        assert!(matches!(writer.write(&[1, 2, 3]), Err(EdfError::State(_))));
        assert!(writer.close().is_ok());
    }

    #[test]
    fn edf_rejects_24_bit_ranges() {
        let dir = tempdir().unwrap();
        let mut writer = EdfWriter::new(dir.path().join("r.edf"), WriterOptions::default());
        let wide = RecordConfig::new(
            1.0,
            vec![SignalDescriptor::new("A", 1, (-8_388_608, 8_388_607), (-1.0, 1.0))],
        )
        .unwrap();
        assert!(matches!(writer.configure(&wide), Err(EdfError::Config(_))));

        let mut bdf = EdfWriter::new(dir.path().join("r.bdf"), WriterOptions::new(FileType::Bdf));
        assert!(bdf.configure(&wide).is_ok());
    }

    #[test]
    fn layout_is_frozen_once_open() {
        let dir = tempdir().unwrap();
        let mut writer = EdfWriter::new(dir.path().join("f.edf"), WriterOptions::default());
        writer.configure(&config()).unwrap();
        writer.write(&[0, 0, 0]).unwrap();
        assert!(writer.configure(&config()).is_ok());

        let mut other = config();
        other.signals.pop();
        assert!(matches!(writer.configure(&other), Err(EdfError::State(_))));
    }
}

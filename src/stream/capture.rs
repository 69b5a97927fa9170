//! Terminal sink that keeps what it receives.
//!
//! Useful as a live tap on a pipeline and as the end of a chain under test. The
//! sink itself moves into the pipeline; the [`CaptureHandle`] stays with the caller.

use super::RecordStream;
use crate::error::{EdfError, EdfResult};
use crate::record::{DataRecord, RecordConfig};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Captured {
    config: Option<RecordConfig>,
    records: Vec<DataRecord>,
    configure_calls: usize,
    close_calls: usize,
}

/// Records every config and record pushed into it.
#[derive(Debug)]
pub struct CaptureSink {
    shared: Arc<Mutex<Captured>>,
}

/// Read side of a [`CaptureSink`].
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    shared: Arc<Mutex<Captured>>,
}

impl CaptureSink {
    /// Creates a sink and the handle used to inspect it.
    pub fn new() -> (Self, CaptureHandle) {
        let shared = Arc::new(Mutex::new(Captured::default()));
        (
            Self {
                shared: shared.clone(),
            },
            CaptureHandle { shared },
        )
    }
}

impl RecordStream for CaptureSink {
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        let mut captured = self.shared.lock();
        captured.config = Some(config.clone());
        captured.configure_calls += 1;
        Ok(())
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        let mut captured = self.shared.lock();
        let expected = captured
            .config
            .as_ref()
            .map(RecordConfig::record_length)
            .ok_or_else(|| EdfError::State("capture sink received data before configure".into()))?;
        if record.len() != expected {
            return Err(EdfError::State(format!(
                "capture sink expected {expected} samples, got {}",
                record.len()
            )));
        }
        captured.records.push(record.to_vec());
        Ok(())
    }

    fn close(&mut self) -> EdfResult<()> {
        self.shared.lock().close_calls += 1;
        Ok(())
    }
}

impl CaptureHandle {
    /// Last config received.
    pub fn config(&self) -> Option<RecordConfig> {
        self.shared.lock().config.clone()
    }

    /// All records received so far.
    pub fn records(&self) -> Vec<DataRecord> {
        self.shared.lock().records.clone()
    }

    /// Removes and returns the records received so far.
    pub fn take_records(&self) -> Vec<DataRecord> {
        std::mem::take(&mut self.shared.lock().records)
    }

    /// How many times `configure` was called.
    pub fn configure_calls(&self) -> usize {
        self.shared.lock().configure_calls
    }

    /// How many times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.shared.lock().close_calls
    }
}

//! Push-based record streaming.
//!
//! Every pipeline stage implements [`RecordStream`]. A producer first calls
//! `configure` with the shape of the records it will push, then pushes records with
//! `write`, and finally calls `close`. A stage derives its own output
//! [`RecordConfig`] from its input and forwards it, along with every record it
//! produces, to at most one downstream sink held in a [`Downstream`] slot.
//!
//! ```text
//! producer → Joiner → DigitalFilterStage → FrequencyReducer → SignalRemover → Writer
//! ```
//!
//! Stages are synchronous. `write` runs on the caller's thread, does O(record length)
//! work and never blocks on I/O. Callers must serialize their own calls.

pub mod capture;
pub mod filter_stage;
pub mod joiner;
pub mod reducer;
pub mod remover;

pub use capture::{CaptureHandle, CaptureSink};
pub use filter_stage::DigitalFilterStage;
pub use joiner::Joiner;
pub use reducer::FrequencyReducer;
pub use remover::SignalRemover;

use crate::error::{EdfError, EdfResult};
use crate::record::RecordConfig;

/// A consumer of digital data records.
pub trait RecordStream: Send {
    /// Declares the shape of the records that follow.
    ///
    /// Must precede any `write`. Stages recompute their output config and forward it.
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()>;

    /// Pushes one record. Its length must equal the configured record length.
    fn write(&mut self, record: &[i32]) -> EdfResult<()>;

    /// Flushes and closes this stage and everything downstream. Idempotent.
    fn close(&mut self) -> EdfResult<()>;
}

impl<T: RecordStream + ?Sized> RecordStream for Box<T> {
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        (**self).configure(config)
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        (**self).write(record)
    }

    fn close(&mut self) -> EdfResult<()> {
        (**self).close()
    }
}

/// Optional downstream sink of a stage.
///
/// An empty slot swallows configs and records. It also remembers the last output
/// config so that a sink connected later is configured on arrival.
#[derive(Default)]
pub struct Downstream {
    sink: Option<Box<dyn RecordStream>>,
    config: Option<RecordConfig>,
}

impl Downstream {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `sink`, replacing any previous one.
    ///
    /// If an output config is already known it is forwarded immediately.
    pub fn connect(&mut self, mut sink: Box<dyn RecordStream>) -> EdfResult<()> {
        if let Some(config) = &self.config {
            sink.configure(config)?;
        }
        self.sink = Some(sink);
        Ok(())
    }

    /// Removes and returns the current sink.
    pub fn disconnect(&mut self) -> Option<Box<dyn RecordStream>> {
        self.sink.take()
    }

    /// Whether a sink is installed.
    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Last config forwarded downstream.
    pub fn config(&self) -> Option<&RecordConfig> {
        self.config.as_ref()
    }

    /// Stores `config` and forwards it to the sink.
    pub fn configure(&mut self, config: RecordConfig) -> EdfResult<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.configure(&config)?;
        }
        self.config = Some(config);
        Ok(())
    }

    /// Forwards a record to the sink.
    pub fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.write(record),
            None => Ok(()),
        }
    }

    /// Closes the sink.
    pub fn close(&mut self) -> EdfResult<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }
}

/// Per-stage lifecycle bookkeeping shared by the filter stages.
#[derive(Debug, Default)]
pub(crate) struct StageState {
    pub(crate) input: Option<RecordConfig>,
    pub(crate) started: bool,
    pub(crate) closed: bool,
}

impl StageState {
    /// The input config, or a `State` error naming `stage` when unconfigured.
    pub(crate) fn input(&self, stage: &str) -> EdfResult<&RecordConfig> {
        self.input
            .as_ref()
            .ok_or_else(|| EdfError::State(format!("{stage} used before configure")))
    }

    /// Validates a pushed record against the input config.
    pub(crate) fn accept(&mut self, stage: &str, record: &[i32]) -> EdfResult<&RecordConfig> {
        if self.closed {
            return Err(EdfError::State(format!("{stage} is closed")));
        }
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| EdfError::State(format!("{stage} received data before configure")))?;
        let expected = input.record_length();
        if record.len() != expected {
            return Err(EdfError::State(format!(
                "{stage} expected a record of {expected} samples, got {}",
                record.len()
            )));
        }
        self.started = true;
        Ok(input)
    }

    /// Marks the stage closed. Returns false when it already was.
    pub(crate) fn begin_close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }
}

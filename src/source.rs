//! A mock producer that generates synthetic records.
//!
//! Stands in for acquisition hardware: each signal carries a sine wave with a small
//! deterministic ripple, scaled to stay inside the signal's digital range.
use crate::error::{EdfError, EdfResult};
use crate::record::{DataRecord, RecordConfig};
use crate::stream::RecordStream;
use std::f64::consts::TAU;
use tracing::debug;

/// Generates bounded sine-wave records for a fixed [`RecordConfig`].
pub struct SyntheticSource {
    config: RecordConfig,
    frequencies: Vec<f64>,
    records_emitted: u64,
}

impl SyntheticSource {
    /// A source for `config`. Signal `i` oscillates at `i + 1` Hz.
    pub fn new(config: RecordConfig) -> EdfResult<Self> {
        config.validate()?;
        let frequencies = (0..config.signal_count()).map(|i| (i + 1) as f64).collect();
        Ok(Self {
            config,
            frequencies,
            records_emitted: 0,
        })
    }

    /// Sets the frequency of `signal` in Hz.
    pub fn with_frequency(mut self, signal: usize, hz: f64) -> EdfResult<Self> {
        self.config.check_signal(signal)?;
        if !(hz.is_finite() && hz >= 0.0) {
            return Err(EdfError::Config(format!(
                "synthetic frequency for signal {signal} must be non-negative, got {hz}"
            )));
        }
        self.frequencies[signal] = hz;
        Ok(self)
    }

    /// Shape of the generated records.
    pub fn config(&self) -> &RecordConfig {
        &self.config
    }

    /// Records generated so far.
    pub fn records_emitted(&self) -> u64 {
        self.records_emitted
    }

    /// Generates the next record.
    pub fn generate_record(&mut self) -> DataRecord {
        let record_start = self.records_emitted as f64 * self.config.duration;
        let mut record = Vec::with_capacity(self.config.record_length());
        for (signal, frequency) in self.config.signals.iter().zip(&self.frequencies) {
            let low = f64::from(signal.digital_min);
            let high = f64::from(signal.digital_max);
            let mid = (low + high) / 2.0;
            let amplitude = (high - low) / 2.0 * 0.9;
            let step = self.config.duration / signal.samples_per_record as f64;
            record.extend((0..signal.samples_per_record).map(|k| {
                let t = record_start + k as f64 * step;
                let phase = TAU * frequency * t;
                let ripple = (phase * 37.0).sin() * 0.05;
                let value = mid + amplitude * (phase.sin() * 0.95 + ripple);
                signal.clamp(value.round() as i32)
            }));
        }
        self.records_emitted += 1;
        record
    }

    /// Sends the record configuration to `sink`.
    pub fn configure<S: RecordStream + ?Sized>(&self, sink: &mut S) -> EdfResult<()> {
        sink.configure(&self.config)
    }

    /// Generates `count` records and pushes them into `sink`.
    pub fn pump<S: RecordStream + ?Sized>(&mut self, sink: &mut S, count: usize) -> EdfResult<()> {
        for _ in 0..count {
            let record = self.generate_record();
            sink.write(&record)?;
        }
        debug!(count, total = self.records_emitted, "synthetic records pushed");
        Ok(())
    }
}

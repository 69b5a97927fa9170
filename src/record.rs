//! Record shape and per-signal metadata.
//!
//! A [`RecordConfig`] describes one data record: its duration and the ordered list of
//! signals it contains. The order of [`SignalDescriptor`]s is semantic. It fixes the
//! layout of every [`DataRecord`]: one contiguous block per signal, in descriptor
//! order, each block holding `samples_per_record` samples.
//!
//! Stages never mutate a config they were handed. Each stage derives a fresh output
//! config from its input with a pure function and passes that downstream.

use crate::error::{EdfError, EdfResult};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One record worth of digital samples for every signal, in descriptor order.
pub type DataRecord = Vec<i32>;

/// Metadata for a single measured channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    /// Channel label, e.g. "EEG Fp1".
    pub label: String,
    /// Transducer type, e.g. "AgAgCl electrode".
    pub transducer: String,
    /// Human readable prefiltering description. Filter stages append to it.
    pub prefiltering: String,
    /// Physical unit, e.g. "uV".
    pub physical_dimension: String,
    /// Smallest storable integer sample.
    pub digital_min: i32,
    /// Largest storable integer sample.
    pub digital_max: i32,
    /// Physical value of `digital_min`.
    pub physical_min: f64,
    /// Physical value of `digital_max`.
    pub physical_max: f64,
    /// Samples this channel contributes to one record.
    pub samples_per_record: usize,
}

impl SignalDescriptor {
    /// Creates a descriptor with empty text fields.
    pub fn new(
        label: impl Into<String>,
        samples_per_record: usize,
        digital_range: (i32, i32),
        physical_range: (f64, f64),
    ) -> Self {
        Self {
            label: label.into(),
            transducer: String::new(),
            prefiltering: String::new(),
            physical_dimension: String::new(),
            digital_min: digital_range.0,
            digital_max: digital_range.1,
            physical_min: physical_range.0,
            physical_max: physical_range.1,
            samples_per_record,
        }
    }

    /// Sets the transducer description.
    pub fn with_transducer(mut self, transducer: impl Into<String>) -> Self {
        self.transducer = transducer.into();
        self
    }

    /// Sets the physical unit.
    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.physical_dimension = dimension.into();
        self
    }

    /// Sets the prefiltering description.
    pub fn with_prefiltering(mut self, prefiltering: impl Into<String>) -> Self {
        self.prefiltering = prefiltering.into();
        self
    }

    /// Checks the calibration ranges.
    pub fn validate(&self) -> EdfResult<()> {
        if self.digital_max <= self.digital_min {
            return Err(EdfError::Config(format!(
                "signal '{}': digital maximum {} must exceed digital minimum {}",
                self.label, self.digital_max, self.digital_min
            )));
        }
        if !self.physical_min.is_finite() || !self.physical_max.is_finite() {
            return Err(EdfError::Config(format!(
                "signal '{}': physical range must be finite",
                self.label
            )));
        }
        if self.physical_max == self.physical_min {
            return Err(EdfError::Config(format!(
                "signal '{}': physical maximum equals physical minimum ({})",
                self.label, self.physical_max
            )));
        }
        Ok(())
    }

    /// Clamps a digital value into `[digital_min, digital_max]`.
    #[inline]
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.digital_min, self.digital_max)
    }
}

/// Shape of one data record: its duration and the ordered signals it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Duration of one record in seconds.
    pub duration: f64,
    /// Signals in record layout order.
    pub signals: Vec<SignalDescriptor>,
}

impl RecordConfig {
    /// Creates a config, rejecting a non-positive duration.
    pub fn new(duration: f64, signals: Vec<SignalDescriptor>) -> EdfResult<Self> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(EdfError::Config(format!(
                "record duration must be a positive number of seconds, got {duration}"
            )));
        }
        Ok(Self { duration, signals })
    }

    /// Number of signals in the record.
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Total samples in one record.
    pub fn record_length(&self) -> usize {
        self.signals.iter().map(|s| s.samples_per_record).sum()
    }

    /// Offset of the first sample of `signal` within a record.
    pub fn signal_offset(&self, signal: usize) -> usize {
        self.signals[..signal]
            .iter()
            .map(|s| s.samples_per_record)
            .sum()
    }

    /// Sample ranges of every signal block, in descriptor order.
    pub fn signal_ranges(&self) -> Vec<Range<usize>> {
        let mut offset = 0;
        self.signals
            .iter()
            .map(|s| {
                let range = offset..offset + s.samples_per_record;
                offset = range.end;
                range
            })
            .collect()
    }

    /// Sample rate of `signal` in Hz.
    pub fn sample_rate(&self, signal: usize) -> f64 {
        self.signals[signal].samples_per_record as f64 / self.duration
    }

    /// Returns an error unless `signal` indexes a descriptor.
    pub fn check_signal(&self, signal: usize) -> EdfResult<&SignalDescriptor> {
        self.signals.get(signal).ok_or_else(|| {
            EdfError::Config(format!(
                "signal index {signal} out of range (record has {} signals)",
                self.signals.len()
            ))
        })
    }

    /// Validates the duration and every descriptor's calibration range.
    pub fn validate(&self) -> EdfResult<()> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(EdfError::Config(format!(
                "record duration must be a positive number of seconds, got {}",
                self.duration
            )));
        }
        self.signals.iter().try_for_each(SignalDescriptor::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sizes: &[usize]) -> RecordConfig {
        let signals = sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| SignalDescriptor::new(format!("S{i}"), n, (-100, 100), (-1.0, 1.0)))
            .collect();
        RecordConfig::new(1.0, signals).unwrap()
    }

    #[test]
    fn record_length_is_sum_of_samples() {
        let cfg = config(&[1, 6, 2]);
        assert_eq!(cfg.record_length(), 9);
        assert_eq!(cfg.signal_offset(2), 7);
        assert_eq!(cfg.signal_ranges(), vec![0..1, 1..7, 7..9]);
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(RecordConfig::new(0.0, vec![]).is_err());
        assert!(RecordConfig::new(-1.0, vec![]).is_err());
        assert!(RecordConfig::new(f64::NAN, vec![]).is_err());
    }

    #[test]
    fn rejects_degenerate_ranges() {
        let flat_digital = SignalDescriptor::new("x", 1, (5, 5), (0.0, 1.0));
        assert!(matches!(flat_digital.validate(), Err(EdfError::Config(_))));
        let flat_physical = SignalDescriptor::new("x", 1, (0, 5), (2.0, 2.0));
        assert!(matches!(flat_physical.validate(), Err(EdfError::Config(_))));
    }

    #[test]
    fn sample_rate_follows_duration() {
        let mut cfg = config(&[250, 10]);
        cfg.duration = 0.5;
        assert_eq!(cfg.sample_rate(0), 500.0);
        assert_eq!(cfg.sample_rate(1), 20.0);
    }
}

//! Sample-rate reduction by block averaging.
//!
//! A signal with divider `d` emits one sample per `d` input samples: the sum of the
//! block accumulated in an `i64`, divided by `d` and truncated toward zero. Signals
//! without a divider pass through unchanged.

use super::{Downstream, RecordStream, StageState};
use crate::error::{EdfError, EdfResult};
use crate::record::RecordConfig;
use tracing::debug;

const STAGE: &str = "frequency reducer";

/// Decimates individual signals by integer dividers.
pub struct FrequencyReducer {
    state: StageState,
    /// Divider per input signal, 1 meaning passthrough.
    dividers: Vec<usize>,
    output: Vec<i32>,
    downstream: Downstream,
}

impl Default for FrequencyReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyReducer {
    /// A reducer with no dividers registered.
    pub fn new() -> Self {
        Self {
            state: StageState::default(),
            dividers: Vec::new(),
            output: Vec::new(),
            downstream: Downstream::new(),
        }
    }

    /// Registers `divider` for `signal`.
    ///
    /// The signal's samples per record must be a multiple of `divider`. On success
    /// the output config is recomputed and forwarded downstream; on failure nothing
    /// changes.
    pub fn set_divider(&mut self, signal: usize, divider: usize) -> EdfResult<()> {
        let input = self.state.input(STAGE)?;
        let descriptor = input.check_signal(signal)?;
        if divider == 0 {
            return Err(EdfError::Config(format!(
                "signal {signal} ('{}'): divider must be at least 1",
                descriptor.label
            )));
        }
        if descriptor.samples_per_record % divider != 0 {
            return Err(EdfError::Config(format!(
                "signal {signal} ('{}'): {} samples per record is not divisible by divider {divider}",
                descriptor.label, descriptor.samples_per_record
            )));
        }

        let mut dividers = self.dividers.clone();
        dividers[signal] = divider;
        let output = derive(input, &dividers);
        self.downstream.configure(output)?;

        debug!(signal, divider, "divider registered");
        self.dividers = dividers;
        self.resize_output();
        Ok(())
    }

    /// Divider currently registered for `signal`.
    pub fn divider(&self, signal: usize) -> Option<usize> {
        self.dividers.get(signal).copied()
    }

    /// Output config for `input` under the current dividers.
    pub fn derive_config(&self, input: &RecordConfig) -> RecordConfig {
        derive(input, &self.dividers)
    }

    /// Output config, once configured.
    pub fn output_config(&self) -> Option<&RecordConfig> {
        self.downstream.config()
    }

    /// Installs the downstream sink.
    pub fn connect(&mut self, sink: Box<dyn RecordStream>) -> EdfResult<()> {
        self.downstream.connect(sink)
    }

    fn resize_output(&mut self) {
        let length = self
            .downstream
            .config()
            .map(RecordConfig::record_length)
            .unwrap_or(0);
        self.output = vec![0; length];
    }
}

fn derive(input: &RecordConfig, dividers: &[usize]) -> RecordConfig {
    let mut output = input.clone();
    for (signal, divider) in output.signals.iter_mut().zip(dividers) {
        signal.samples_per_record /= divider;
    }
    output
}

impl RecordStream for FrequencyReducer {
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        // Keep registered dividers when they still fit the new shape.
        let mut dividers = vec![1; config.signal_count()];
        for (signal, &divider) in self.dividers.iter().enumerate().filter(|&(_, &d)| d > 1) {
            let descriptor = config.signals.get(signal).ok_or_else(|| {
                EdfError::Config(format!(
                    "divider registered for signal {signal}, but the record has {} signals",
                    config.signal_count()
                ))
            })?;
            if descriptor.samples_per_record % divider != 0 {
                return Err(EdfError::Config(format!(
                    "signal {signal} ('{}'): {} samples per record is not divisible by divider {divider}",
                    descriptor.label, descriptor.samples_per_record
                )));
            }
            dividers[signal] = divider;
        }

        let output = derive(config, &dividers);
        debug!(
            record_length = output.record_length(),
            signals = output.signal_count(),
            "frequency reducer configured"
        );
        self.downstream.configure(output)?;
        self.dividers = dividers;
        self.state.input = Some(config.clone());
        self.resize_output();
        Ok(())
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        let input = self.state.accept(STAGE, record)?;

        let mut in_pos = 0;
        let mut out_pos = 0;
        for (signal, &divider) in input.signals.iter().zip(&self.dividers) {
            let block = &record[in_pos..in_pos + signal.samples_per_record];
            if divider == 1 {
                self.output[out_pos..out_pos + block.len()].copy_from_slice(block);
                out_pos += block.len();
            } else {
                for chunk in block.chunks_exact(divider) {
                    let sum: i64 = chunk.iter().map(|&v| i64::from(v)).sum();
                    self.output[out_pos] = (sum / divider as i64) as i32;
                    out_pos += 1;
                }
            }
            in_pos += signal.samples_per_record;
        }

        self.downstream.write(&self.output)
    }

    fn close(&mut self) -> EdfResult<()> {
        if !self.state.begin_close() {
            return Ok(());
        }
        self.downstream.close()
    }
}

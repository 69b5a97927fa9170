//! Per-signal digital filtering that keeps calibration meaning.
//!
//! For a filtered signal each raw sample `v` becomes `v + offset`, which is
//! proportional to the physical value, runs through the signal's filters in
//! registration order, is shifted back by `offset` and truncated toward zero.
//! Filter coefficients therefore mean the same thing whatever the bit depth.
//!
//! Truncation (not rounding) is kept deliberately; it biases positive values by up
//! to one digital step.

use super::{Downstream, RecordStream, StageState};
use crate::calibration::Calibration;
use crate::error::{EdfError, EdfResult};
use crate::filters::DigitalFilter;
use crate::record::RecordConfig;
use std::collections::BTreeMap;
use tracing::debug;

const STAGE: &str = "digital filter stage";

struct SignalFilters {
    offset: f64,
    chain: Vec<Box<dyn DigitalFilter>>,
}

/// Applies ordered filter chains to selected signals.
#[derive(Default)]
pub struct DigitalFilterStage {
    state: StageState,
    filters: BTreeMap<usize, SignalFilters>,
    output: Vec<i32>,
    downstream: Downstream,
}

impl DigitalFilterStage {
    /// A stage with no filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `filter` to the chain of `signal`.
    ///
    /// The output config's prefiltering text for the signal gains the filter name and
    /// is forwarded downstream.
    pub fn add_filter(&mut self, signal: usize, filter: Box<dyn DigitalFilter>) -> EdfResult<()> {
        let input = self.state.input(STAGE)?;
        let descriptor = input.check_signal(signal)?;
        let offset = Calibration::new(descriptor)?.offset();

        let mut output = self.derive_config(input);
        append_prefilter(&mut output.signals[signal].prefiltering, &filter.name());
        self.downstream.configure(output)?;

        debug!(signal, filter = %filter.name(), "filter registered");
        self.filters
            .entry(signal)
            .or_insert_with(|| SignalFilters {
                offset,
                chain: Vec::new(),
            })
            .chain
            .push(filter);
        Ok(())
    }

    /// Number of filters registered on `signal`.
    pub fn filter_count(&self, signal: usize) -> usize {
        self.filters.get(&signal).map_or(0, |f| f.chain.len())
    }

    /// Output config for `input`: prefiltering descriptions extended with filter names.
    pub fn derive_config(&self, input: &RecordConfig) -> RecordConfig {
        let mut output = input.clone();
        for (&signal, filters) in &self.filters {
            if let Some(descriptor) = output.signals.get_mut(signal) {
                for filter in &filters.chain {
                    append_prefilter(&mut descriptor.prefiltering, &filter.name());
                }
            }
        }
        output
    }

    /// Output config, once configured.
    pub fn output_config(&self) -> Option<&RecordConfig> {
        self.downstream.config()
    }

    /// Installs the downstream sink.
    pub fn connect(&mut self, sink: Box<dyn RecordStream>) -> EdfResult<()> {
        self.downstream.connect(sink)
    }
}

fn append_prefilter(prefiltering: &mut String, name: &str) {
    if !prefiltering.is_empty() {
        prefiltering.push(';');
    }
    prefiltering.push_str(name);
}

impl RecordStream for DigitalFilterStage {
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        let mut offsets = Vec::with_capacity(self.filters.len());
        for &signal in self.filters.keys() {
            let descriptor = config.signals.get(signal).ok_or_else(|| {
                EdfError::Config(format!(
                    "filters registered for signal {signal}, but the record has {} signals",
                    config.signal_count()
                ))
            })?;
            offsets.push(Calibration::new(descriptor)?.offset());
        }

        let output = self.derive_config(config);
        debug!(
            filtered_signals = self.filters.len(),
            record_length = output.record_length(),
            "digital filter stage configured"
        );
        self.downstream.configure(output)?;

        for (filters, offset) in self.filters.values_mut().zip(offsets) {
            filters.offset = offset;
        }
        self.output = vec![0; config.record_length()];
        self.state.input = Some(config.clone());
        Ok(())
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        let input = self.state.accept(STAGE, record)?;

        self.output.copy_from_slice(record);
        for (&signal, filters) in self.filters.iter_mut() {
            let start = input.signal_offset(signal);
            let end = start + input.signals[signal].samples_per_record;
            for sample in &mut self.output[start..end] {
                let mut value = f64::from(*sample) + filters.offset;
                for filter in filters.chain.iter_mut() {
                    value = filter.filtered_value(value);
                }
                *sample = (value - filters.offset) as i32;
            }
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

//! Assembles the stage chain between a producer and its terminal sink.
//!
//! ```text
//! producer → Joiner → DigitalFilterStage → FrequencyReducer → SignalRemover → sink
//! ```
//!
//! Signal indices given to the builder refer to the producer's numbering. Filters
//! and dividers run before removal, so those indices are valid at every stage they
//! apply to.
//!
//! Each stage is configured on its own and its parameters registered, then the
//! chain is connected from the tail. Connecting hands each sink its upstream's
//! already-derived config, so nothing needs reaching into a boxed stage afterwards.

use crate::edf::{CloseHandle, EdfWriter};
use crate::error::{EdfError, EdfResult};
use crate::filters::FilterSpec;
use crate::record::RecordConfig;
use crate::settings::{PipelineSettings, Settings};
use crate::stream::{DigitalFilterStage, FrequencyReducer, Joiner, RecordStream, SignalRemover};
use std::path::PathBuf;
use tracing::info;

/// Stage parameters, in the producer's signal numbering.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    join_duration: Option<f64>,
    filters: Vec<FilterSpec>,
    dividers: Vec<(usize, usize)>,
    removals: Vec<usize>,
}

impl PipelineBuilder {
    /// A builder for a pass-through chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder carrying the `[pipeline]` settings.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            join_duration: settings.join_duration,
            filters: settings.filters.clone(),
            dividers: settings
                .dividers
                .iter()
                .map(|d| (d.signal, d.divider))
                .collect(),
            removals: settings.remove_signals.clone(),
        }
    }

    /// Joins records until they last `seconds`.
    pub fn join_duration(mut self, seconds: f64) -> Self {
        self.join_duration = Some(seconds);
        self
    }

    /// Appends a filter.
    pub fn filter(mut self, spec: FilterSpec) -> Self {
        self.filters.push(spec);
        self
    }

    /// Reduces the sample rate of `signal` by `divider`.
    pub fn divider(mut self, signal: usize, divider: usize) -> Self {
        self.dividers.push((signal, divider));
        self
    }

    /// Drops `signal` before the sink.
    pub fn remove_signal(mut self, signal: usize) -> Self {
        self.removals.push(signal);
        self
    }

    /// Builds the chain for records shaped like `input`, ending in `sink`.
    pub fn build(self, input: &RecordConfig, sink: Box<dyn RecordStream>) -> EdfResult<RecordPipeline> {
        input.validate()?;

        let mut joiner = match self.join_duration {
            Some(duration) => Joiner::for_duration(duration, input.duration)?,
            None => Joiner::new(1)?,
        };
        joiner.configure(input)?;
        let joined = configured(joiner.output_config())?;

        let mut filter_stage = DigitalFilterStage::new();
        filter_stage.configure(&joined)?;
        for spec in &self.filters {
            let signal = spec.signal();
            joined.check_signal(signal)?;
            filter_stage.add_filter(signal, spec.build(joined.sample_rate(signal))?)?;
        }
        let filtered = configured(filter_stage.output_config())?;

        let mut reducer = FrequencyReducer::new();
        reducer.configure(&filtered)?;
        for &(signal, divider) in &self.dividers {
            reducer.set_divider(signal, divider)?;
        }
        let reduced = configured(reducer.output_config())?;

        let mut remover = SignalRemover::new();
        remover.configure(&reduced)?;
        for &signal in &self.removals {
            remover.remove_signal(signal)?;
        }
        let output = configured(remover.output_config())?;

        remover.connect(sink)?;
        reducer.connect(Box::new(remover))?;
        filter_stage.connect(Box::new(reducer))?;
        joiner.connect(Box::new(filter_stage))?;

        info!(
            join_factor = joiner.factor(),
            filters = self.filters.len(),
            dividers = self.dividers.len(),
            removed = self.removals.len(),
            output_signals = output.signal_count(),
            output_duration = output.duration,
            "record pipeline assembled"
        );
        Ok(RecordPipeline {
            head: joiner,
            input: input.clone(),
            output,
            writer: None,
            path: None,
        })
    }
}

fn configured(config: Option<&RecordConfig>) -> EdfResult<RecordConfig> {
    config
        .cloned()
        .ok_or_else(|| EdfError::State("pipeline stage has no output configuration".into()))
}

/// A configured stage chain that accepts the producer's records.
pub struct RecordPipeline {
    head: Joiner,
    input: RecordConfig,
    output: RecordConfig,
    writer: Option<CloseHandle>,
    path: Option<PathBuf>,
}

impl RecordPipeline {
    /// Builds the chain described by `settings`, ending in an EDF/BDF writer.
    pub fn recording(settings: &Settings, input: &RecordConfig) -> EdfResult<Self> {
        settings.validate()?;
        let recording = &settings.recording;
        let mut writer = EdfWriter::new(&recording.output_path, recording.writer_options());
        writer.set_patient_id(recording.patient_id.as_str())?;
        writer.set_recording_id(recording.recording_id.as_str())?;
        let handle = writer.close_handle();

        let mut pipeline =
            PipelineBuilder::from_settings(&settings.pipeline).build(input, Box::new(writer))?;
        pipeline.writer = Some(handle);
        pipeline.path = Some(recording.output_path.clone());
        Ok(pipeline)
    }

    /// Shape of the records the producer must push.
    pub fn input_config(&self) -> &RecordConfig {
        &self.input
    }

    /// Shape of the records reaching the sink.
    pub fn output_config(&self) -> &RecordConfig {
        &self.output
    }

    /// Number of producer records joined into one output record.
    pub fn join_factor(&self) -> usize {
        self.head.factor()
    }

    /// Handle closing the writer from another thread, for recording pipelines.
    pub fn close_handle(&self) -> Option<CloseHandle> {
        self.writer.clone()
    }

    /// Output file of a recording pipeline.
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

impl RecordStream for RecordPipeline {
    /// Accepts the config the pipeline was built for; anything else is rejected.
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        if *config == self.input {
            return Ok(());
        }
        Err(EdfError::State(
            "pipeline was built for a different record configuration".into(),
        ))
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        self.head.write(record)
    }

    fn close(&mut self) -> EdfResult<()> {
        self.head.close()
    }
}

//! Drops whole signals from every record.

use super::{Downstream, RecordStream, StageState};
use crate::error::{EdfError, EdfResult};
use crate::record::RecordConfig;
use std::ops::Range;
use tracing::debug;

const STAGE: &str = "signal remover";

/// Removes configured signals, keeping the others in their original order.
pub struct SignalRemover {
    state: StageState,
    /// `removed[i]` is set when input signal `i` is dropped.
    removed: Vec<bool>,
    /// Input ranges copied to the output, in order.
    kept: Vec<Range<usize>>,
    output: Vec<i32>,
    downstream: Downstream,
}

impl Default for SignalRemover {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalRemover {
    /// A remover that drops nothing yet.
    pub fn new() -> Self {
        Self {
            state: StageState::default(),
            removed: Vec::new(),
            kept: Vec::new(),
            output: Vec::new(),
            downstream: Downstream::new(),
        }
    }

    /// Marks input signal `signal` for removal.
    ///
    /// Only allowed after `configure` and before the first record.
    pub fn remove_signal(&mut self, signal: usize) -> EdfResult<()> {
        if self.state.started {
            return Err(EdfError::State(
                "signals cannot be removed once records are flowing".into(),
            ));
        }
        let input = self.state.input(STAGE)?;
        input.check_signal(signal)?;
        if self.removed[signal] {
            return Ok(());
        }

        let mut removed = self.removed.clone();
        removed[signal] = true;
        let output = derive(input, &removed);
        self.downstream.configure(output)?;

        debug!(signal, "signal marked for removal");
        self.kept = kept_ranges(input, &removed);
        self.removed = removed;
        self.output = vec![0; self.kept.iter().map(|r| r.len()).sum()];
        Ok(())
    }

    /// Whether input signal `signal` is dropped.
    pub fn is_removed(&self, signal: usize) -> bool {
        self.removed.get(signal).copied().unwrap_or(false)
    }

    /// Output config for `input` under the current removals.
    pub fn derive_config(&self, input: &RecordConfig) -> RecordConfig {
        derive(input, &self.removed)
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

fn derive(input: &RecordConfig, removed: &[bool]) -> RecordConfig {
    let mut output = input.clone();
    // Highest index first so earlier indices stay valid while deleting.
    for signal in (0..output.signals.len()).rev() {
        if removed.get(signal).copied().unwrap_or(false) {
            output.signals.remove(signal);
        }
    }
    output
}

fn kept_ranges(input: &RecordConfig, removed: &[bool]) -> Vec<Range<usize>> {
    input
        .signal_ranges()
        .into_iter()
        .enumerate()
        .filter(|(signal, _)| !removed.get(*signal).copied().unwrap_or(false))
        .map(|(_, range)| range)
        .filter(|range| !range.is_empty())
        .collect()
}

impl RecordStream for SignalRemover {
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        let count = config.signal_count();
        if let Some(signal) = self.removed.iter().skip(count).position(|&r| r) {
            return Err(EdfError::Config(format!(
                "signal {} marked for removal, but the record has {count} signals",
                signal + count
            )));
        }
        let mut removed = self.removed.clone();
        removed.resize(count, false);

        let output = derive(config, &removed);
        debug!(
            removed = removed.iter().filter(|&&r| r).count(),
            signals = output.signal_count(),
            "signal remover configured"
        );
        self.downstream.configure(output)?;

        self.kept = kept_ranges(config, &removed);
        self.output = vec![0; self.kept.iter().map(|r| r.len()).sum()];
        self.removed = removed;
        self.state.input = Some(config.clone());
        Ok(())
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        self.state.accept(STAGE, record)?;

        let mut out_pos = 0;
        for range in &self.kept {
            let len = range.len();
            self.output[out_pos..out_pos + len].copy_from_slice(&record[range.clone()]);
            out_pos += len;
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

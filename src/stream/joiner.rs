//! Merges `N` consecutive records into one longer record.
//!
//! The output record lasts `N` times as long and every signal carries `N` times as
//! many samples. A signal's samples stay contiguous and in time order:
//!
//! ```text
//! input j, signal with input offset `off` and `c` samples per record
//!     [off, off + c)  →  [off·N + j·c, off·N + j·c + c)
//! ```

use super::{Downstream, RecordStream, StageState};
use crate::error::{EdfError, EdfResult};
use crate::record::RecordConfig;
use tracing::debug;

const STAGE: &str = "joiner";
const RATIO_TOLERANCE: f64 = 1e-9;

/// Concatenates a fixed number of input records per output record.
pub struct Joiner {
    factor: usize,
    state: StageState,
    /// Input offset and sample count of each signal.
    blocks: Vec<(usize, usize)>,
    buffer: Vec<i32>,
    pending: usize,
    downstream: Downstream,
}

impl Joiner {
    /// Joins `factor` input records per output record.
    pub fn new(factor: usize) -> EdfResult<Self> {
        if factor == 0 {
            return Err(EdfError::Config("join factor must be at least 1".into()));
        }
        Ok(Self {
            factor,
            state: StageState::default(),
            blocks: Vec::new(),
            buffer: Vec::new(),
            pending: 0,
            downstream: Downstream::new(),
        })
    }

    /// Joins enough records of `input_duration` seconds to last `target_duration`.
    ///
    /// Fails unless the ratio is a positive integer.
    pub fn for_duration(target_duration: f64, input_duration: f64) -> EdfResult<Self> {
        if !(target_duration > 0.0 && input_duration > 0.0) {
            return Err(EdfError::Config(format!(
                "join durations must be positive (target {target_duration}, input {input_duration})"
            )));
        }
        let ratio = target_duration / input_duration;
        let factor = ratio.round();
        if factor < 1.0 || (ratio - factor).abs() > RATIO_TOLERANCE * ratio.max(1.0) {
            return Err(EdfError::Config(format!(
                "target duration {target_duration}s is not an integral multiple of record duration {input_duration}s"
            )));
        }
        Self::new(factor as usize)
    }

    /// Number of input records per output record.
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Input records buffered towards the next output record.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Output config for `input`.
    pub fn derive_config(&self, input: &RecordConfig) -> RecordConfig {
        let mut output = input.clone();
        output.duration = input.duration * self.factor as f64;
        for signal in &mut output.signals {
            signal.samples_per_record *= self.factor;
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

impl RecordStream for Joiner {
    fn configure(&mut self, config: &RecordConfig) -> EdfResult<()> {
        let output = self.derive_config(config);
        debug!(
            factor = self.factor,
            record_length = output.record_length(),
            duration = output.duration,
            "joiner configured"
        );
        self.downstream.configure(output)?;

        let mut offset = 0;
        self.blocks = config
            .signals
            .iter()
            .map(|s| {
                let block = (offset, s.samples_per_record);
                offset += s.samples_per_record;
                block
            })
            .collect();
        self.buffer = vec![0; config.record_length() * self.factor];
        self.pending = 0;
        self.state.input = Some(config.clone());
        Ok(())
    }

    fn write(&mut self, record: &[i32]) -> EdfResult<()> {
        self.state.accept(STAGE, record)?;

        let j = self.pending;
        for &(offset, count) in &self.blocks {
            let start = offset * self.factor + j * count;
            self.buffer[start..start + count].copy_from_slice(&record[offset..offset + count]);
        }
        self.pending += 1;

        if self.pending == self.factor {
            self.pending = 0;
            self.downstream.write(&self.buffer)?;
            self.buffer.fill(0);
        }
        Ok(())
    }

    fn close(&mut self) -> EdfResult<()> {
        if !self.state.begin_close() {
            return Ok(());
        }
        if self.pending > 0 {
            debug!(dropped = self.pending, "joiner closed with a partial output record");
        }
        self.downstream.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SignalDescriptor;
    use crate::stream::CaptureSink;

    fn config(sizes: &[usize]) -> RecordConfig {
        let signals = sizes
            .iter()
            .map(|&n| SignalDescriptor::new("s", n, (-1000, 1000), (-1.0, 1.0)))
            .collect();
        RecordConfig::new(0.5, signals).unwrap()
    }

    #[test]
    fn interleaves_signal_blocks_in_time_order() {
        let mut joiner = Joiner::new(2).unwrap();
        let (sink, handle) = CaptureSink::new();
        joiner.connect(Box::new(sink)).unwrap();
        joiner.configure(&config(&[1, 2])).unwrap();

        joiner.write(&[1, 10, 11]).unwrap();
        assert!(handle.records().is_empty());
        joiner.write(&[2, 20, 21]).unwrap();

        assert_eq!(handle.records(), vec![vec![1, 2, 10, 11, 20, 21]]);
        let out = handle.config().unwrap();
        assert_eq!(out.duration, 1.0);
        assert_eq!(out.signals[1].samples_per_record, 4);
    }

    #[test]
    fn four_records_make_one_of_four_times_the_length() {
        let mut joiner = Joiner::new(4).unwrap();
        let (sink, handle) = CaptureSink::new();
        joiner.connect(Box::new(sink)).unwrap();
        let cfg = config(&[1, 6, 2]);
        joiner.configure(&cfg).unwrap();

        for i in 0..4 {
            let record: Vec<i32> = (0..9).map(|k| i * 100 + k).collect();
            joiner.write(&record).unwrap();
        }
        let records = handle.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 36);
        // signal 0 block: first sample of each input record
        assert_eq!(&records[0][0..4], &[0, 100, 200, 300]);
        // signal 2 block starts at 7 * 4
        assert_eq!(&records[0][28..32], &[7, 8, 107, 108]);
    }

    #[test]
    fn non_integral_ratio_is_rejected() {
        assert!(matches!(Joiner::for_duration(1.0, 0.3), Err(EdfError::Config(_))));
        assert!(matches!(Joiner::for_duration(0.5, 1.0), Err(EdfError::Config(_))));
        assert_eq!(Joiner::for_duration(1.0, 0.25).unwrap().factor(), 4);
        assert!(Joiner::new(0).is_err());
    }

    #[test]
    fn rejects_wrong_record_length() {
        let mut joiner = Joiner::new(2).unwrap();
        joiner.configure(&config(&[2])).unwrap();
        assert!(matches!(joiner.write(&[1, 2, 3]), Err(EdfError::State(_))));
    }
}

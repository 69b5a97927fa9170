//! Per-sample digital filters used by [`DigitalFilterStage`](crate::stream::DigitalFilterStage).
//!
//! A filter is anything that maps one real value to another and may keep state
//! between calls. Concrete filters live in submodules; [`FilterSpec`] builds them
//! from settings the way processors are built from TOML tables.

pub mod iir;
pub mod moving_average;

pub use iir::{IirFilter, IirFilterConfig, IirFilterType};
pub use moving_average::MovingAverage;

use crate::error::{EdfError, EdfResult};
use serde::{Deserialize, Serialize};

/// A stateful real-valued filter applied sample by sample.
pub trait DigitalFilter: Send {
    /// Feeds `value` through the filter and returns the filtered value.
    fn filtered_value(&mut self, value: f64) -> f64;

    /// Short description appended to the signal's prefiltering field.
    fn name(&self) -> String;
}

/// Settings-level description of a filter attached to one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Mean of the last `window` samples.
    MovingAverage {
        /// Signal index in the producer's numbering.
        signal: usize,
        /// Window length in samples.
        window: usize,
    },
    /// Second-order IIR section.
    Iir {
        /// Signal index in the producer's numbering.
        signal: usize,
        /// Response type.
        filter_type: IirFilterType,
        /// Cutoff or centre frequency in Hz.
        cutoff_hz: f64,
        /// Quality factor; Butterworth when absent.
        #[serde(default)]
        q: Option<f64>,
    },
}

impl FilterSpec {
    /// Signal the filter applies to.
    pub fn signal(&self) -> usize {
        match self {
            FilterSpec::MovingAverage { signal, .. } | FilterSpec::Iir { signal, .. } => *signal,
        }
    }

    /// Checks parameters that do not depend on the signal's sample rate.
    pub fn validate(&self) -> EdfResult<()> {
        match self {
            FilterSpec::MovingAverage { window: 0, signal } => Err(EdfError::Config(format!(
                "moving average on signal {signal} needs a window of at least 1"
            ))),
            FilterSpec::Iir {
                cutoff_hz, signal, ..
            } if !(cutoff_hz.is_finite() && *cutoff_hz > 0.0) => Err(EdfError::Config(format!(
                "IIR filter on signal {signal} needs a positive cutoff, got {cutoff_hz}"
            ))),
            _ => Ok(()),
        }
    }

    /// Builds the filter for a signal sampled at `sample_rate` Hz.
    pub fn build(&self, sample_rate: f64) -> EdfResult<Box<dyn DigitalFilter>> {
        self.validate()?;
        match *self {
            FilterSpec::MovingAverage { window, .. } => Ok(Box::new(MovingAverage::new(window)?)),
            FilterSpec::Iir {
                filter_type,
                cutoff_hz,
                q,
                ..
            } => {
                let filter = IirFilter::new(IirFilterConfig {
                    filter_type,
                    f0: cutoff_hz,
                    fs: sample_rate,
                    q,
                })?;
                Ok(Box::new(filter))
            }
        }
    }
}

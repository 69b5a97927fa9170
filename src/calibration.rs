//! Digital ↔ physical value conversion.
//!
//! ```text
//! gain   = (physical_max - physical_min) / (digital_max - digital_min)
//! offset = physical_max / gain - digital_max
//! physical = (digital + offset) * gain
//! digital  = physical / gain - offset
//! ```
//!
//! `offset` is the shift that makes `digital + offset` proportional to the physical
//! value, which the digital filter stage relies on.

use crate::error::{EdfError, EdfResult};
use crate::record::{RecordConfig, SignalDescriptor};

/// Cached gain and offset for one signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    gain: f64,
    offset: f64,
}

impl Calibration {
    /// Computes gain and offset, failing on a zero-width digital or physical range.
    pub fn new(signal: &SignalDescriptor) -> EdfResult<Self> {
        if signal.digital_max == signal.digital_min {
            return Err(EdfError::Config(format!(
                "signal '{}': digital range is empty ({})",
                signal.label, signal.digital_max
            )));
        }
        if signal.physical_max == signal.physical_min {
            return Err(EdfError::Config(format!(
                "signal '{}': physical range is empty ({})",
                signal.label, signal.physical_max
            )));
        }
        let gain = (signal.physical_max - signal.physical_min)
            / (f64::from(signal.digital_max) - f64::from(signal.digital_min));
        let offset = signal.physical_max / gain - f64::from(signal.digital_max);
        Ok(Self { gain, offset })
    }

    /// Calibrations for every signal of `config`, in order.
    pub fn for_config(config: &RecordConfig) -> EdfResult<Vec<Self>> {
        config.signals.iter().map(Self::new).collect()
    }

    /// Physical units per digital step.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Digital shift applied before scaling.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Converts a stored integer to its physical value.
    #[inline]
    pub fn to_physical(&self, digital: i32) -> f64 {
        (f64::from(digital) + self.offset) * self.gain
    }

    /// Converts a physical value to the (unrounded) digital scale.
    #[inline]
    pub fn to_digital(&self, physical: f64) -> f64 {
        physical / self.gain - self.offset
    }
}

/// One-shot digital → physical conversion for `signal`.
pub fn digital_to_physical(signal: &SignalDescriptor, digital: i32) -> EdfResult<f64> {
    Ok(Calibration::new(signal)?.to_physical(digital))
}

/// One-shot physical → digital conversion for `signal`.
pub fn physical_to_digital(signal: &SignalDescriptor, physical: f64) -> EdfResult<f64> {
    Ok(Calibration::new(signal)?.to_digital(physical))
}

//! An IIR (Infinite Impulse Response) filter.
use super::DigitalFilter;
use crate::error::{EdfError, EdfResult};
use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Q_BUTTERWORTH_F64};
use serde::{Deserialize, Serialize};

/// The type of IIR filter to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IirFilterType {
    /// A low-pass filter allows frequencies below the cutoff frequency to pass through.
    Lowpass,
    /// A high-pass filter allows frequencies above the cutoff frequency to pass through.
    Highpass,
    /// A band-pass filter allows frequencies within a certain range to pass through.
    Bandpass,
    /// A band-stop (or notch) filter rejects frequencies within a certain range.
    Bandstop,
}

/// Configuration for the `IirFilter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IirFilterConfig {
    /// The type of filter to apply.
    pub filter_type: IirFilterType,
    /// The cutoff or center frequency of the filter in Hz.
    pub f0: f64,
    /// The sample rate of the signal in Hz.
    pub fs: f64,
    /// The quality factor (Q) of the filter. Determines the sharpness of the filter's transition.
    /// If not provided, a default Butterworth Q value is used.
    pub q: Option<f64>,
}

/// A second-order IIR section built with the `biquad` crate.
///
/// It supports low-pass, high-pass, band-pass, and band-stop (notch) responses.
pub struct IirFilter {
    config: IirFilterConfig,
    filter: DirectForm1<f64>,
}

impl IirFilter {
    /// Designs the filter, failing when the cutoff does not fit the sample rate.
    pub fn new(config: IirFilterConfig) -> EdfResult<Self> {
        let coeffs = Self::design_filter(&config)?;
        Ok(Self {
            config,
            filter: DirectForm1::<f64>::new(coeffs),
        })
    }

    fn design_filter(config: &IirFilterConfig) -> EdfResult<Coefficients<f64>> {
        let f0 = config.f0.hz();
        let fs = config.fs.hz();
        let q = config.q.unwrap_or(Q_BUTTERWORTH_F64);

        let kind = match config.filter_type {
            IirFilterType::Lowpass => biquad::Type::LowPass,
            IirFilterType::Highpass => biquad::Type::HighPass,
            IirFilterType::Bandpass => biquad::Type::BandPass,
            IirFilterType::Bandstop => biquad::Type::Notch,
        };
        Coefficients::<f64>::from_params(kind, fs, f0, q).map_err(|_| {
            EdfError::Config(format!(
                "cannot design {:?} filter at {} Hz for a {} Hz signal",
                config.filter_type, config.f0, config.fs
            ))
        })
    }
}

impl DigitalFilter for IirFilter {
    fn filtered_value(&mut self, value: f64) -> f64 {
        self.filter.run(value)
    }

    fn name(&self) -> String {
        let prefix = match self.config.filter_type {
            IirFilterType::Lowpass => "LP",
            IirFilterType::Highpass => "HP",
            IirFilterType::Bandpass => "BP",
            IirFilterType::Bandstop => "N",
        };
        format!("{prefix}:{}Hz", self.config.f0)
    }
}

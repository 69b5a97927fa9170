//! A simple moving average filter.
use super::DigitalFilter;
use crate::error::{EdfError, EdfResult};
use std::collections::VecDeque;

/// Mean of the most recent `window_size` values.
///
/// Until the window fills, the mean covers the values seen so far.
pub struct MovingAverage {
    window_size: usize,
    buffer: VecDeque<f64>,
}

impl MovingAverage {
    /// Creates a filter averaging over `window_size` samples.
    pub fn new(window_size: usize) -> EdfResult<Self> {
        if window_size == 0 {
            return Err(EdfError::Config(
                "moving average window must be at least 1".into(),
            ));
        }
        Ok(Self {
            window_size,
            buffer: VecDeque::with_capacity(window_size),
        })
    }
}

impl DigitalFilter for MovingAverage {
    fn filtered_value(&mut self, value: f64) -> f64 {
        self.buffer.push_back(value);
        if self.buffer.len() > self.window_size {
            self.buffer.pop_front();
        }

        let sum: f64 = self.buffer.iter().sum();
        sum / self.buffer.len() as f64
    }

    fn name(&self) -> String {
        format!("MovAvg:{}", self.window_size)
    }
}

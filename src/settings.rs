//! Layered configuration using Figment
//!
//! Settings are loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `EDF_DAQ_`, nested keys separated by `__`
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration recording to `recording.edf`.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "compact"
//!
//! [recording]
//! output_path = "data/session.bdf"
//! format = "bdf"
//! patient_id = "X X X X"
//!
//! [pipeline]
//! join_duration = 1.0
//! remove_signals = [3]
//!
//! [[pipeline.filters]]
//! kind = "moving_average"
//! signal = 0
//! window = 4
//!
//! [[pipeline.dividers]]
//! signal = 1
//! divider = 2
//! ```
//!
//! Example override: `EDF_DAQ_RECORDING__PATIENT_ID="P 42"`.

use crate::edf::{FileType, WriterOptions};
use crate::error::{EdfError, EdfResult};
use crate::filters::FilterSpec;
use crate::logging::{self, OutputFormat};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "config/edf_daq.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "EDF_DAQ_";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Logging output
    pub logging: LoggingSettings,
    /// Output file and header metadata
    pub recording: RecordingSettings,
    /// Stage chain between the producer and the writer
    pub pipeline: PipelineSettings,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
        }
    }
}

/// `[recording]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// File the writer creates on its first record
    pub output_path: PathBuf,
    /// `edf` (16-bit) or `bdf` (24-bit)
    pub format: FileType,
    /// Patient identification header field
    pub patient_id: String,
    /// Recording identification header field
    pub recording_id: String,
    /// Store the measured average record duration on close
    pub average_record_duration: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("recording.edf"),
            format: FileType::Edf,
            patient_id: String::new(),
            recording_id: String::new(),
            average_record_duration: false,
        }
    }
}

impl RecordingSettings {
    /// Writer options for this section.
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions::new(self.format).with_average_record_duration(self.average_record_duration)
    }
}

/// `[pipeline]` section
///
/// Signal indices always use the producer's numbering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Target record duration in seconds; an integral multiple of the producer's
    pub join_duration: Option<f64>,
    /// Filters in application order
    pub filters: Vec<FilterSpec>,
    /// Sample-rate dividers
    pub dividers: Vec<DividerSetting>,
    /// Signals dropped before the writer
    pub remove_signals: Vec<usize>,
}

/// One `[[pipeline.dividers]]` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividerSetting {
    /// Signal index
    pub signal: usize,
    /// Samples averaged into one
    pub divider: usize,
}

impl Settings {
    /// Load settings from [`DEFAULT_SETTINGS_PATH`] and the environment
    pub fn load() -> EdfResult<Self> {
        Self::load_from(DEFAULT_SETTINGS_PATH)
    }

    /// Load settings from a specific file path and the environment
    ///
    /// A missing file is not an error; defaults and environment values apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> EdfResult<Self> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> EdfResult<()> {
        logging::parse_log_level(&self.logging.level)?;

        if self.recording.output_path.as_os_str().is_empty() {
            return Err(EdfError::Config("recording.output_path is empty".into()));
        }

        if let Some(duration) = self.pipeline.join_duration {
            if !(duration.is_finite() && duration > 0.0) {
                return Err(EdfError::Config(format!(
                    "Invalid join_duration {duration}. Must be a positive number of seconds"
                )));
            }
        }

        for filter in &self.pipeline.filters {
            filter.validate()?;
        }

        for entry in &self.pipeline.dividers {
            if entry.divider == 0 {
                return Err(EdfError::Config(format!(
                    "Invalid divider 0 for signal {}",
                    entry.signal
                )));
            }
        }

        let mut removed = HashSet::new();
        for &signal in &self.pipeline.remove_signals {
            if !removed.insert(signal) {
                return Err(EdfError::Config(format!(
                    "Signal {signal} listed twice in remove_signals"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::IirFilterType;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.recording.output_path, PathBuf::from("recording.edf"));
        assert_eq!(settings.recording.writer_options(), WriterOptions::default());
    }

    #[test]
    fn file_and_environment_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "edf_daq.toml",
                r#"
                [logging]
                level = "debug"
                format = "json"

                [recording]
                output_path = "out.bdf"
                format = "bdf"
                patient_id = "from file"

                [pipeline]
                join_duration = 2.0
                remove_signals = [2]

                [[pipeline.filters]]
                kind = "moving_average"
                signal = 0
                window = 4

                [[pipeline.filters]]
                kind = "iir"
                signal = 1
                filter_type = "highpass"
                cutoff_hz = 0.5

                [[pipeline.dividers]]
                signal = 1
                divider = 2
                "#,
            )?;
            jail.set_env("EDF_DAQ_RECORDING__PATIENT_ID", "from env");

            let settings = Settings::load_from("edf_daq.toml")
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(settings.logging.level, "debug");
            assert_eq!(settings.logging.format, OutputFormat::Json);
            assert_eq!(settings.recording.format, FileType::Bdf);
            assert_eq!(settings.recording.patient_id, "from env");
            assert_eq!(settings.pipeline.join_duration, Some(2.0));
            assert_eq!(
                settings.pipeline.filters,
                vec![
                    FilterSpec::MovingAverage {
                        signal: 0,
                        window: 4
                    },
                    FilterSpec::Iir {
                        signal: 1,
                        filter_type: IirFilterType::Highpass,
                        cutoff_hz: 0.5,
                        q: None
                    },
                ]
            );
            assert_eq!(
                settings.pipeline.dividers,
                vec![DividerSetting {
                    signal: 1,
                    divider: 2
                }]
            );
            assert!(settings.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.logging.level = "verbose".into();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.pipeline.join_duration = Some(0.0);
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.pipeline.dividers.push(DividerSetting {
            signal: 0,
            divider: 0,
        });
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.pipeline.remove_signals = vec![1, 1];
        assert!(matches!(settings.validate(), Err(EdfError::Config(_))));
    }
}

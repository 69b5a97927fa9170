//! # EDF DAQ Core Library
//!
//! Streaming record pipeline and EDF/BDF storage for multi-channel biosignal
//! acquisition. A producer pushes fixed-shape digital data records into a chain of
//! stages that join, filter, decimate and drop signals, and a terminal writer
//! stores the result as an EDF (16-bit) or BDF (24-bit) file that the reader can
//! open again.
//!
//! ## Crate Structure
//!
//! - **`error`**: the `EdfError` enum shared by every module.
//! - **`record`**: `SignalDescriptor`, `RecordConfig` and the flat `DataRecord` layout.
//! - **`calibration`**: digital ↔ physical conversion.
//! - **`stream`**: the `RecordStream` contract and the pipeline stages.
//! - **`filters`**: per-sample digital filters and the settings-level `FilterSpec`.
//! - **`edf`**: header codec, sample codec, `EdfWriter` and `EdfReader`.
//! - **`source`**: a synthetic producer standing in for acquisition hardware.
//! - **`pipeline`**: builds the stage chain from settings.
//! - **`settings`**: layered TOML and environment configuration.
//! - **`logging`**: tracing subscriber initialisation.
//!
//! ## Example
//! ```no_run
//! use edf_daq::{RecordConfig, RecordPipeline, RecordStream, Settings, SignalDescriptor, SyntheticSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! edf_daq::logging::init_from_settings(&settings)?;
//!
//! let config = RecordConfig::new(
//!     0.25,
//!     vec![SignalDescriptor::new("EEG Fp1", 64, (-32768, 32767), (-3276.8, 3276.7))],
//! )?;
//! let mut source = SyntheticSource::new(config.clone())?;
//! let mut pipeline = RecordPipeline::recording(&settings, &config)?;
//! source.pump(&mut pipeline, 40)?;
//! pipeline.close()?;
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod edf;
pub mod error;
pub mod filters;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod settings;
pub mod source;
pub mod stream;

pub use calibration::Calibration;
pub use edf::{EdfHeader, EdfReader, EdfWriter, FileType, WriterOptions};
pub use error::{EdfError, EdfResult};
pub use pipeline::{PipelineBuilder, RecordPipeline};
pub use record::{DataRecord, RecordConfig, SignalDescriptor};
pub use settings::Settings;
pub use source::SyntheticSource;
pub use stream::RecordStream;

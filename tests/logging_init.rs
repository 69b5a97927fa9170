//! Global subscriber installation. Kept in its own test binary so nothing else
//! races it for the global default.

use edf_daq::logging::{self, OutputFormat, TracingConfig};
use edf_daq::Settings;
use tracing::Level;

#[test]
fn init_is_idempotent() {
    let config = TracingConfig::new(Level::DEBUG)
        .with_format(OutputFormat::Compact)
        .with_ansi(false);
    assert!(logging::init(config.clone()).is_ok());
    assert!(logging::init(config).is_ok());

    let mut settings = Settings::default();
    settings.logging.format = OutputFormat::Json;
    assert!(logging::init_from_settings(&settings).is_ok());
    tracing::info!("logging initialised twice");
}

#[test]
fn bad_level_in_settings_is_reported() {
    let mut settings = Settings::default();
    settings.logging.level = "chatty".into();
    assert!(logging::init_from_settings(&settings).is_err());
}

//! Custom error types for the crate.
//!
//! This module defines the primary error type, `EdfError`, shared by the record
//! pipeline, the EDF/BDF codec and the configuration layer. Using the `thiserror`
//! crate it gives a single, consistent way to report every failure the core can
//! produce.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: invalid calibration ranges, a divider that does not evenly divide
//!   a signal's sample count, a non-integral join ratio, bad settings values. Raised
//!   at construction or registration time and fatal to that stage.
//! - **`State`**: caller bugs such as writing after close, breaking the round-robin
//!   write order, or pushing a record whose length does not match the stage input.
//! - **`HeaderFormat`**: a malformed or inconsistent file header on read. Always names
//!   the offending field and the raw text found there.
//! - **`Io`**: wraps `std::io::Error` for every filesystem failure.
//! - **`Settings`**: wraps `figment::Error` raised while loading a settings file.
//!
//! A failing configuration call never leaves a stage partially mutated, so none of
//! these errors require rollback by the caller.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type EdfResult<T> = std::result::Result<T, EdfError>;

/// Primary error type for record streaming and EDF/BDF storage.
#[derive(Error, Debug)]
pub enum EdfError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Header format error in field '{field}': {message}")]
    HeaderFormat { field: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] figment::Error),
}

impl EdfError {
    /// Builds a `HeaderFormat` error for `field`.
    pub fn header(field: impl Into<String>, message: impl Into<String>) -> Self {
        EdfError::HeaderFormat {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the operation may succeed if retried by the caller.
    ///
    /// Only filesystem failures qualify; configuration, state and header errors
    /// are permanent until the caller changes its inputs.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EdfError::Io(_))
    }
}

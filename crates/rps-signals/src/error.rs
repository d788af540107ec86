//! Error types for signal evaluation.

use rps_data::DataError;
use thiserror::Error;

/// Result type for signal operations.
pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors that can occur while evaluating or saving signals.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The price, factor or pool source failed or was empty
    #[error("Data source error: {0}")]
    DataSource(#[from] DataError),

    /// Unknown strategy name
    #[error("Unknown strategy '{name}' (available: {available})")]
    UnknownStrategy {
        /// Requested name
        name: String,
        /// Comma separated list of known strategies
        available: String,
    },

    /// Saving signals failed; the write was rolled back
    #[error("Calculation error: {0}")]
    Calculation(String),
}

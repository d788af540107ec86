//! Error types for factor computation.

use rps_data::DataError;
use thiserror::Error;

/// Result type for factor operations.
pub type Result<T> = std::result::Result<T, FactorError>;

/// Errors that can occur while computing or persisting factors.
#[derive(Debug, Error)]
pub enum FactorError {
    /// The price source failed or returned unusable data
    #[error("Data source error: {0}")]
    DataSource(#[from] DataError),

    /// Input or intermediate data is empty or malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Saving results failed; the write was rolled back
    #[error("Calculation error: {0}")]
    Calculation(String),

    /// Polars error while reading a frame
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

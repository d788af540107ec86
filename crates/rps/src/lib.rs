#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/rps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod pool;

// Re-export main types from sub-crates
pub use rps_data as data;
pub use rps_factors as factors;
pub use rps_output as output;
pub use rps_signals as signals;

pub use config::{ConfigError, EngineConfig};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use pipeline::{FactorRunReport, Pipeline, PipelineError, PipelineReport};
pub use pool::{
    Eligibility, PoolConfig, PoolError, PoolMaintainer, PoolReason, PoolRefreshOutcome,
};

pub use rps_factors::CalculatorReport;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

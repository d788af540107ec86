#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/rps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod calculator;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod panel;
pub mod rank;
pub mod universe;

pub use calculator::{
    CalculatorInfo, EtfCalculator, FactorCalculator, SectorCalculator, StockCalculator,
    available_calculators, build_calculators, calculator_for,
};
pub use engine::{
    CalculatorOutcome, CalculatorReport, DEFAULT_PERIODS, FactorConfig, FactorEngine, RunMode,
    compute_rows,
};
pub use error::{FactorError, Result};
pub use panel::PricePanel;
pub use universe::{DEFAULT_SECTOR_BLACKLIST, UniverseFilter};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

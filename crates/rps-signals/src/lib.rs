#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/rps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod evaluator;
pub mod history;
pub mod rules;
pub mod strategy;

pub use error::{Result, SignalError};
pub use evaluator::{Evaluation, SignalConfig, SignalEvaluator, SignalRunOutcome, SkipReason};
pub use history::PriceHistory;
pub use rules::{RankSnapshot, RuleVerdict, TrendBranch};
pub use strategy::{Strategy, StrategyInfo};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/rps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod report;

pub use export::{ExportError, ExportFormat, Exporter};
pub use report::{ReportError, TopRanked, TopRankedEntry, TopRankedQuery, top_ranked};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

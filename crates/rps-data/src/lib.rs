#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/rps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod source;
pub mod store;

pub use error::{DataError, Result};
pub use model::{
    AssetClass, DATE_FORMAT, Entity, FactorRow, ForeignHolding, FundHolding, PeriodValue,
    PoolMember, PriceBar, SectorMember, SignalRecord, SignalType, Valuation, parse_date,
};
pub use source::{FactorStore, FundamentalSource, PoolStore, PriceSource, SignalStore};
pub use store::{SqliteStore, StoreStats};

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

//! Contracts between the engine and whatever holds the data.
//!
//! The engine only ever sees these traits. [`crate::store::SqliteStore`]
//! implements all of them; callers may substitute their own backend.

use crate::error::Result;
use crate::model::{
    AssetClass, Entity, FactorRow, ForeignHolding, FundHolding, PoolMember, PriceBar,
    SectorMember, SignalRecord, Valuation,
};
use chrono::NaiveDate;
use polars::prelude::DataFrame;

/// Read access to daily bars.
pub trait PriceSource {
    /// Closing prices of every entity of `class` with `start <= date <= end`.
    ///
    /// Returns a frame with columns `entity_id` (str), `date` (str, `%Y-%m-%d`)
    /// and `close` (f64), sorted by date ascending. `start = None` loads all
    /// history. An empty frame means "nothing to compute", not an error.
    fn load_closes(
        &self,
        class: AssetClass,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<DataFrame>;

    /// The last `limit` bars of one entity ending at or before `until`,
    /// oldest first.
    fn history(
        &self,
        class: AssetClass,
        entity_id: &str,
        until: NaiveDate,
        limit: usize,
    ) -> Result<Vec<PriceBar>>;

    /// Most recent trading day present for `class`.
    fn latest_date(&self, class: AssetClass) -> Result<Option<NaiveDate>>;
}

/// Read access to fundamental and reference data.
pub trait FundamentalSource {
    /// All listed stocks.
    fn entities(&self) -> Result<Vec<Entity>>;

    /// Every fund holding report on record.
    fn fund_holdings(&self) -> Result<Vec<FundHolding>>;

    /// Every valuation snapshot on record.
    fn valuations(&self) -> Result<Vec<Valuation>>;

    /// Every cross-border holding snapshot on record.
    fn foreign_holdings(&self) -> Result<Vec<ForeignHolding>>;

    /// Stock memberships of the given sectors.
    fn sector_members(&self, sectors: &[String]) -> Result<Vec<SectorMember>>;
}

/// Persistence of derived factor rows.
pub trait FactorStore {
    /// Replace every row whose date appears in `rows`, in one transaction.
    ///
    /// Returns the number of rows written.
    fn replace_factor_dates(
        &self,
        class: AssetClass,
        periods: &[usize],
        rows: &[FactorRow],
    ) -> Result<usize>;

    /// Replace the entire table contents with `rows`, in one transaction.
    fn replace_factor_table(
        &self,
        class: AssetClass,
        periods: &[usize],
        rows: &[FactorRow],
    ) -> Result<usize>;

    /// All rows stored for `date`.
    fn factor_snapshot(
        &self,
        class: AssetClass,
        date: NaiveDate,
        periods: &[usize],
    ) -> Result<Vec<FactorRow>>;

    /// Most recent date present in the factor table.
    fn latest_factor_date(&self, class: AssetClass) -> Result<Option<NaiveDate>>;
}

/// Persistence of pool membership.
pub trait PoolStore {
    /// Replace the full membership of `pool_name`, in one transaction.
    fn replace_pool(&self, pool_name: &str, members: &[PoolMember]) -> Result<usize>;

    /// Active members of `pool_name`, ordered by entity id.
    fn pool_members(&self, pool_name: &str) -> Result<Vec<PoolMember>>;
}

/// Persistence of fired signals.
pub trait SignalStore {
    /// Replace all signals of `strategy_name` on `date`, in one transaction.
    fn replace_signals(
        &self,
        strategy_name: &str,
        date: NaiveDate,
        rows: &[SignalRecord],
    ) -> Result<usize>;

    /// Signals on `date`, optionally restricted to one strategy.
    fn signals(&self, strategy_name: Option<&str>, date: NaiveDate) -> Result<Vec<SignalRecord>>;
}

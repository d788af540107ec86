//! Pool Maintainer
//!
//! Derives the named pool of entities eligible for signal evaluation from
//! ownership data:
//!
//! - fund ratio: reported fund share count over estimated shares
//!   outstanding, in percent, maximised over the latest reporting quarters;
//! - foreign value: the latest cross-border holding value.
//!
//! An entity qualifies when either reaches its threshold. Each refresh fully
//! replaces the pool.

use chrono::NaiveDate;
use rps_data::{
    DataError, ForeignHolding, FundHolding, FundamentalSource, PoolMember, PoolStore, Valuation,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the pool maintainer.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Fundamentals could not be read or none are stored
    #[error("Data source error: {0}")]
    DataSource(#[from] DataError),

    /// Writing the pool failed; the previous pool is kept
    #[error("Failed to save pool '{pool}': {reason}")]
    Calculation {
        /// Pool name
        pool: String,
        /// Underlying failure
        reason: String,
    },
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Configuration for pool maintenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool name
    pub name: String,
    /// Minimum fund holding ratio, in percent
    pub fund_ratio_threshold: f64,
    /// Reporting quarters whose maximum ratio is used
    pub fund_quarters: usize,
    /// Minimum foreign holding value, in currency units
    pub foreign_value_threshold: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "core".to_string(),
            fund_ratio_threshold: 5.0,
            fund_quarters: 3,
            foreign_value_threshold: 100_000_000.0,
        }
    }
}

/// Condition(s) that admitted an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolReason {
    /// Fund holding ratio only
    Fund,
    /// Foreign holding value only
    Foreign,
    /// Both conditions
    Both,
}

impl PoolReason {
    const fn from_flags(fund: bool, foreign: bool) -> Option<Self> {
        match (fund, foreign) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Fund),
            (false, true) => Some(Self::Foreign),
            (false, false) => None,
        }
    }

    /// Value stored in the `reason` column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fund => "fund",
            Self::Foreign => "foreign",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for PoolReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership figures of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Eligibility {
    /// Entity identifier
    pub entity_id: String,
    /// Highest fund holding ratio over the considered quarters, in percent
    pub fund_ratio: Option<f64>,
    /// Latest foreign holding value
    pub foreign_value: Option<f64>,
    /// Admission reason, `None` when neither threshold is met
    pub reason: Option<PoolReason>,
}

/// Summary of one pool refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRefreshOutcome {
    /// Pool name
    pub pool: String,
    /// Date stamped on every member
    pub as_of: NaiveDate,
    /// Entities with any ownership data
    pub candidates: usize,
    /// Members written
    pub members: usize,
    /// Members admitted by fund ratio only
    pub by_fund: usize,
    /// Members admitted by foreign value only
    pub by_foreign: usize,
    /// Members admitted by both
    pub by_both: usize,
    /// Wall time of the refresh
    pub elapsed: Duration,
}

impl fmt::Display for PoolRefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool '{}' as of {}", self.pool, self.as_of)?;
        writeln!(f, "  Candidates: {}", self.candidates)?;
        writeln!(
            f,
            "  Members:    {} (fund {}, foreign {}, both {})",
            self.members, self.by_fund, self.by_foreign, self.by_both
        )?;
        writeln!(f, "  Elapsed:    {:.2?}", self.elapsed)
    }
}

/// Latest shares outstanding per entity, from valuations dated on or before `as_of`.
fn latest_shares(valuations: &[Valuation], as_of: NaiveDate) -> HashMap<&str, f64> {
    let mut shares: HashMap<&str, (NaiveDate, f64)> = HashMap::new();
    for valuation in valuations.iter().filter(|v| v.date <= as_of) {
        let Some(outstanding) = valuation.shares_outstanding() else {
            continue;
        };
        shares
            .entry(valuation.entity_id.as_str())
            .and_modify(|current| {
                if valuation.date > current.0 {
                    *current = (valuation.date, outstanding);
                }
            })
            .or_insert((valuation.date, outstanding));
    }
    shares.into_iter().map(|(id, (_, s))| (id, s)).collect()
}

/// Maximum fund ratio over the latest `quarters` reports of each entity.
fn fund_ratios(
    holdings: &[FundHolding],
    shares: &HashMap<&str, f64>,
    quarters: usize,
    as_of: NaiveDate,
) -> BTreeMap<String, Option<f64>> {
    let mut reports: BTreeMap<&str, Vec<&FundHolding>> = BTreeMap::new();
    for holding in holdings.iter().filter(|h| h.report_date <= as_of) {
        reports.entry(holding.entity_id.as_str()).or_default().push(holding);
    }

    reports
        .into_iter()
        .map(|(entity_id, mut reports)| {
            reports.sort_by(|a, b| b.report_date.cmp(&a.report_date));
            let ratio = shares.get(entity_id).and_then(|outstanding| {
                reports
                    .iter()
                    .take(quarters)
                    .map(|h| h.share_count / outstanding * 100.0)
                    .filter(|r| r.is_finite())
                    .reduce(f64::max)
            });
            if ratio.is_none() {
                debug!(entity = entity_id, "no usable valuation for fund ratio");
            }
            (entity_id.to_string(), ratio)
        })
        .collect()
}

/// Latest foreign holding value per entity.
fn foreign_values(holdings: &[ForeignHolding], as_of: NaiveDate) -> BTreeMap<String, f64> {
    let mut latest: BTreeMap<String, (NaiveDate, f64)> = BTreeMap::new();
    for holding in holdings.iter().filter(|h| h.date <= as_of) {
        latest
            .entry(holding.entity_id.clone())
            .and_modify(|current| {
                if holding.date > current.0 {
                    *current = (holding.date, holding.hold_value);
                }
            })
            .or_insert((holding.date, holding.hold_value));
    }
    latest.into_iter().map(|(id, (_, v))| (id, v)).collect()
}

/// Maintains one named pool.
#[derive(Debug)]
pub struct PoolMaintainer<'a, S> {
    store: &'a S,
    config: PoolConfig,
}

impl<'a, S> PoolMaintainer<'a, S>
where
    S: FundamentalSource + PoolStore,
{
    /// Create a maintainer over `store`.
    pub const fn new(store: &'a S, config: PoolConfig) -> Self {
        Self { store, config }
    }

    /// Maintainer configuration.
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Ownership figures for every entity with data on or before `as_of`,
    /// ordered by entity id.
    pub fn eligibility(&self, as_of: NaiveDate) -> Result<Vec<Eligibility>> {
        let holdings = self.store.fund_holdings()?;
        let foreign = self.store.foreign_holdings()?;
        if holdings.is_empty() && foreign.is_empty() {
            return Err(
                DataError::missing("fund_holdings, foreign_holdings", "no ownership data stored")
                    .into(),
            );
        }
        let valuations = self.store.valuations()?;

        let shares = latest_shares(&valuations, as_of);
        let mut ratios = fund_ratios(&holdings, &shares, self.config.fund_quarters, as_of);
        let values = foreign_values(&foreign, as_of);
        for entity_id in values.keys() {
            ratios.entry(entity_id.clone()).or_insert(None);
        }

        Ok(ratios
            .into_iter()
            .map(|(entity_id, fund_ratio)| {
                let foreign_value = values.get(&entity_id).copied();
                let fund = fund_ratio.is_some_and(|r| r >= self.config.fund_ratio_threshold);
                let foreign =
                    foreign_value.is_some_and(|v| v >= self.config.foreign_value_threshold);
                Eligibility {
                    entity_id,
                    fund_ratio,
                    foreign_value,
                    reason: PoolReason::from_flags(fund, foreign),
                }
            })
            .collect())
    }

    fn member(&self, entity_id: String, reason: PoolReason, as_of: NaiveDate) -> PoolMember {
        PoolMember {
            pool_name: self.config.name.clone(),
            entity_id,
            reason: reason.to_string(),
            as_of_date: as_of,
            active: true,
        }
    }

    /// Members the pool would hold as of `as_of`.
    pub fn members(&self, as_of: NaiveDate) -> Result<Vec<PoolMember>> {
        Ok(self
            .eligibility(as_of)?
            .into_iter()
            .filter_map(|e| Some(self.member(e.entity_id, e.reason?, as_of)))
            .collect())
    }

    /// Re-derive the pool and replace the stored membership.
    pub fn refresh(&self, as_of: NaiveDate) -> Result<PoolRefreshOutcome> {
        let started = Instant::now();
        let eligibility = self.eligibility(as_of)?;
        let candidates = eligibility.len();

        let mut counts: HashMap<PoolReason, usize> = HashMap::new();
        let members: Vec<PoolMember> = eligibility
            .into_iter()
            .filter_map(|e| {
                let reason = e.reason?;
                *counts.entry(reason).or_default() += 1;
                Some(self.member(e.entity_id, reason, as_of))
            })
            .collect();

        let written = self
            .store
            .replace_pool(&self.config.name, &members)
            .map_err(|e| PoolError::Calculation {
                pool: self.config.name.clone(),
                reason: e.to_string(),
            })?;

        let outcome = PoolRefreshOutcome {
            pool: self.config.name.clone(),
            as_of,
            candidates,
            members: written,
            by_fund: counts.get(&PoolReason::Fund).copied().unwrap_or(0),
            by_foreign: counts.get(&PoolReason::Foreign).copied().unwrap_or(0),
            by_both: counts.get(&PoolReason::Both).copied().unwrap_or(0),
            elapsed: started.elapsed(),
        };
        info!(
            pool = %outcome.pool,
            date = %as_of,
            candidates,
            members = written,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "pool refreshed"
        );
        Ok(outcome)
    }
}

//! Signal Evaluator
//!
//! For a target date, each pool member goes through:
//!
//! 1. pool gate (inactive or absent members are skipped),
//! 2. history gate (at least `min_history` bars, otherwise skipped),
//! 3. rank lookup (50/120/250, missing ranks count as 0),
//! 4. rule evaluation.
//!
//! Per-entity failures are logged and counted; they never abort the batch.
//! The signals of a `(strategy, date)` pair are replaced in one transaction,
//! even when none fired.

use crate::error::{Result, SignalError};
use crate::history::PriceHistory;
use crate::rules::{self, RankSnapshot};
use crate::strategy::Strategy;
use chrono::NaiveDate;
use rps_data::{
    AssetClass, DataError, FactorRow, FactorStore, FundamentalSource, PoolMember, PoolStore,
    PriceSource, SignalRecord, SignalStore, SignalType,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for signal evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Pool whose active members are evaluated
    pub pool: String,
    /// Bars loaded per entity
    pub history_bars: usize,
    /// Bars required before an entity is evaluated
    pub min_history: usize,
    /// Sector rank a sector must exceed to count as strong
    pub sector_rank_threshold: f64,
    /// Stock rank a member stock must exceed
    pub stock_rank_threshold: f64,
    /// Period of the ranks used by sector resonance
    pub resonance_period: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            pool: "core".to_string(),
            history_bars: 300,
            min_history: 250,
            sector_rank_threshold: 90.0,
            stock_rank_threshold: 85.0,
            resonance_period: 20,
        }
    }
}

/// Why an entity was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not an active member of the pool
    NotInPool,
    /// Fewer bars than required
    InsufficientHistory {
        /// Bars available up to the target date
        bars: usize,
        /// Bars required
        required: usize,
    },
}

/// Outcome for one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The rules fired
    Fired(SignalRecord),
    /// Evaluated, nothing fired
    NoSignal,
    /// Not evaluated
    Skipped(SkipReason),
}

/// Summary of one strategy run.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRunOutcome {
    /// Strategy that ran
    pub strategy: Strategy,
    /// Target date
    pub date: NaiveDate,
    /// Entities considered
    pub candidates: usize,
    /// Entities whose rules were evaluated
    pub evaluated: usize,
    /// Entities skipped by a gate
    pub skipped: usize,
    /// Entities whose evaluation failed
    pub failed: usize,
    /// Signals fired and persisted
    pub signals: Vec<SignalRecord>,
    /// Wall time of the run
    pub elapsed: Duration,
}

/// Evaluates strategies against a store.
#[derive(Debug)]
pub struct SignalEvaluator<'a, S> {
    store: &'a S,
    config: SignalConfig,
}

impl<'a, S> SignalEvaluator<'a, S>
where
    S: PriceSource + FactorStore + FundamentalSource + PoolStore + SignalStore,
{
    /// Create an evaluator over `store`.
    pub const fn new(store: &'a S, config: SignalConfig) -> Self {
        Self { store, config }
    }

    /// Evaluator configuration.
    pub const fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Latest stock price date, the default target date.
    pub fn latest_date(&self) -> Result<NaiveDate> {
        self.store
            .latest_date(AssetClass::Stock)?
            .ok_or_else(|| DataError::missing(AssetClass::Stock.price_table(), "no prices stored").into())
    }

    /// Run `strategy` for `date` (default: the latest stock price date) and
    /// persist its signals.
    pub fn run(&self, strategy: Strategy, date: Option<NaiveDate>) -> Result<SignalRunOutcome> {
        let started = Instant::now();
        let date = match date {
            Some(date) => date,
            None => self.latest_date()?,
        };
        info!(strategy = strategy.name(), %date, "running strategy");

        let mut outcome = match strategy {
            Strategy::MrgcSxhcg => self.run_trend(date)?,
            Strategy::SectorResonance => self.run_resonance(date)?,
        };

        self.store
            .replace_signals(strategy.name(), date, &outcome.signals)
            .map_err(|e| SignalError::Calculation(format!("saving {} signals: {}", strategy, e)))?;

        outcome.elapsed = started.elapsed();
        info!(
            strategy = strategy.name(),
            %date,
            candidates = outcome.candidates,
            evaluated = outcome.evaluated,
            skipped = outcome.skipped,
            failed = outcome.failed,
            signals = outcome.signals.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "strategy complete"
        );
        Ok(outcome)
    }

    fn empty_outcome(strategy: Strategy, date: NaiveDate) -> SignalRunOutcome {
        SignalRunOutcome {
            strategy,
            date,
            candidates: 0,
            evaluated: 0,
            skipped: 0,
            failed: 0,
            signals: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    fn stock_factors(&self, date: NaiveDate, periods: &[usize]) -> Result<HashMap<String, FactorRow>> {
        Ok(self
            .store
            .factor_snapshot(AssetClass::Stock, date, periods)?
            .into_iter()
            .map(|row| (row.entity_id.clone(), row))
            .collect())
    }

    /// Evaluate the trend rules for one entity.
    pub fn evaluate(
        &self,
        entity_id: &str,
        date: NaiveDate,
        membership: Option<&PoolMember>,
        factors: Option<&FactorRow>,
    ) -> Result<Evaluation> {
        let Some(member) = membership.filter(|m| m.active) else {
            return Ok(Evaluation::Skipped(SkipReason::NotInPool));
        };

        let bars = self
            .store
            .history(AssetClass::Stock, entity_id, date, self.config.history_bars)?;
        if bars.len() < self.config.min_history {
            debug!(entity = entity_id, bars = bars.len(), "insufficient history");
            return Ok(Evaluation::Skipped(SkipReason::InsufficientHistory {
                bars: bars.len(),
                required: self.config.min_history,
            }));
        }

        let history = PriceHistory::from_bars(&bars);
        let ranks = RankSnapshot::from_row(factors);
        let verdict = rules::evaluate(&history, &ranks);
        if !verdict.fired() {
            return Ok(Evaluation::NoSignal);
        }

        debug!(entity = entity_id, reason = %verdict.reason(), "signal fired");
        let branches: Vec<String> = verdict.branches.iter().map(|b| b.to_string()).collect();
        Ok(Evaluation::Fired(SignalRecord {
            strategy_name: Strategy::MrgcSxhcg.name().to_string(),
            entity_id: entity_id.to_string(),
            date,
            signal_type: SignalType::Buy,
            meta: json!({
                "reason": verdict.reason(),
                "triggered": verdict.triggered(),
                "branches": branches,
                "pool_reason": member.reason,
                "close": history.last_close(),
                "factors": ranks,
            }),
        }))
    }

    fn run_trend(&self, date: NaiveDate) -> Result<SignalRunOutcome> {
        let strategy = Strategy::MrgcSxhcg;
        let members = self.store.pool_members(&self.config.pool)?;
        if members.is_empty() {
            return Err(DataError::missing(
                format!("pool '{}'", self.config.pool),
                "no active members",
            )
            .into());
        }

        let factors = self.stock_factors(date, &RankSnapshot::PERIODS)?;
        let mut outcome = Self::empty_outcome(strategy, date);
        outcome.candidates = members.len();

        for member in &members {
            let entity = member.entity_id.as_str();
            match self.evaluate(entity, date, Some(member), factors.get(entity)) {
                Ok(Evaluation::Fired(signal)) => {
                    outcome.evaluated += 1;
                    outcome.signals.push(signal);
                }
                Ok(Evaluation::NoSignal) => outcome.evaluated += 1,
                Ok(Evaluation::Skipped(_)) => outcome.skipped += 1,
                Err(e) => {
                    warn!(entity, error = %e, "evaluation failed");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    fn run_resonance(&self, date: NaiveDate) -> Result<SignalRunOutcome> {
        let strategy = Strategy::SectorResonance;
        let period = self.config.resonance_period;
        let mut outcome = Self::empty_outcome(strategy, date);

        let strong: Vec<String> = self
            .store
            .factor_snapshot(AssetClass::Sector, date, &[period])?
            .into_iter()
            .filter(|row| row.rank(period).is_some_and(|r| r > self.config.sector_rank_threshold))
            .map(|row| row.entity_id)
            .collect();
        if strong.is_empty() {
            info!(%date, "no strong sectors");
            return Ok(outcome);
        }
        info!(%date, sectors = strong.len(), "strong sectors found");

        // Stock to the strong sectors it belongs to, in stable order.
        let mut sectors_of: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for member in self.store.sector_members(&strong)? {
            sectors_of
                .entry(member.entity_id)
                .or_default()
                .push(member.sector_name);
        }
        outcome.candidates = sectors_of.len();

        let factors = self.stock_factors(date, &[period])?;
        let names: HashMap<String, String> = self
            .store
            .entities()?
            .into_iter()
            .map(|e| (e.entity_id, e.name))
            .collect();

        for (entity, sectors) in sectors_of {
            let Some(rank) = factors.get(&entity).and_then(|row| row.rank(period)) else {
                outcome.skipped += 1;
                continue;
            };
            outcome.evaluated += 1;
            if rank <= self.config.stock_rank_threshold {
                continue;
            }
            let joined = sectors.join(",");
            outcome.signals.push(SignalRecord {
                strategy_name: strategy.name().to_string(),
                entity_id: entity.clone(),
                date,
                signal_type: SignalType::Buy,
                meta: json!({
                    "reason": format!(
                        "sector resonance: [{}] above {}, stock rank {}",
                        joined, self.config.sector_rank_threshold, rank
                    ),
                    "sector": joined,
                    "stock_rps": rank,
                    "name": names.get(&entity),
                }),
            });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use rps_data::{PeriodValue, PriceBar, SqliteStore};

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .checked_add_days(Days::new(offset))
            .unwrap()
    }

    fn member(id: &str, active: bool) -> PoolMember {
        PoolMember {
            pool_name: "core".to_string(),
            entity_id: id.to_string(),
            reason: "fund".to_string(),
            as_of_date: day(0),
            active,
        }
    }

    fn rising_bars(id: &str, count: u64) -> Vec<PriceBar> {
        (0..count)
            .map(|t| {
                let close = 10.0 + 0.05 * t as f64;
                PriceBar {
                    high: close * 1.01,
                    low: close * 0.99,
                    turnover_rate: Some(3.0),
                    ..PriceBar::flat(id, day(t), close)
                }
            })
            .collect()
    }

    fn ranks(id: &str, date: NaiveDate, value: f64) -> FactorRow {
        FactorRow {
            entity_id: id.to_string(),
            date,
            values: RankSnapshot::PERIODS
                .iter()
                .map(|p| PeriodValue {
                    period: *p,
                    change: Some(0.5),
                    rank_pct: Some(value),
                })
                .collect(),
        }
    }

    #[test]
    fn test_not_in_pool_is_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        let evaluator = SignalEvaluator::new(&store, SignalConfig::default());
        let inactive = member("A", false);
        assert_eq!(
            evaluator.evaluate("A", day(0), None, None).unwrap(),
            Evaluation::Skipped(SkipReason::NotInPool)
        );
        assert_eq!(
            evaluator.evaluate("A", day(0), Some(&inactive), None).unwrap(),
            Evaluation::Skipped(SkipReason::NotInPool)
        );
    }

    #[test]
    fn test_short_history_is_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_bars(AssetClass::Stock, &rising_bars("A", 249)).unwrap();
        let evaluator = SignalEvaluator::new(&store, SignalConfig::default());
        let result = evaluator
            .evaluate("A", day(248), Some(&member("A", true)), None)
            .unwrap();
        assert_eq!(
            result,
            Evaluation::Skipped(SkipReason::InsufficientHistory {
                bars: 249,
                required: 250
            })
        );
    }

    #[test]
    fn test_missing_ranks_never_fire() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_bars(AssetClass::Stock, &rising_bars("A", 300)).unwrap();
        let evaluator = SignalEvaluator::new(&store, SignalConfig::default());
        let result = evaluator
            .evaluate("A", day(299), Some(&member("A", true)), None)
            .unwrap();
        assert_eq!(result, Evaluation::NoSignal);
    }

    #[test]
    fn test_fired_signal_meta() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_bars(AssetClass::Stock, &rising_bars("A", 300)).unwrap();
        let evaluator = SignalEvaluator::new(&store, SignalConfig::default());
        let row = ranks("A", day(299), 99.0);
        let Evaluation::Fired(signal) = evaluator
            .evaluate("A", day(299), Some(&member("A", true)), Some(&row))
            .unwrap()
        else {
            panic!("expected a signal");
        };
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert_eq!(signal.meta["reason"], "MRGC+SXHCG triggered");
        assert_eq!(signal.meta["pool_reason"], "fund");
        assert_eq!(signal.meta["factors"]["rank_120"], 99.0);
    }

    #[test]
    fn test_empty_pool_is_a_data_source_error() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_bars(AssetClass::Stock, &rising_bars("A", 5)).unwrap();
        let evaluator = SignalEvaluator::new(&store, SignalConfig::default());
        assert!(matches!(
            evaluator.run(Strategy::MrgcSxhcg, None),
            Err(SignalError::DataSource(_))
        ));
    }

    #[test]
    fn test_no_prices_means_no_default_date() {
        let store = SqliteStore::in_memory().unwrap();
        let evaluator = SignalEvaluator::new(&store, SignalConfig::default());
        assert!(evaluator.latest_date().is_err());
    }
}

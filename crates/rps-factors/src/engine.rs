//! Factor Engine
//!
//! Loads a window of closes, lays it on a forward filled entity by date panel,
//! computes change and percentile rank for every period, then persists the
//! result:
//!
//! - [`RunMode::Init`] replaces the whole factor table.
//! - [`RunMode::Daily`] recomputes over a trailing window and rewrites only the
//!   most recent dates, deleting each affected date before inserting it again.

use crate::calculator::FactorCalculator;
use crate::error::{FactorError, Result};
use crate::panel::PricePanel;
use crate::rank::{change_column, factor_frame, rank_column, round_to};
use crate::universe::DEFAULT_SECTOR_BLACKLIST;
use chrono::{Days, NaiveDate};
use rps_data::{AssetClass, FactorRow, FactorStore, PeriodValue, PriceSource, parse_date};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default lookback periods.
pub const DEFAULT_PERIODS: [usize; 6] = [5, 10, 20, 50, 120, 250];

/// Configuration for the factor engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorConfig {
    /// Lookback periods in observations
    pub periods: Vec<usize>,
    /// Calendar days loaded by an init run (`None` loads all history)
    pub init_days: Option<u64>,
    /// Calendar days loaded by a daily run
    pub incremental_window_days: u64,
    /// Calendar days rewritten by a daily run
    pub save_recent_days: u64,
    /// Substrings that exclude a sector index from ranking
    pub sector_blacklist: Vec<String>,
    /// Decimals kept for `change_<p>`
    pub change_decimals: u32,
    /// Decimals kept for `rank_<p>`
    pub rank_decimals: u32,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            periods: DEFAULT_PERIODS.to_vec(),
            init_days: Some(365),
            incremental_window_days: 400,
            save_recent_days: 5,
            sector_blacklist: DEFAULT_SECTOR_BLACKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            change_decimals: 4,
            rank_decimals: 2,
        }
    }
}

impl FactorConfig {
    /// Configured periods, ascending and without duplicates or zeros.
    pub fn sorted_periods(&self) -> Vec<usize> {
        let mut periods: Vec<usize> = self.periods.iter().copied().filter(|p| *p > 0).collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }
}

/// How much history is recomputed and rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Recompute the configured history and replace the whole table
    Init,
    /// Recompute a trailing window and rewrite the last few dates
    Daily,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Daily => f.write_str("daily"),
        }
    }
}

impl FromStr for RunMode {
    type Err = FactorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "daily" => Ok(Self::Daily),
            other => Err(FactorError::Validation(format!("Unknown run mode: {}", other))),
        }
    }
}

/// Summary of one calculator run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatorOutcome {
    /// Calculator name
    pub calculator: &'static str,
    /// Target asset class
    pub class: AssetClass,
    /// Run mode
    pub mode: RunMode,
    /// First date loaded (`None` means all history)
    pub window_start: Option<NaiveDate>,
    /// Last date loaded
    pub as_of: NaiveDate,
    /// Price rows loaded before filtering
    pub rows_loaded: usize,
    /// Entities ranked
    pub entities: usize,
    /// Factor rows persisted
    pub rows_written: usize,
    /// Distinct dates persisted
    pub dates_written: usize,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl CalculatorOutcome {
    /// Whether the window held no prices and nothing was done.
    pub const fn is_noop(&self) -> bool {
        self.rows_loaded == 0
    }
}

/// Compute factor rows for every date of `panel`.
///
/// A row is emitted for an `(entity, date)` when at least one period has a
/// defined change; periods without enough history stay `None`.
pub fn compute_rows(panel: &PricePanel, periods: &[usize], config: &FactorConfig) -> Result<Vec<FactorRow>> {
    let factors = factor_frame(panel.lazy(), periods).collect()?;
    let ids = factors.column("entity_id")?.str()?;
    let dates = factors.column("date")?.str()?;
    let columns = periods
        .iter()
        .map(|&p| {
            Ok((
                p,
                factors.column(&change_column(p))?.f64()?,
                factors.column(&rank_column(p))?.f64()?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(factors.height());
    for i in 0..factors.height() {
        let (Some(id), Some(raw)) = (ids.get(i), dates.get(i)) else {
            continue;
        };
        let date = parse_date(raw).map_err(|e| FactorError::Validation(e.to_string()))?;
        let values = columns
            .iter()
            .map(|(period, change, rank)| PeriodValue {
                period: *period,
                change: change.get(i).and_then(|v| round_to(v, config.change_decimals)),
                rank_pct: rank.get(i).and_then(|v| round_to(v, config.rank_decimals)),
            })
            .collect();
        rows.push(FactorRow {
            entity_id: id.to_string(),
            date,
            values,
        });
    }
    Ok(rows)
}

/// Result of one calculator within a batch.
#[derive(Debug)]
pub struct CalculatorReport {
    /// Calculator name
    pub calculator: &'static str,
    /// Outcome or the error that stopped this calculator
    pub result: Result<CalculatorOutcome>,
}

fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days))
        .unwrap_or(NaiveDate::MIN)
}

/// Runs calculators against a price source and factor store.
#[derive(Debug)]
pub struct FactorEngine<'a, S> {
    store: &'a S,
    config: FactorConfig,
}

impl<'a, S> FactorEngine<'a, S>
where
    S: PriceSource + FactorStore,
{
    /// Create an engine over `store`.
    pub const fn new(store: &'a S, config: FactorConfig) -> Self {
        Self { store, config }
    }

    /// Engine configuration.
    pub const fn config(&self) -> &FactorConfig {
        &self.config
    }

    /// First date loaded for `mode`.
    pub fn window_start(&self, mode: RunMode, as_of: NaiveDate) -> Option<NaiveDate> {
        match mode {
            RunMode::Init => self.config.init_days.map(|d| days_before(as_of, d)),
            RunMode::Daily => Some(days_before(as_of, self.config.incremental_window_days)),
        }
    }

    /// Run one calculator for the window ending at `as_of`.
    ///
    /// An empty window is a no-op. A window left empty by the calculator's
    /// filter is a validation error. Persistence failures surface as
    /// [`FactorError::Calculation`] with the store left unchanged.
    pub fn run(
        &self,
        calculator: &dyn FactorCalculator,
        mode: RunMode,
        as_of: NaiveDate,
    ) -> Result<CalculatorOutcome> {
        let started = Instant::now();
        let name = calculator.name();
        let periods = calculator.periods();
        let window_start = self.window_start(mode, as_of);

        let mut outcome = CalculatorOutcome {
            calculator: name,
            class: calculator.target(),
            mode,
            window_start,
            as_of,
            rows_loaded: 0,
            entities: 0,
            rows_written: 0,
            dates_written: 0,
            elapsed: Duration::ZERO,
        };

        if periods.is_empty() {
            return Err(FactorError::Validation(format!(
                "calculator '{}' has no periods",
                name
            )));
        }

        let frame = self
            .store
            .load_closes(calculator.source(), window_start, as_of)?;
        outcome.rows_loaded = frame.height();

        if frame.height() == 0 {
            info!(calculator = name, %mode, %as_of, "no prices in window, nothing to do");
            outcome.elapsed = started.elapsed();
            return Ok(outcome);
        }

        let filtered = calculator.filter(frame)?;
        if filtered.height() < outcome.rows_loaded {
            info!(
                calculator = name,
                kept = filtered.height(),
                loaded = outcome.rows_loaded,
                "filtered price rows"
            );
        }
        if filtered.height() == 0 {
            return Err(FactorError::Validation(format!(
                "calculator '{}' filtered out every price row",
                name
            )));
        }

        let panel = PricePanel::from_frame(&filtered)?;
        outcome.entities = panel.entity_count();
        info!(
            calculator = name,
            dates = panel.date_count(),
            entities = outcome.entities,
            "built price panel"
        );

        let mut rows = compute_rows(&panel, periods, &self.config)?;

        let written = match mode {
            RunMode::Init => self.store.replace_factor_table(outcome.class, periods, &rows),
            RunMode::Daily => {
                let cutoff = days_before(as_of, self.config.save_recent_days);
                rows.retain(|r| r.date > cutoff);
                if rows.is_empty() {
                    warn!(calculator = name, %cutoff, "no factor rows after cutoff");
                }
                self.store.replace_factor_dates(outcome.class, periods, &rows)
            }
        }
        .map_err(|e| FactorError::Calculation(format!("saving {} factors: {}", name, e)))?;

        let mut dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        dates.dedup();
        outcome.rows_written = written;
        outcome.dates_written = dates.len();
        outcome.elapsed = started.elapsed();

        info!(
            calculator = name,
            %mode,
            rows = outcome.rows_written,
            dates = outcome.dates_written,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "factor run complete"
        );
        Ok(outcome)
    }

    /// Run every calculator, collecting each result without stopping at the
    /// first failure. `progress` sees each report as soon as it is ready.
    pub fn run_all<F>(
        &self,
        calculators: &[Box<dyn FactorCalculator>],
        mode: RunMode,
        as_of: NaiveDate,
        mut progress: F,
    ) -> Vec<CalculatorReport>
    where
        F: FnMut(&CalculatorReport),
    {
        let mut reports = Vec::with_capacity(calculators.len());
        for calculator in calculators {
            let result = self.run(calculator.as_ref(), mode, as_of);
            if let Err(e) = &result {
                error!(calculator = calculator.name(), error = %e, "factor run failed");
            }
            let report = CalculatorReport {
                calculator: calculator.name(),
                result,
            };
            progress(&report);
            reports.push(report);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{SectorCalculator, StockCalculator};
    use approx::assert_relative_eq;
    use rps_data::{PriceBar, SqliteStore};

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(offset))
            .unwrap()
    }

    fn config(periods: Vec<usize>) -> FactorConfig {
        FactorConfig {
            periods,
            init_days: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = FactorConfig::default();
        assert_eq!(config.periods, vec![5, 10, 20, 50, 120, 250]);
        assert_eq!(config.incremental_window_days, 400);
        assert_eq!(config.save_recent_days, 5);
        assert_eq!(config.init_days, Some(365));
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("DAILY".parse::<RunMode>().unwrap(), RunMode::Daily);
        assert!("weekly".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_three_entity_ranking() {
        let store = SqliteStore::in_memory().unwrap();
        let mut bars = Vec::new();
        for t in 0..=20 {
            let frac = t as f64 / 20.0;
            bars.push(PriceBar::flat("A", day(t), 100.0 * (1.0 + 0.10 * frac)));
            bars.push(PriceBar::flat("B", day(t), 100.0 * (1.0 + 0.05 * frac)));
            bars.push(PriceBar::flat("C", day(t), 100.0 * (1.0 - 0.02 * frac)));
        }
        store.put_bars(AssetClass::Stock, &bars).unwrap();

        let cfg = config(vec![20]);
        let engine = FactorEngine::new(&store, cfg.clone());
        engine
            .run(&StockCalculator::new(&cfg), RunMode::Init, day(20))
            .unwrap();

        let rows = store.factor_snapshot(AssetClass::Stock, day(20), &[20]).unwrap();
        let rank = |id: &str| rows.iter().find(|r| r.entity_id == id).and_then(|r| r.rank(20));
        assert_relative_eq!(rank("A").unwrap(), 100.0);
        assert_relative_eq!(rank("B").unwrap(), 66.67);
        assert_relative_eq!(rank("C").unwrap(), 33.33);
        let change_a = rows[0].change(20).unwrap();
        assert_relative_eq!(change_a, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_window_is_noop() {
        let store = SqliteStore::in_memory().unwrap();
        let cfg = config(vec![5]);
        let engine = FactorEngine::new(&store, cfg.clone());
        let outcome = engine
            .run(&StockCalculator::new(&cfg), RunMode::Daily, day(10))
            .unwrap();
        assert!(outcome.is_noop());
        assert_eq!(outcome.rows_written, 0);
        assert_eq!(store.latest_factor_date(AssetClass::Stock).unwrap(), None);
    }

    #[test]
    fn test_fully_filtered_window_is_invalid() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_bars(AssetClass::Sector, &[PriceBar::flat("昨日涨停", day(0), 1.0)])
            .unwrap();
        let cfg = config(vec![5]);
        let engine = FactorEngine::new(&store, cfg.clone());
        let result = engine.run(&SectorCalculator::new(&cfg), RunMode::Init, day(0));
        assert!(matches!(result, Err(FactorError::Validation(_))));
    }

    #[test]
    fn test_short_history_rows_are_null_not_zero() {
        let store = SqliteStore::in_memory().unwrap();
        let bars: Vec<_> = (0..8)
            .map(|t| PriceBar::flat("A", day(t), 10.0 + t as f64))
            .collect();
        store.put_bars(AssetClass::Stock, &bars).unwrap();

        let cfg = config(vec![5, 20]);
        let engine = FactorEngine::new(&store, cfg.clone());
        engine
            .run(&StockCalculator::new(&cfg), RunMode::Init, day(7))
            .unwrap();

        let rows = store.factor_snapshot(AssetClass::Stock, day(7), &[5, 20]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].rank(5).is_some());
        assert_eq!(rows[0].rank(20), None);
        assert_eq!(rows[0].change(20), None);

        // Dates before the shortest period has history produce no rows at all.
        assert!(
            store
                .factor_snapshot(AssetClass::Stock, day(2), &[5])
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_daily_only_rewrites_recent_dates() {
        let store = SqliteStore::in_memory().unwrap();
        let mut bars = Vec::new();
        for t in 0..30 {
            bars.push(PriceBar::flat("A", day(t), 10.0 + t as f64));
            bars.push(PriceBar::flat("B", day(t), 20.0 - 0.1 * t as f64));
        }
        store.put_bars(AssetClass::Stock, &bars).unwrap();

        let cfg = config(vec![5]);
        let engine = FactorEngine::new(&store, cfg.clone());
        let outcome = engine
            .run(&StockCalculator::new(&cfg), RunMode::Daily, day(29))
            .unwrap();

        // save_recent_days = 5 keeps dates strictly after day 24.
        assert_eq!(outcome.dates_written, 5);
        assert_eq!(outcome.rows_written, 10);
        assert_eq!(store.factor_row_count(AssetClass::Stock).unwrap(), 10);
    }

    #[test]
    fn test_run_all_continues_after_failure() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_bars(AssetClass::Sector, &[PriceBar::flat("昨日涨停", day(0), 1.0)])
            .unwrap();
        let bars: Vec<_> = (0..8)
            .map(|t| PriceBar::flat("A", day(t), 10.0 + t as f64))
            .collect();
        store.put_bars(AssetClass::Stock, &bars).unwrap();

        let cfg = config(vec![5]);
        let engine = FactorEngine::new(&store, cfg.clone());
        let calculators: Vec<Box<dyn FactorCalculator>> = vec![
            Box::new(SectorCalculator::new(&cfg)),
            Box::new(StockCalculator::new(&cfg)),
        ];
        let mut seen = Vec::new();
        let reports = engine.run_all(&calculators, RunMode::Init, day(7), |r| {
            seen.push((r.calculator, r.result.is_ok()))
        });

        assert_eq!(seen, vec![("sector", false), ("stock", true)]);
        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].result, Err(FactorError::Validation(_))));
        assert_eq!(reports[1].result.as_ref().unwrap().rows_written, 3);
    }
}

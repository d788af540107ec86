//! Run entry points
//!
//! [`Pipeline`] binds a store to an [`EngineConfig`] and exposes one method
//! per run: factor calculation, pool refresh, strategy evaluation and the
//! daily pipeline chaining all three.

use crate::config::EngineConfig;
use crate::pool::{PoolError, PoolMaintainer, PoolRefreshOutcome};
use chrono::NaiveDate;
use rps_data::{FactorStore, FundamentalSource, PoolStore, PriceSource, SignalStore};
use rps_factors::{CalculatorReport, FactorEngine, FactorError, RunMode, build_calculators};
use rps_signals::{SignalError, SignalEvaluator, SignalRunOutcome, Strategy};
use std::fmt;
use thiserror::Error;
use tracing::info;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Factor configuration or calculator selection failed
    #[error("Factor error: {0}")]
    Factor(#[from] FactorError),

    /// Pool refresh failed
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Strategy evaluation failed
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    /// One or more calculators failed
    #[error("Factor run failed for: {}", .0.join(", "))]
    CalculatorsFailed(Vec<String>),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result of a factor run over several calculators.
#[derive(Debug)]
pub struct FactorRunReport {
    /// Run mode
    pub mode: RunMode,
    /// Last date loaded
    pub as_of: NaiveDate,
    /// One entry per calculator, in run order
    pub calculators: Vec<CalculatorReport>,
}

impl FactorRunReport {
    /// Names of the calculators that failed.
    pub fn failed(&self) -> Vec<&'static str> {
        self.calculators
            .iter()
            .filter(|c| c.result.is_err())
            .map(|c| c.calculator)
            .collect()
    }

    /// Whether every calculator succeeded.
    pub fn is_success(&self) -> bool {
        self.calculators.iter().all(|c| c.result.is_ok())
    }

    /// Factor rows written across calculators.
    pub fn rows_written(&self) -> usize {
        self.calculators
            .iter()
            .filter_map(|c| c.result.as_ref().ok())
            .map(|o| o.rows_written)
            .sum()
    }
}

impl fmt::Display for FactorRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Factor run ({}) as of {}", self.mode, self.as_of)?;
        for report in &self.calculators {
            match &report.result {
                Ok(o) if o.is_noop() => {
                    writeln!(f, "  {:<8} no prices in window", report.calculator)?;
                }
                Ok(o) => writeln!(
                    f,
                    "  {:<8} {:>6} entities {:>8} rows {:>4} dates  {:.2?}",
                    report.calculator, o.entities, o.rows_written, o.dates_written, o.elapsed
                )?,
                Err(e) => writeln!(f, "  {:<8} FAILED: {}", report.calculator, e)?,
            }
        }
        Ok(())
    }
}

fn write_signal_outcome(f: &mut fmt::Formatter<'_>, outcome: &SignalRunOutcome) -> fmt::Result {
    writeln!(
        f,
        "  {:<17} {} candidates, {} evaluated, {} skipped, {} failed, {} signals",
        outcome.strategy.name(),
        outcome.candidates,
        outcome.evaluated,
        outcome.skipped,
        outcome.failed,
        outcome.signals.len()
    )
}

/// Summary of a full pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Daily factor run
    pub factor: FactorRunReport,
    /// Pool refresh
    pub pool: PoolRefreshOutcome,
    /// One outcome per strategy
    pub signals: Vec<SignalRunOutcome>,
}

impl PipelineReport {
    /// Signals fired across strategies.
    pub fn signal_count(&self) -> usize {
        self.signals.iter().map(|s| s.signals.len()).sum()
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factor)?;
        write!(f, "{}", self.pool)?;
        if let Some(first) = self.signals.first() {
            writeln!(f, "Signals for {}", first.date)?;
        }
        for outcome in &self.signals {
            write_signal_outcome(f, outcome)?;
        }
        Ok(())
    }
}

/// Run entry points over one store.
#[derive(Debug)]
pub struct Pipeline<'a, S> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S> Pipeline<'a, S>
where
    S: PriceSource + FactorStore + FundamentalSource + PoolStore + SignalStore,
{
    /// Create a pipeline over `store`.
    pub const fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Run the named calculators (all when empty). A failing calculator does
    /// not stop the others.
    pub fn run_factor(
        &self,
        mode: RunMode,
        calculators: &[String],
        as_of: NaiveDate,
    ) -> Result<FactorRunReport> {
        self.run_factor_with(mode, calculators, as_of, |_| {})
    }

    /// [`run_factor`](Self::run_factor), calling `progress` after each calculator.
    pub fn run_factor_with<F>(
        &self,
        mode: RunMode,
        calculators: &[String],
        as_of: NaiveDate,
        progress: F,
    ) -> Result<FactorRunReport>
    where
        F: FnMut(&CalculatorReport),
    {
        let selected = build_calculators(calculators, &self.config.factor)?;
        let engine = FactorEngine::new(self.store, self.config.factor.clone());
        let calculators = engine.run_all(&selected, mode, as_of, progress);

        Ok(FactorRunReport {
            mode,
            as_of,
            calculators,
        })
    }

    /// Re-derive the configured pool.
    pub fn run_pool_refresh(&self, as_of: NaiveDate) -> Result<PoolRefreshOutcome> {
        let maintainer = PoolMaintainer::new(self.store, self.config.pool.clone());
        Ok(maintainer.refresh(as_of)?)
    }

    /// Run `strategy` for `date` (default: the latest stock price date).
    pub fn run_signals(
        &self,
        strategy: Strategy,
        date: Option<NaiveDate>,
    ) -> Result<SignalRunOutcome> {
        let evaluator = SignalEvaluator::new(self.store, self.config.signal.clone());
        Ok(evaluator.run(strategy, date)?)
    }

    /// Daily factor run over every calculator, pool refresh, then every
    /// strategy for the latest stock price date. Stops at the first failure.
    pub fn run_pipeline(&self, as_of: NaiveDate) -> Result<PipelineReport> {
        info!(%as_of, "pipeline started");

        let factor = self.run_factor(RunMode::Daily, &[], as_of)?;
        if !factor.is_success() {
            let failed = factor.failed().into_iter().map(str::to_string).collect();
            return Err(PipelineError::CalculatorsFailed(failed));
        }

        let pool = self.run_pool_refresh(as_of)?;

        let signals = Strategy::ALL
            .iter()
            .map(|strategy| self.run_signals(*strategy, None))
            .collect::<Result<Vec<_>>>()?;

        let report = PipelineReport {
            factor,
            pool,
            signals,
        };
        info!(
            %as_of,
            factor_rows = report.factor.rows_written(),
            pool_members = report.pool.members,
            signals = report.signal_count(),
            "pipeline complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rps_data::SqliteStore;

    #[test]
    fn test_unknown_calculator_is_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();
        let err = Pipeline::new(&store, &config)
            .run_factor(RunMode::Daily, &["bonds".to_string()], NaiveDate::MIN)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Factor(FactorError::Validation(_))));
    }

    #[test]
    fn test_empty_store_factor_run_is_noop() {
        let store = SqliteStore::in_memory().unwrap();
        let config = EngineConfig::default();
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        let mut seen = Vec::new();
        let report = Pipeline::new(&store, &config)
            .run_factor_with(RunMode::Init, &[], as_of, |r| seen.push(r.calculator))
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.rows_written(), 0);
        assert_eq!(seen, vec!["stock", "sector", "etf"]);
        assert!(report.to_string().contains("no prices in window"));
    }

    #[test]
    fn test_calculators_failed_message() {
        let err = PipelineError::CalculatorsFailed(vec!["sector".to_string(), "etf".to_string()]);
        assert_eq!(err.to_string(), "Factor run failed for: sector, etf");
    }
}

//! Calculator contract and registry.
//!
//! A calculator names the asset class it reads and writes, the periods it
//! computes and the rows it drops before ranking. Everything else is shared by
//! [`crate::FactorEngine`].

use crate::engine::FactorConfig;
use crate::error::{FactorError, Result};
use crate::universe::UniverseFilter;
use polars::prelude::DataFrame;
use rps_data::AssetClass;
use std::fmt;

/// One relative strength calculation over one asset class.
pub trait FactorCalculator: fmt::Debug {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Asset class whose prices are ranked.
    fn source(&self) -> AssetClass;

    /// Asset class whose factor table receives the rows.
    fn target(&self) -> AssetClass {
        self.source()
    }

    /// Lookback periods, ascending.
    fn periods(&self) -> &[usize];

    /// Drop rows that must not take part in the ranking.
    fn filter(&self, frame: DataFrame) -> Result<DataFrame> {
        Ok(frame)
    }
}

/// Stock calculator (`prices_stock` to `factor_stock`).
#[derive(Debug, Clone)]
pub struct StockCalculator {
    periods: Vec<usize>,
}

impl StockCalculator {
    /// Create a calculator for the configured periods.
    pub fn new(config: &FactorConfig) -> Self {
        Self {
            periods: config.sorted_periods(),
        }
    }
}

impl FactorCalculator for StockCalculator {
    fn name(&self) -> &'static str {
        "stock"
    }

    fn source(&self) -> AssetClass {
        AssetClass::Stock
    }

    fn periods(&self) -> &[usize] {
        &self.periods
    }
}

/// Sector index calculator with the blacklist applied.
#[derive(Debug, Clone)]
pub struct SectorCalculator {
    periods: Vec<usize>,
    filter: UniverseFilter,
}

impl SectorCalculator {
    /// Create a calculator for the configured periods and blacklist.
    pub fn new(config: &FactorConfig) -> Self {
        Self {
            periods: config.sorted_periods(),
            filter: UniverseFilter::new(config.sector_blacklist.iter().cloned()),
        }
    }
}

impl FactorCalculator for SectorCalculator {
    fn name(&self) -> &'static str {
        "sector"
    }

    fn source(&self) -> AssetClass {
        AssetClass::Sector
    }

    fn periods(&self) -> &[usize] {
        &self.periods
    }

    fn filter(&self, frame: DataFrame) -> Result<DataFrame> {
        self.filter.apply(frame)
    }
}

/// ETF calculator (`prices_etf` to `factor_etf`).
#[derive(Debug, Clone)]
pub struct EtfCalculator {
    periods: Vec<usize>,
}

impl EtfCalculator {
    /// Create a calculator for the configured periods.
    pub fn new(config: &FactorConfig) -> Self {
        Self {
            periods: config.sorted_periods(),
        }
    }
}

impl FactorCalculator for EtfCalculator {
    fn name(&self) -> &'static str {
        "etf"
    }

    fn source(&self) -> AssetClass {
        AssetClass::Etf
    }

    fn periods(&self) -> &[usize] {
        &self.periods
    }
}

/// Calculator metadata
#[derive(Debug, Clone)]
pub struct CalculatorInfo {
    /// Calculator name (unique identifier)
    pub name: &'static str,
    /// Asset class ranked by the calculator
    pub class: AssetClass,
    /// Brief description
    pub description: &'static str,
}

/// Get all available calculator info
pub fn available_calculators() -> Vec<CalculatorInfo> {
    vec![
        CalculatorInfo {
            name: "stock",
            class: AssetClass::Stock,
            description: "Individual stocks ranked against all listed stocks",
        },
        CalculatorInfo {
            name: "sector",
            class: AssetClass::Sector,
            description: "Sector and concept indices, blacklisted boards removed",
        },
        CalculatorInfo {
            name: "etf",
            class: AssetClass::Etf,
            description: "Exchange traded funds ranked against each other",
        },
    ]
}

/// Build a calculator by name.
pub fn calculator_for(name: &str, config: &FactorConfig) -> Result<Box<dyn FactorCalculator>> {
    match name.to_ascii_lowercase().as_str() {
        "stock" => Ok(Box::new(StockCalculator::new(config))),
        "sector" => Ok(Box::new(SectorCalculator::new(config))),
        "etf" => Ok(Box::new(EtfCalculator::new(config))),
        other => Err(FactorError::Validation(format!(
            "Unknown calculator '{}' (available: {})",
            other,
            available_calculators()
                .iter()
                .map(|c| c.name)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Build calculators by name, or all of them when `names` is empty.
pub fn build_calculators(
    names: &[String],
    config: &FactorConfig,
) -> Result<Vec<Box<dyn FactorCalculator>>> {
    if names.is_empty() {
        return available_calculators()
            .iter()
            .map(|info| calculator_for(info.name, config))
            .collect();
    }
    names.iter().map(|n| calculator_for(n, config)).collect()
}

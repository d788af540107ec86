//! Records exchanged between the price source, the engine and the store.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date format used for every persisted date column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a stored date.
///
/// Values written with a time suffix (`2024-01-02 00:00:00`) are accepted and
/// truncated to the calendar day.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, DATE_FORMAT)
        .map_err(|e| DataError::Parse(format!("Invalid date '{}': {}", value, e)))
}

/// Instrument family. Each class has its own price table and factor table and
/// is ranked only against members of the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// Individual stocks
    Stock,
    /// Sector and concept indices
    Sector,
    /// Exchange traded funds
    Etf,
}

impl AssetClass {
    /// All asset classes in calculation order.
    pub const ALL: [Self; 3] = [Self::Stock, Self::Sector, Self::Etf];

    /// Convert to database string representation.
    pub const fn to_db_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Sector => "sector",
            Self::Etf => "etf",
        }
    }

    /// Table holding the raw daily bars of this class.
    pub const fn price_table(&self) -> &'static str {
        match self {
            Self::Stock => "prices_stock",
            Self::Sector => "prices_sector",
            Self::Etf => "prices_etf",
        }
    }

    /// Table holding the derived change/rank rows of this class.
    pub const fn factor_table(&self) -> &'static str {
        match self {
            Self::Stock => "factor_stock",
            Self::Sector => "factor_sector",
            Self::Etf => "factor_etf",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

impl FromStr for AssetClass {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stock" => Ok(Self::Stock),
            "sector" => Ok(Self::Sector),
            "etf" => Ok(Self::Etf),
            other => Err(DataError::UnknownAssetClass(other.to_string())),
        }
    }
}

/// One trading day of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Instrument identifier (stock code, sector name, fund code)
    pub entity_id: String,
    /// Trading day
    pub date: NaiveDate,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Traded volume
    pub volume: f64,
    /// Turnover rate in percent, when the source reports one
    pub turnover_rate: Option<f64>,
}

impl PriceBar {
    /// Bar whose open, high, low and close all equal `close`.
    pub fn flat(entity_id: impl Into<String>, date: NaiveDate, close: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
            turnover_rate: None,
        }
    }
}

/// Change and percentile rank of one lookback period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodValue {
    /// Lookback period in observations
    pub period: usize,
    /// Fractional return over the period, `None` with insufficient history
    pub change: Option<f64>,
    /// Cross-sectional percentile rank in `[0, 100]`, `None` with insufficient history
    pub rank_pct: Option<f64>,
}

/// Factor values of one entity on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRow {
    /// Instrument identifier
    pub entity_id: String,
    /// Trading day
    pub date: NaiveDate,
    /// One value per configured period, in period order
    pub values: Vec<PeriodValue>,
}

impl FactorRow {
    /// Value for `period`, if that period was computed.
    pub fn value(&self, period: usize) -> Option<&PeriodValue> {
        self.values.iter().find(|v| v.period == period)
    }

    /// Percentile rank for `period`.
    pub fn rank(&self, period: usize) -> Option<f64> {
        self.value(period).and_then(|v| v.rank_pct)
    }

    /// Fractional change for `period`.
    pub fn change(&self, period: usize) -> Option<f64> {
        self.value(period).and_then(|v| v.change)
    }
}

/// Listed instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Instrument identifier
    pub entity_id: String,
    /// Display name
    pub name: String,
}

/// Quarterly fund holding report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundHolding {
    /// Instrument identifier
    pub entity_id: String,
    /// Quarter end of the report
    pub report_date: NaiveDate,
    /// Shares held by funds in aggregate
    pub share_count: f64,
}

/// Market valuation snapshot used to estimate shares outstanding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    /// Instrument identifier
    pub entity_id: String,
    /// Snapshot day
    pub date: NaiveDate,
    /// Total market value in currency units
    pub total_market_value: f64,
    /// Share price in currency units
    pub price: f64,
}

impl Valuation {
    /// Shares outstanding estimated as market value over price.
    pub fn shares_outstanding(&self) -> Option<f64> {
        (self.price > 0.0 && self.total_market_value > 0.0)
            .then(|| self.total_market_value / self.price)
    }
}

/// Cross-border holding value on a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignHolding {
    /// Instrument identifier
    pub entity_id: String,
    /// Holding day
    pub date: NaiveDate,
    /// Market value of the holding in currency units
    pub hold_value: f64,
}

/// Stock to sector mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorMember {
    /// Sector name, as used in the sector price table
    pub sector_name: String,
    /// Member stock identifier
    pub entity_id: String,
}

/// Membership of an entity in a named pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMember {
    /// Pool name
    pub pool_name: String,
    /// Instrument identifier
    pub entity_id: String,
    /// Human readable qualification reason
    pub reason: String,
    /// Day the pool was derived
    pub as_of_date: NaiveDate,
    /// Whether the member is eligible for signal evaluation
    pub active: bool,
}

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    /// Candidate for entry
    Buy,
    /// Candidate for exit
    Sell,
}

impl SignalType {
    /// Convert to database string representation.
    pub const fn to_db_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(DataError::Parse(format!("Invalid signal type: {}", s))),
        }
    }
}

/// One fired signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Strategy that produced the signal
    pub strategy_name: String,
    /// Instrument identifier
    pub entity_id: String,
    /// Evaluation day
    pub date: NaiveDate,
    /// Signal direction
    pub signal_type: SignalType,
    /// Trigger reason and factor snapshot
    pub meta: serde_json::Value,
}

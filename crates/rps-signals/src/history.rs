//! One instrument's recent bars as aligned series.

use chrono::NaiveDate;
use rps_data::PriceBar;
use rps_factors::indicators::defined;

/// Chronologically ordered price series of a single entity.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    dates: Vec<NaiveDate>,
    close: Vec<Option<f64>>,
    high: Vec<f64>,
    low: Vec<f64>,
    turnover: Vec<f64>,
}

impl PriceHistory {
    /// Build from bars ordered oldest first. Missing turnover counts as 0.
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Self {
            dates: bars.iter().map(|b| b.date).collect(),
            close: defined(&closes),
            high: bars.iter().map(|b| b.high).collect(),
            low: bars.iter().map(|b| b.low).collect(),
            turnover: bars.iter().map(|b| b.turnover_rate.unwrap_or(0.0)).collect(),
        }
    }

    /// Number of bars.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether there are no bars.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Date of the most recent bar.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Closing prices.
    pub fn close(&self) -> &[Option<f64>] {
        &self.close
    }

    /// Highs, used for drawdown.
    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Lows, used for drawdown.
    pub fn low(&self) -> &[f64] {
        &self.low
    }

    /// Highs lifted into the optional domain.
    pub fn high_series(&self) -> Vec<Option<f64>> {
        defined(&self.high)
    }

    /// Most recent close.
    pub fn last_close(&self) -> Option<f64> {
        self.close.last().copied().flatten()
    }

    /// Most recent turnover rate in percent (0 when unknown).
    pub fn last_turnover(&self) -> f64 {
        self.turnover.last().copied().unwrap_or(0.0)
    }
}

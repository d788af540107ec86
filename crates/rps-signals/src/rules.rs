//! Rule trees
//!
//! Two independent rules over one entity's history and its latest ranks:
//!
//! - MRGC (primary): trend intact, turnover below 25% and one of four
//!   strength triggers.
//! - SXHCG (secondary): combined 120/250 strength above 185 with closes
//!   holding above their moving averages and the averages rising.
//!
//! The signal fires when either rule holds. Thresholds such as `94.99` are
//! deliberate cutoffs and must not be rounded.

use crate::history::PriceHistory;
use rps_data::FactorRow;
use rps_factors::indicators::{
    count, drawdown_since_peak, eq, every, ge, gt, hhv, last, ma, ratio, shift,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ranks consulted by the rules. Missing ranks are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RankSnapshot {
    /// 50-period rank
    pub rank_50: f64,
    /// 120-period rank
    pub rank_120: f64,
    /// 250-period rank
    pub rank_250: f64,
}

impl RankSnapshot {
    /// Periods read from the factor table.
    pub const PERIODS: [usize; 3] = [50, 120, 250];

    /// Extract from a factor row, defaulting absent values to 0.
    pub fn from_row(row: Option<&FactorRow>) -> Self {
        let rank = |p| row.and_then(|r| r.rank(p)).unwrap_or(0.0);
        Self {
            rank_50: rank(50),
            rank_120: rank(120),
            rank_250: rank(250),
        }
    }
}

/// Trigger branch of the primary rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendBranch {
    /// New 250-day closing high within 5 bars with top ranks
    NewHigh,
    /// Within 15% of the 250-day high with ranks above 96.99
    NearHigh,
    /// Within 30% of the 250-day high with ranks above 97.99
    HoldingHigh,
    /// Shallow pullback close to the closing high with ranks above 94.99
    ShallowPullback,
}

impl fmt::Display for TrendBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NewHigh => "new_high",
            Self::NearHigh => "near_high",
            Self::HoldingHigh => "holding_high",
            Self::ShallowPullback => "shallow_pullback",
        };
        f.write_str(label)
    }
}

/// Result of evaluating both rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleVerdict {
    /// Primary (MRGC) rule holds
    pub primary: bool,
    /// Secondary (SXHCG) rule holds
    pub secondary: bool,
    /// Primary branches that fired, empty unless `primary`
    pub branches: Vec<TrendBranch>,
}

impl RuleVerdict {
    /// Whether a signal fires.
    pub const fn fired(&self) -> bool {
        self.primary || self.secondary
    }

    /// Names of the rules that held.
    pub fn triggered(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.primary {
            names.push("mrgc");
        }
        if self.secondary {
            names.push("sxhcg");
        }
        names
    }

    /// Human readable reason.
    pub fn reason(&self) -> String {
        match (self.primary, self.secondary) {
            (true, true) => "MRGC+SXHCG triggered".to_string(),
            (true, false) => "MRGC triggered".to_string(),
            (false, true) => "SXHCG triggered".to_string(),
            (false, false) => "not triggered".to_string(),
        }
    }
}

fn last_flag(flags: &[bool]) -> bool {
    flags.last().copied().unwrap_or(false)
}

fn at_least(counts: &[Option<usize>], n: usize) -> bool {
    last(counts).is_some_and(|c| c >= n)
}

/// Values shared by both rules.
struct Common {
    close: Option<f64>,
    turnover: f64,
    drawdown_120: f64,
    /// close / 250-day highest close
    close_to_high_close: Option<f64>,
}

impl Common {
    fn new(history: &PriceHistory) -> Self {
        let close = history.last_close();
        Self {
            close,
            turnover: history.last_turnover(),
            drawdown_120: drawdown_since_peak(history.high(), history.low(), 120),
            close_to_high_close: ratio(close, last(&hhv(history.close(), 250))),
        }
    }

    fn trend_intact(&self) -> bool {
        self.drawdown_120 <= 0.5
    }

    fn close_ratio_above(&self, threshold: f64) -> bool {
        self.close_to_high_close.is_some_and(|r| r > threshold)
    }
}

fn primary(history: &PriceHistory, ranks: &RankSnapshot, common: &Common) -> Vec<TrendBranch> {
    let gate = common.turnover < 25.0 && common.trend_intact() && common.close_ratio_above(0.7);
    if !gate {
        return Vec::new();
    }

    let r50 = ranks.rank_50;
    let r120 = ranks.rank_120;
    let r250 = ranks.rank_250;
    let close = history.close();
    let mut branches = Vec::new();

    let new_high = eq(close, &hhv(close, 250));
    let recent_new_high = at_least(&count(&new_high, 5), 1);
    if recent_new_high && ((r120 > 95.99 || r250 > 95.99) || (r120 > 94.99 && r50 > 94.99)) {
        branches.push(TrendBranch::NewHigh);
    }

    let close_to_high = ratio(common.close, last(&hhv(&history.high_series(), 250)));
    if close_to_high.is_some_and(|r| r >= 0.85) && (r120 > 96.99 || r250 > 96.99) {
        branches.push(TrendBranch::NearHigh);
    }
    if close_to_high.is_some_and(|r| r >= 0.70) && (r120 > 97.99 || r250 > 97.99) {
        branches.push(TrendBranch::HoldingHigh);
    }

    let shallow = common.drawdown_120 <= 0.35 && common.close_ratio_above(0.8);
    if shallow && (r120 > 94.99 || r250 > 94.99) {
        branches.push(TrendBranch::ShallowPullback);
    }

    branches
}

fn secondary(history: &PriceHistory, ranks: &RankSnapshot, common: &Common) -> bool {
    if ranks.rank_120 + ranks.rank_250 <= 185.0 {
        return false;
    }
    if common.turnover >= 15.0 || !common.trend_intact() {
        return false;
    }

    let close = history.close();
    let ma10 = ma(close, 10);
    let ma20 = ma(close, 20);
    let ma200 = ma(close, 200);
    let ma250 = ma(close, 250);

    let above_ma10 = gt(close, &ma10);
    let above_ma20 = gt(close, &ma20);

    let holding_averages = last_flag(&above_ma20)
        && at_least(&count(&gt(close, &ma250), 30), 25)
        && at_least(&count(&gt(close, &ma200), 30), 25)
        && (at_least(&count(&above_ma20, 10), 9)
            || (at_least(&count(&above_ma10, 4), 3) && at_least(&count(&above_ma20, 4), 3)));
    if !holding_averages {
        return false;
    }

    let drawdown_20 = drawdown_since_peak(history.high(), history.low(), 20);
    if !(drawdown_20 <= 0.25 && common.close_ratio_above(0.8)) {
        return false;
    }

    let ma20_rising = ge(&ma20, &shift(&ma20, 1));
    let ma10_over_ma20 = ge(&ma10, &ma20);
    let steady = last_flag(&every(&ma20_rising, 5)) && last_flag(&every(&ma10_over_ma20, 5));
    let turning = last_flag(&ge(&ma10, &shift(&ma10, 1)))
        && last_flag(&ma20_rising)
        && last_flag(&ma10_over_ma20);

    steady || turning
}

/// Evaluate both rules on the last bar of `history`.
pub fn evaluate(history: &PriceHistory, ranks: &RankSnapshot) -> RuleVerdict {
    let common = Common::new(history);
    let branches = primary(history, ranks, &common);
    RuleVerdict {
        primary: !branches.is_empty(),
        secondary: secondary(history, ranks, &common),
        branches,
    }
}

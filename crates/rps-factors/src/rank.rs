//! Period change and cross-sectional percentile rank.
//!
//! Changes are windowed per entity (`over(entity_id)`), ranks are taken per
//! date (`over(date)`) on a [`PricePanel`](crate::PricePanel) frame.

use polars::prelude::*;

/// Column holding the `period` change.
pub fn change_column(period: usize) -> String {
    format!("change_{}", period)
}

/// Column holding the `period` percentile rank.
pub fn rank_column(period: usize) -> String {
    format!("rank_{}", period)
}

/// `p`-observation return of each entity: `close[t] / close[t - p] - 1`.
///
/// Null for the first `p` rows of an entity, wherever either close is missing,
/// and when the earlier close is 0.
pub fn change_expr(period: usize) -> Expr {
    let prev = col("close")
        .shift(lit(period as i64))
        .over([col("entity_id")]);
    when(prev.clone().neq(lit(0.0)))
        .then(col("close") / prev - lit(1.0))
        .otherwise(lit(NULL))
        .alias(change_column(period))
}

/// Percentile rank of the `period` change among all entities of the same
/// date, scaled to `[0, 100]`.
///
/// Ties take the lowest rank of their group: with `n` defined changes, a change
/// whose rank is `r` (1-based, smallest first) maps to `r / n * 100`. Null
/// changes are neither ranked nor counted.
pub fn rank_expr(period: usize) -> Expr {
    let change = col(change_column(period));
    let position = change
        .clone()
        .rank(
            RankOptions {
                method: RankMethod::Min,
                descending: false,
            },
            None,
        )
        .over([col("date")])
        .cast(DataType::Float64);
    let defined = change
        .clone()
        .count()
        .over([col("date")])
        .cast(DataType::Float64);
    when(change.is_not_null())
        .then(position / defined * lit(100.0))
        .otherwise(lit(NULL))
        .alias(rank_column(period))
}

/// Change and rank columns for every period, keeping `(entity, date)` rows
/// with at least one defined change, sorted by date then entity.
///
/// `panel` must be sorted by entity then date.
pub fn factor_frame(panel: LazyFrame, periods: &[usize]) -> LazyFrame {
    let changes: Vec<Expr> = periods.iter().map(|&p| change_expr(p)).collect();
    let ranks: Vec<Expr> = periods.iter().map(|&p| rank_expr(p)).collect();
    let any_defined = periods
        .iter()
        .map(|&p| col(change_column(p)).is_not_null())
        .reduce(|a, b| a.or(b))
        .unwrap_or_else(|| lit(false));

    panel
        .with_columns(changes)
        .with_columns(ranks)
        .filter(any_defined)
        .sort(["date", "entity_id"], SortMultipleOptions::default())
}

/// Round half away from zero to `decimals` places. Non-finite values become `None`.
pub fn round_to(value: f64, decimals: u32) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let scale = 10f64.powi(decimals as i32);
    Some((value * scale).round() / scale)
}

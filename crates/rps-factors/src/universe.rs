//! Universe Filter
//!
//! Drops administrative or synthetic instruments from a long price frame before
//! the price panel is built, so they never enter anyone else's percentile rank.

use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Sector names that are not real sectors (limit-up boards, ST lists and so on).
pub const DEFAULT_SECTOR_BLACKLIST: &[&str] = &[
    "昨日", "连板", "涨停", "ST", "AB股", "昨日涨停", "昨日连板", "含一字", "炸板",
];

/// Substring blacklist over `entity_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseFilter {
    patterns: Vec<String>,
}

impl UniverseFilter {
    /// Create a filter from blacklist patterns. Empty patterns are ignored.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// Filter using [`DEFAULT_SECTOR_BLACKLIST`].
    pub fn sector_default() -> Self {
        Self::new(DEFAULT_SECTOR_BLACKLIST.iter().copied())
    }

    /// Configured patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Expression that is true for rows whose `entity_id` matches a pattern.
    pub fn excluded(&self) -> Option<Expr> {
        self.patterns
            .iter()
            .map(|p| col("entity_id").str().contains_literal(lit(p.as_str())))
            .reduce(|a, b| a.or(b))
    }

    /// Keep only rows whose `entity_id` is allowed.
    pub fn apply(&self, frame: DataFrame) -> Result<DataFrame> {
        let Some(excluded) = self.excluded() else {
            return Ok(frame);
        };
        Ok(frame.lazy().filter(excluded.not()).collect()?)
    }
}

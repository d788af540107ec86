//! Strategy catalogue.

use crate::error::SignalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known strategies. Adding a strategy means adding a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Trend (MRGC) or moving average alignment (SXHCG) over the core pool
    MrgcSxhcg,
    /// Strong stocks inside strong sectors
    SectorResonance,
}

/// Strategy metadata
#[derive(Debug, Clone)]
pub struct StrategyInfo {
    /// Strategy
    pub strategy: Strategy,
    /// Name persisted with each signal
    pub name: &'static str,
    /// Brief description
    pub description: &'static str,
}

impl Strategy {
    /// Every strategy, in run order.
    pub const ALL: [Self; 2] = [Self::MrgcSxhcg, Self::SectorResonance];

    /// Name persisted with each signal.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MrgcSxhcg => "mrgc_sxhcg",
            Self::SectorResonance => "sector_resonance",
        }
    }

    /// Brief description.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::MrgcSxhcg => {
                "Pool members near their yearly high with top 50/120/250 ranks, or with \
                 combined 120+250 rank above 185 and rising moving averages"
            }
            Self::SectorResonance => {
                "Stocks ranked above 85 (20 periods) inside sectors ranked above 90"
            }
        }
    }

    /// Whether evaluation is restricted to the active pool.
    pub const fn uses_pool(&self) -> bool {
        matches!(self, Self::MrgcSxhcg)
    }

    /// Catalogue of every strategy.
    pub fn all() -> Vec<StrategyInfo> {
        Self::ALL
            .iter()
            .map(|s| StrategyInfo {
                strategy: *s,
                name: s.name(),
                description: s.description(),
            })
            .collect()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "mrgc_sxhcg" | "mrgc" => Ok(Self::MrgcSxhcg),
            "sector_resonance" | "resonance" => Ok(Self::SectorResonance),
            _ => Err(SignalError::UnknownStrategy {
                name: s.to_string(),
                available: Self::ALL
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mrgc", Strategy::MrgcSxhcg)]
    #[case("MRGC_SXHCG", Strategy::MrgcSxhcg)]
    #[case("sector-resonance", Strategy::SectorResonance)]
    #[case("resonance", Strategy::SectorResonance)]
    fn test_parse(#[case] raw: &str, #[case] expected: Strategy) {
        assert_eq!(raw.parse::<Strategy>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_lists_available() {
        let err = "oversold".parse::<Strategy>().unwrap_err();
        assert!(err.to_string().contains("mrgc_sxhcg, sector_resonance"));
    }

    #[test]
    fn test_catalogue() {
        let all = Strategy::all();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|s| !s.description.is_empty()));
        assert_eq!(Strategy::MrgcSxhcg.to_string(), "mrgc_sxhcg");
        assert!(Strategy::MrgcSxhcg.uses_pool());
        assert!(!Strategy::SectorResonance.uses_pool());
    }
}

//! Leaderboard of the strongest entities on the latest factor date.

use crate::export::{ExportError, ExportFormat, Exporter, to_csv};
use chrono::NaiveDate;
use rps_data::{AssetClass, DataError, FactorStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Reading the factor table failed
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Parameters of the top ranked report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopRankedQuery {
    /// Asset class to report on
    pub class: AssetClass,
    /// Period whose rank is compared
    pub period: usize,
    /// Ranks strictly above this value are listed
    pub threshold: f64,
    /// Maximum number of entries
    pub limit: usize,
}

impl Default for TopRankedQuery {
    fn default() -> Self {
        Self {
            class: AssetClass::Sector,
            period: 20,
            threshold: 95.0,
            limit: 10,
        }
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopRankedEntry {
    /// Position in the report, starting at 1
    pub position: usize,
    /// Entity identifier
    pub entity_id: String,
    /// Percentile rank for the queried period
    pub rank: f64,
    /// Change over the queried period
    pub change: Option<f64>,
}

/// Top ranked entities of one asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopRanked {
    /// Query that produced the report
    pub query: TopRankedQuery,
    /// Factor date reported on (`None` when the factor table is empty)
    pub date: Option<NaiveDate>,
    /// Entries, strongest first
    pub entries: Vec<TopRankedEntry>,
}

/// Build the report from the latest factor date of `query.class`.
pub fn top_ranked<S: FactorStore>(store: &S, query: &TopRankedQuery) -> Result<TopRanked, ReportError> {
    let Some(date) = store.latest_factor_date(query.class)? else {
        return Ok(TopRanked {
            query: query.clone(),
            date: None,
            entries: Vec::new(),
        });
    };

    let mut ranked: Vec<(String, f64, Option<f64>)> = store
        .factor_snapshot(query.class, date, &[query.period])?
        .into_iter()
        .filter_map(|row| {
            let rank = row.rank(query.period)?;
            (rank > query.threshold).then(|| (row.entity_id.clone(), rank, row.change(query.period)))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(query.limit);

    let entries = ranked
        .into_iter()
        .enumerate()
        .map(|(i, (entity_id, rank, change))| TopRankedEntry {
            position: i + 1,
            entity_id,
            rank,
            change,
        })
        .collect();

    Ok(TopRanked {
        query: query.clone(),
        date: Some(date),
        entries,
    })
}

impl TopRanked {
    /// Convert report to JSON string.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for TopRanked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(date) = self.date else {
            return writeln!(f, "No {} factors stored", self.query.class);
        };
        writeln!(
            f,
            "Top {} by rank_{} > {} on {}",
            self.query.class, self.query.period, self.query.threshold, date
        )?;
        if self.entries.is_empty() {
            return writeln!(f, "  (none)");
        }
        for entry in &self.entries {
            let change = entry
                .change
                .map(|c| format!("{:+.2}%", c * 100.0))
                .unwrap_or_else(|| "n/a".to_string());
            writeln!(
                f,
                "  {:>2}. {:<20} {:>6.2}  {:>9}",
                entry.position, entry.entity_id, entry.rank, change
            )?;
        }
        Ok(())
    }
}

impl Exporter for Vec<TopRankedEntry> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => to_csv(self),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rps_data::{FactorRow, PeriodValue, SqliteStore};

    fn row(id: &str, date: NaiveDate, rank: f64) -> FactorRow {
        FactorRow {
            entity_id: id.to_string(),
            date,
            values: vec![PeriodValue {
                period: 20,
                change: Some(rank / 1000.0),
                rank_pct: Some(rank),
            }],
        }
    }

    #[test]
    fn test_empty_table() {
        let store = SqliteStore::in_memory().unwrap();
        let report = top_ranked(&store, &TopRankedQuery::default()).unwrap();
        assert!(report.date.is_none());
        assert!(report.to_string().contains("No sector factors stored"));
    }

    #[test]
    fn test_latest_date_sorted_and_limited() {
        let store = SqliteStore::in_memory().unwrap();
        let old = NaiveDate::from_ymd_opt(2024, 6, 27).unwrap();
        let new = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        store
            .replace_factor_dates(
                AssetClass::Sector,
                &[20],
                &[
                    row("Stale", old, 100.0),
                    row("Banks", new, 96.0),
                    row("Chips", new, 99.0),
                    row("Coal", new, 95.0),
                    row("Media", new, 97.5),
                ],
            )
            .unwrap();

        let query = TopRankedQuery {
            limit: 2,
            ..Default::default()
        };
        let report = top_ranked(&store, &query).unwrap();
        assert_eq!(report.date, Some(new));
        let ids: Vec<_> = report.entries.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["Chips", "Media"]);
        assert_eq!(report.entries[0].position, 1);

        let text = report.to_string();
        assert!(text.contains("rank_20 > 95"));
        assert!(text.contains("Chips"));

        let csv = report.entries.export_to_string(ExportFormat::Csv).unwrap();
        assert!(csv.starts_with("position,entity_id,rank,change"));
    }
}

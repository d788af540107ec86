//! Export of signals, factor rows and reports.
//!
//! CSV output is flat (one record per line, nested values serialised as
//! strings); JSON output keeps the original structure.

use chrono::NaiveDate;
use rps_data::{FactorRow, SignalRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pretty" | "pretty-json" | "pretty_json" => Ok(Self::PrettyJson),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// Serialise records to CSV with a header line.
pub(crate) fn to_csv<T: Serialize>(records: &[T]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

fn to_json<T: Serialize + ?Sized>(value: &T, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(value)?),
        _ => Ok(serde_json::to_string(value)?),
    }
}

/// Flattened signal for CSV export.
#[derive(Debug, Serialize, Deserialize)]
struct SignalFlat {
    strategy: String,
    date: NaiveDate,
    entity_id: String,
    signal_type: String,
    reason: String,
    meta: String,
}

impl SignalFlat {
    fn from_record(record: &SignalRecord) -> Self {
        Self {
            strategy: record.strategy_name.clone(),
            date: record.date,
            entity_id: record.entity_id.clone(),
            signal_type: record.signal_type.to_db_str().to_string(),
            reason: record.meta["reason"].as_str().unwrap_or_default().to_string(),
            meta: record.meta.to_string(),
        }
    }
}

/// Flattened factor value (one period of one row) for CSV export.
#[derive(Debug, Serialize, Deserialize)]
struct FactorFlat {
    entity_id: String,
    date: NaiveDate,
    period: usize,
    change: Option<f64>,
    rank: Option<f64>,
}

fn flatten_factor_row(row: &FactorRow) -> impl Iterator<Item = FactorFlat> + '_ {
    row.values.iter().map(move |v| FactorFlat {
        entity_id: row.entity_id.clone(),
        date: row.date,
        period: v.period,
        change: v.change,
        rank: v.rank_pct,
    })
}

impl Exporter for Vec<SignalRecord> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let flat: Vec<_> = self.iter().map(SignalFlat::from_record).collect();
                to_csv(&flat)
            }
            _ => to_json(self, format),
        }
    }
}

impl Exporter for Vec<FactorRow> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let flat: Vec<_> = self.iter().flat_map(flatten_factor_row).collect();
                to_csv(&flat)
            }
            _ => to_json(self, format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rps_data::{PeriodValue, SignalType};
    use rstest::rstest;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    fn signals() -> Vec<SignalRecord> {
        vec![SignalRecord {
            strategy_name: "mrgc_sxhcg".to_string(),
            entity_id: "600519".to_string(),
            date: date(),
            signal_type: SignalType::Buy,
            meta: json!({ "reason": "MRGC triggered", "factors": { "rank_120": 98.5 } }),
        }]
    }

    #[rstest]
    #[case("csv", ExportFormat::Csv)]
    #[case("JSON", ExportFormat::Json)]
    #[case("pretty", ExportFormat::PrettyJson)]
    fn test_format_parse(#[case] raw: &str, #[case] expected: ExportFormat) {
        assert_eq!(raw.parse::<ExportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_format() {
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::PrettyJson.extension(), "json");
    }

    #[test]
    fn test_signals_csv_is_flat() {
        let csv = signals().export_to_string(ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("strategy,date,entity_id,signal_type,reason,meta")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("mrgc_sxhcg,2024-06-28,600519,BUY,MRGC triggered,"));
        assert!(row.contains("rank_120"));
    }

    #[test]
    fn test_signals_json_keeps_structure() {
        let json = signals().export_to_string(ExportFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["meta"]["factors"]["rank_120"], 98.5);
        assert_eq!(parsed[0]["signal_type"], "BUY");
    }

    #[test]
    fn test_factor_rows_csv_one_line_per_period() {
        let rows = vec![FactorRow {
            entity_id: "510300".to_string(),
            date: date(),
            values: vec![
                PeriodValue {
                    period: 20,
                    change: Some(0.0512),
                    rank_pct: Some(88.5),
                },
                PeriodValue {
                    period: 250,
                    change: None,
                    rank_pct: None,
                },
            ],
        }];
        let csv = rows.export_to_string(ExportFormat::Csv).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "510300,2024-06-28,20,0.0512,88.5");
        assert_eq!(lines[2], "510300,2024-06-28,250,,");
    }

    #[test]
    fn test_export_to_file() {
        let path = std::env::temp_dir().join("rps_output_export_test.json");
        signals()
            .export_to_file(&path, ExportFormat::PrettyJson)
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"600519\""));
        std::fs::remove_file(&path).unwrap();
    }
}

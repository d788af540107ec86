//! Entity by date price panel.

use crate::error::{FactorError, Result};
use polars::prelude::*;

/// Closing prices on a complete entity by date grid, kept in long form.
///
/// Every entity has a row for every date seen in the window. Closes are null
/// until an entity's first bar and forward filled afterwards, so a suspended
/// instrument carries its last close.
#[derive(Debug, Clone)]
pub struct PricePanel {
    frame: DataFrame,
    entities: usize,
    dates: usize,
}

impl PricePanel {
    /// Build the panel from a long `(entity_id, date, close)` frame.
    ///
    /// When an `(entity, date)` pair appears more than once the last row wins.
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        let prices = frame
            .clone()
            .lazy()
            .filter(
                col("entity_id")
                    .is_not_null()
                    .and(col("date").is_not_null())
                    .and(col("close").is_not_null()),
            )
            .group_by([col("entity_id"), col("date")])
            .agg([col("close").last()]);

        let entities = prices.clone().select([col("entity_id").unique()]).collect()?;
        let dates = prices.clone().select([col("date").unique()]).collect()?;
        if entities.height() == 0 || dates.height() == 0 {
            return Err(FactorError::Validation(
                "price panel has no entities or no dates".to_string(),
            ));
        }

        let panel = entities
            .clone()
            .lazy()
            .join(
                dates.clone().lazy(),
                Vec::<Expr>::new(),
                Vec::<Expr>::new(),
                JoinArgs::new(JoinType::Cross),
            )
            .join(
                prices,
                [col("entity_id"), col("date")],
                [col("entity_id"), col("date")],
                JoinArgs::new(JoinType::Left),
            )
            .sort(["entity_id", "date"], SortMultipleOptions::default())
            .with_column(col("close").forward_fill(None).over([col("entity_id")]))
            .collect()?;

        Ok(Self {
            frame: panel,
            entities: entities.height(),
            dates: dates.height(),
        })
    }

    /// Panel rows sorted by entity then date.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Lazy view over the panel.
    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone().lazy()
    }

    /// Distinct entities.
    pub const fn entity_count(&self) -> usize {
        self.entities
    }

    /// Distinct dates.
    pub const fn date_count(&self) -> usize {
        self.dates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rows: &[(&str, &str, f64)]) -> DataFrame {
        let ids: Vec<&str> = rows.iter().map(|r| r.0).collect();
        let dates: Vec<&str> = rows.iter().map(|r| r.1).collect();
        let closes: Vec<f64> = rows.iter().map(|r| r.2).collect();
        DataFrame::new(vec![
            Series::new("entity_id".into(), ids).into(),
            Series::new("date".into(), dates).into(),
            Series::new("close".into(), closes).into(),
        ])
        .unwrap()
    }

    fn close(panel: &PricePanel, id: &str, date: &str) -> Option<f64> {
        let df = panel.frame();
        let ids = df.column("entity_id").unwrap().str().unwrap();
        let dates = df.column("date").unwrap().str().unwrap();
        let closes = df.column("close").unwrap().f64().unwrap();
        (0..df.height())
            .find(|&i| ids.get(i) == Some(id) && dates.get(i) == Some(date))
            .and_then(|i| closes.get(i))
    }

    #[test]
    fn test_grid_and_forward_fill() {
        let df = frame(&[
            ("A", "2024-01-02", 10.0),
            ("B", "2024-01-02", 20.0),
            ("A", "2024-01-03", 11.0),
            ("B", "2024-01-04", 22.0),
            ("A", "2024-01-04", 12.0),
        ]);
        let panel = PricePanel::from_frame(&df).unwrap();

        assert_eq!(panel.entity_count(), 2);
        assert_eq!(panel.date_count(), 3);
        assert_eq!(panel.frame().height(), 6);
        // B was suspended on the 3rd and carries its previous close.
        assert_eq!(close(&panel, "B", "2024-01-03"), Some(20.0));
        assert_eq!(close(&panel, "B", "2024-01-04"), Some(22.0));
    }

    #[test]
    fn test_rows_sorted_by_entity_then_date() {
        let df = frame(&[
            ("B", "2024-01-03", 21.0),
            ("A", "2024-01-03", 11.0),
            ("B", "2024-01-02", 20.0),
            ("A", "2024-01-02", 10.0),
        ]);
        let panel = PricePanel::from_frame(&df).unwrap();
        let ids = panel.frame().column("entity_id").unwrap().str().unwrap();
        let dates = panel.frame().column("date").unwrap().str().unwrap();
        let order: Vec<_> = (0..4).map(|i| (ids.get(i), dates.get(i))).collect();
        assert_eq!(
            order,
            vec![
                (Some("A"), Some("2024-01-02")),
                (Some("A"), Some("2024-01-03")),
                (Some("B"), Some("2024-01-02")),
                (Some("B"), Some("2024-01-03")),
            ]
        );
    }

    #[test]
    fn test_leading_gap_stays_missing() {
        let df = frame(&[
            ("A", "2024-01-02", 10.0),
            ("B", "2024-01-03", 20.0),
            ("A", "2024-01-03", 11.0),
        ]);
        let panel = PricePanel::from_frame(&df).unwrap();
        assert_eq!(close(&panel, "B", "2024-01-02"), None);
        assert_eq!(close(&panel, "B", "2024-01-03"), Some(20.0));
    }

    #[test]
    fn test_empty_frame_is_invalid() {
        let df = frame(&[]);
        assert!(matches!(
            PricePanel::from_frame(&df),
            Err(FactorError::Validation(_))
        ));
    }
}

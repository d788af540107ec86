//! SQLite store for prices, fundamentals and derived tables.

use crate::error::{DataError, Result};
use crate::model::{
    AssetClass, DATE_FORMAT, Entity, FactorRow, ForeignHolding, FundHolding, PeriodValue,
    PoolMember, PriceBar, SectorMember, SignalRecord, SignalType, Valuation, parse_date,
};
use crate::source::{FactorStore, FundamentalSource, PoolStore, PriceSource, SignalStore};
use chrono::NaiveDate;
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Name of the change column for a period.
pub fn change_column(period: usize) -> String {
    format!("change_{}", period)
}

/// Name of the rank column for a period.
pub fn rank_column(period: usize) -> String {
    format!("rank_{}", period)
}

fn date_str(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn real(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

/// SQLite store implementing every source and store contract.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

/// Row counts of the main tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Price rows per asset class
    pub price_rows: Vec<(AssetClass, usize)>,
    /// Factor rows per asset class
    pub factor_rows: Vec<(AssetClass, usize)>,
    /// Pool membership rows
    pub pool_rows: usize,
    /// Signal rows
    pub signal_rows: usize,
}

impl SqliteStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema. Factor tables are created lazily since
    /// their columns depend on the configured periods.
    fn initialize_schema(&self) -> Result<()> {
        for class in AssetClass::ALL {
            let table = class.price_table();
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        entity_id TEXT NOT NULL,
                        date TEXT NOT NULL,
                        open REAL NOT NULL,
                        high REAL NOT NULL,
                        low REAL NOT NULL,
                        close REAL NOT NULL,
                        volume REAL NOT NULL,
                        turnover_rate REAL,
                        PRIMARY KEY (entity_id, date)
                    )"
                ),
                [],
            )?;
            self.conn.execute(
                &format!("CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table}(date)"),
                [],
            )?;
        }

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                entity_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sector_members (
                sector_name TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                PRIMARY KEY (sector_name, entity_id)
            );

            CREATE TABLE IF NOT EXISTS fund_holdings (
                entity_id TEXT NOT NULL,
                report_date TEXT NOT NULL,
                share_count REAL NOT NULL,
                PRIMARY KEY (entity_id, report_date)
            );

            CREATE TABLE IF NOT EXISTS valuations (
                entity_id TEXT NOT NULL,
                date TEXT NOT NULL,
                total_market_value REAL NOT NULL,
                price REAL NOT NULL,
                PRIMARY KEY (entity_id, date)
            );

            CREATE TABLE IF NOT EXISTS foreign_holdings (
                entity_id TEXT NOT NULL,
                date TEXT NOT NULL,
                hold_value REAL NOT NULL,
                PRIMARY KEY (entity_id, date)
            );

            CREATE TABLE IF NOT EXISTS pool_members (
                pool_name TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                as_of_date TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (pool_name, entity_id)
            );

            CREATE TABLE IF NOT EXISTS signals (
                strategy_name TEXT NOT NULL,
                date TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                meta TEXT NOT NULL,
                PRIMARY KEY (strategy_name, date, entity_id)
            );

            CREATE INDEX IF NOT EXISTS idx_signals_date ON signals(date);",
        )?;

        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(columns)
    }

    /// Create the factor table of `class` and add any missing period columns.
    fn ensure_factor_table(conn: &Connection, class: AssetClass, periods: &[usize]) -> Result<()> {
        let table = class.factor_table();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    entity_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    PRIMARY KEY (entity_id, date)
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table}(date)"),
            [],
        )?;

        let existing = Self::table_columns(conn, table)?;
        for &period in periods {
            for column in [change_column(period), rank_column(period)] {
                if !existing.contains(&column) {
                    debug!(table, column = column.as_str(), "adding factor column");
                    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} REAL"), [])?;
                }
            }
        }
        Ok(())
    }

    fn insert_factor_rows(
        conn: &Connection,
        class: AssetClass,
        periods: &[usize],
        rows: &[FactorRow],
    ) -> Result<usize> {
        let mut columns = vec!["entity_id".to_string(), "date".to_string()];
        for &period in periods {
            columns.push(change_column(period));
            columns.push(rank_column(period));
        }
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            class.factor_table(),
            columns.join(", "),
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            values.push(Value::Text(row.entity_id.clone()));
            values.push(Value::Text(date_str(row.date)));
            for &period in periods {
                let value = row.value(period);
                values.push(real(value.and_then(|v| v.change)));
                values.push(real(value.and_then(|v| v.rank_pct)));
            }
            stmt.execute(params_from_iter(values))?;
        }
        Ok(rows.len())
    }

    /// Store daily bars (insert or replace on `(entity_id, date)`).
    pub fn put_bars(&self, class: AssetClass, bars: &[PriceBar]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {}
                 (entity_id, date, open, high, low, close, volume, turnover_rate)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                class.price_table()
            ))?;
            for bar in bars {
                stmt.execute(params![
                    bar.entity_id,
                    date_str(bar.date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.turnover_rate,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Store listed entities.
    pub fn put_entities(&self, entities: &[Entity]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for entity in entities {
            tx.execute(
                "INSERT OR REPLACE INTO entities (entity_id, name) VALUES (?1, ?2)",
                params![entity.entity_id, entity.name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Store sector memberships.
    pub fn put_sector_members(&self, members: &[SectorMember]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for member in members {
            tx.execute(
                "INSERT OR REPLACE INTO sector_members (sector_name, entity_id) VALUES (?1, ?2)",
                params![member.sector_name, member.entity_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Store fund holding reports.
    pub fn put_fund_holdings(&self, holdings: &[FundHolding]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for holding in holdings {
            tx.execute(
                "INSERT OR REPLACE INTO fund_holdings (entity_id, report_date, share_count)
                 VALUES (?1, ?2, ?3)",
                params![
                    holding.entity_id,
                    date_str(holding.report_date),
                    holding.share_count
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Store valuation snapshots.
    pub fn put_valuations(&self, valuations: &[Valuation]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for valuation in valuations {
            tx.execute(
                "INSERT OR REPLACE INTO valuations (entity_id, date, total_market_value, price)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    valuation.entity_id,
                    date_str(valuation.date),
                    valuation.total_market_value,
                    valuation.price
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Store cross-border holding snapshots.
    pub fn put_foreign_holdings(&self, holdings: &[ForeignHolding]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for holding in holdings {
            tx.execute(
                "INSERT OR REPLACE INTO foreign_holdings (entity_id, date, hold_value)
                 VALUES (?1, ?2, ?3)",
                params![holding.entity_id, date_str(holding.date), holding.hold_value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of rows stored in the factor table of `class`.
    pub fn factor_row_count(&self, class: AssetClass) -> Result<usize> {
        let table = class.factor_table();
        if !self.table_exists(table)? {
            return Ok(0);
        }
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for class in AssetClass::ALL {
            let count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", class.price_table()),
                [],
                |row| row.get(0),
            )?;
            stats.price_rows.push((class, count as usize));
            stats
                .factor_rows
                .push((class, self.factor_row_count(class)?));
        }
        let pool: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pool_members", [], |row| row.get(0))?;
        let signals: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))?;
        stats.pool_rows = pool as usize;
        stats.signal_rows = signals as usize;
        Ok(stats)
    }
}

impl PriceSource for SqliteStore {
    fn load_closes(
        &self,
        class: AssetClass,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<DataFrame> {
        if let Some(start) = start
            && start > end
        {
            return Err(DataError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT entity_id, date, close FROM {}
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date ASC, entity_id ASC",
            class.price_table()
        ))?;

        // An empty lower bound sorts before every date string.
        let start = start.map(date_str).unwrap_or_default();

        let mut entities = Vec::new();
        let mut dates = Vec::new();
        let mut closes = Vec::new();

        let rows = stmt.query_map(params![start, date_str(end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        for row in rows {
            let (entity, date, close) = row?;
            entities.push(entity);
            dates.push(date);
            closes.push(close);
        }

        let df = DataFrame::new(vec![
            Series::new("entity_id".into(), entities).into(),
            Series::new("date".into(), dates).into(),
            Series::new("close".into(), closes).into(),
        ])?;

        Ok(df)
    }

    fn history(
        &self,
        class: AssetClass,
        entity_id: &str,
        until: NaiveDate,
        limit: usize,
    ) -> Result<Vec<PriceBar>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT date, open, high, low, close, volume, turnover_rate FROM {}
             WHERE entity_id = ?1 AND date <= ?2
             ORDER BY date DESC
             LIMIT ?3",
            class.price_table()
        ))?;

        let rows = stmt.query_map(params![entity_id, date_str(until), limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?;

        let mut bars = Vec::new();
        for row in rows {
            let (date, open, high, low, close, volume, turnover_rate) = row?;
            bars.push(PriceBar {
                entity_id: entity_id.to_string(),
                date: parse_date(&date)?,
                open,
                high,
                low,
                close,
                volume,
                turnover_rate,
            });
        }
        bars.reverse();
        Ok(bars)
    }

    fn latest_date(&self, class: AssetClass) -> Result<Option<NaiveDate>> {
        let latest: Option<String> = self.conn.query_row(
            &format!("SELECT MAX(date) FROM {}", class.price_table()),
            [],
            |row| row.get(0),
        )?;
        latest.as_deref().map(parse_date).transpose()
    }
}

impl FundamentalSource for SqliteStore {
    fn entities(&self) -> Result<Vec<Entity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id, name FROM entities ORDER BY entity_id")?;
        let entities = stmt
            .query_map([], |row| {
                Ok(Entity {
                    entity_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn fund_holdings(&self) -> Result<Vec<FundHolding>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, report_date, share_count FROM fund_holdings
             ORDER BY entity_id, report_date DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut holdings = Vec::new();
        for row in rows {
            let (entity_id, report_date, share_count) = row?;
            holdings.push(FundHolding {
                entity_id,
                report_date: parse_date(&report_date)?,
                share_count,
            });
        }
        Ok(holdings)
    }

    fn valuations(&self) -> Result<Vec<Valuation>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, date, total_market_value, price FROM valuations
             ORDER BY entity_id, date DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut valuations = Vec::new();
        for row in rows {
            let (entity_id, date, total_market_value, price) = row?;
            valuations.push(Valuation {
                entity_id,
                date: parse_date(&date)?,
                total_market_value,
                price,
            });
        }
        Ok(valuations)
    }

    fn foreign_holdings(&self) -> Result<Vec<ForeignHolding>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, date, hold_value FROM foreign_holdings
             ORDER BY entity_id, date DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut holdings = Vec::new();
        for row in rows {
            let (entity_id, date, hold_value) = row?;
            holdings.push(ForeignHolding {
                entity_id,
                date: parse_date(&date)?,
                hold_value,
            });
        }
        Ok(holdings)
    }

    fn sector_members(&self, sectors: &[String]) -> Result<Vec<SectorMember>> {
        if sectors.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=sectors.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT sector_name, entity_id FROM sector_members
             WHERE sector_name IN ({placeholders})
             ORDER BY entity_id, sector_name"
        ))?;
        let members = stmt
            .query_map(params_from_iter(sectors.iter()), |row| {
                Ok(SectorMember {
                    sector_name: row.get(0)?,
                    entity_id: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }
}

impl FactorStore for SqliteStore {
    fn replace_factor_dates(
        &self,
        class: AssetClass,
        periods: &[usize],
        rows: &[FactorRow],
    ) -> Result<usize> {
        let dates: Vec<NaiveDate> = {
            let mut dates: Vec<_> = rows.iter().map(|r| r.date).collect();
            dates.sort_unstable();
            dates.dedup();
            dates
        };

        let tx = self.conn.unchecked_transaction()?;
        Self::ensure_factor_table(&tx, class, periods)?;
        for date in &dates {
            tx.execute(
                &format!("DELETE FROM {} WHERE date = ?1", class.factor_table()),
                params![date_str(*date)],
            )?;
        }
        let written = Self::insert_factor_rows(&tx, class, periods, rows)?;
        tx.commit()?;

        debug!(%class, dates = dates.len(), rows = written, "replaced factor dates");
        Ok(written)
    }

    fn replace_factor_table(
        &self,
        class: AssetClass,
        periods: &[usize],
        rows: &[FactorRow],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        Self::ensure_factor_table(&tx, class, periods)?;
        tx.execute(&format!("DELETE FROM {}", class.factor_table()), [])?;
        let written = Self::insert_factor_rows(&tx, class, periods, rows)?;
        tx.commit()?;

        debug!(%class, rows = written, "replaced factor table");
        Ok(written)
    }

    fn factor_snapshot(
        &self,
        class: AssetClass,
        date: NaiveDate,
        periods: &[usize],
    ) -> Result<Vec<FactorRow>> {
        let table = class.factor_table();
        if !self.table_exists(table)? {
            return Ok(Vec::new());
        }

        // Periods without a column yet read back as undefined.
        let existing = Self::table_columns(&self.conn, table)?;
        let stored: Vec<usize> = periods
            .iter()
            .copied()
            .filter(|p| existing.contains(&rank_column(*p)) && existing.contains(&change_column(*p)))
            .collect();

        let mut select = String::from("entity_id");
        for &period in &stored {
            select.push_str(&format!(", {}, {}", change_column(period), rank_column(period)));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {select} FROM {table} WHERE date = ?1 ORDER BY entity_id"
        ))?;

        let rows = stmt.query_map(params![date_str(date)], |row| {
            let entity_id: String = row.get(0)?;
            let mut values = Vec::with_capacity(periods.len());
            for &period in periods {
                let value = match stored.iter().position(|p| *p == period) {
                    Some(i) => PeriodValue {
                        period,
                        change: row.get(1 + 2 * i)?,
                        rank_pct: row.get(2 + 2 * i)?,
                    },
                    None => PeriodValue {
                        period,
                        change: None,
                        rank_pct: None,
                    },
                };
                values.push(value);
            }
            Ok(FactorRow {
                entity_id,
                date,
                values,
            })
        })?;

        let snapshot = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(snapshot)
    }

    fn latest_factor_date(&self, class: AssetClass) -> Result<Option<NaiveDate>> {
        let table = class.factor_table();
        if !self.table_exists(table)? {
            return Ok(None);
        }
        let latest: Option<String> =
            self.conn
                .query_row(&format!("SELECT MAX(date) FROM {table}"), [], |row| row.get(0))?;
        latest.as_deref().map(parse_date).transpose()
    }
}

impl PoolStore for SqliteStore {
    fn replace_pool(&self, pool_name: &str, members: &[PoolMember]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM pool_members WHERE pool_name = ?1",
            params![pool_name],
        )?;
        for member in members {
            tx.execute(
                "INSERT OR REPLACE INTO pool_members
                 (pool_name, entity_id, reason, as_of_date, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    pool_name,
                    member.entity_id,
                    member.reason,
                    date_str(member.as_of_date),
                    member.active,
                ],
            )?;
        }
        tx.commit()?;
        Ok(members.len())
    }

    fn pool_members(&self, pool_name: &str) -> Result<Vec<PoolMember>> {
        let mut stmt = self.conn.prepare(
            "SELECT pool_name, entity_id, reason, as_of_date, active FROM pool_members
             WHERE pool_name = ?1 AND active = 1
             ORDER BY entity_id",
        )?;
        let rows = stmt.query_map(params![pool_name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut members = Vec::new();
        for row in rows {
            let (pool_name, entity_id, reason, as_of_date, active) = row?;
            members.push(PoolMember {
                pool_name,
                entity_id,
                reason,
                as_of_date: parse_date(&as_of_date)?,
                active,
            });
        }
        Ok(members)
    }
}

impl SignalStore for SqliteStore {
    fn replace_signals(
        &self,
        strategy_name: &str,
        date: NaiveDate,
        rows: &[SignalRecord],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM signals WHERE strategy_name = ?1 AND date = ?2",
            params![strategy_name, date_str(date)],
        )?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO signals (strategy_name, date, entity_id, signal_type, meta)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    strategy_name,
                    date_str(date),
                    row.entity_id,
                    row.signal_type.to_db_str(),
                    serde_json::to_string(&row.meta)?,
                ],
            )?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn signals(&self, strategy_name: Option<&str>, date: NaiveDate) -> Result<Vec<SignalRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT strategy_name, entity_id, signal_type, meta FROM signals
             WHERE date = ?1 AND (?2 IS NULL OR strategy_name = ?2)
             ORDER BY strategy_name, entity_id",
        )?;
        let rows = stmt.query_map(params![date_str(date), strategy_name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut signals = Vec::new();
        for row in rows {
            let (strategy_name, entity_id, signal_type, meta) = row?;
            signals.push(SignalRecord {
                strategy_name,
                entity_id,
                date,
                signal_type: SignalType::from_db_str(&signal_type)?,
                meta: serde_json::from_str(&meta)?,
            });
        }
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn factor_row(entity: &str, date: NaiveDate, rank: Option<f64>) -> FactorRow {
        FactorRow {
            entity_id: entity.to_string(),
            date,
            values: vec![PeriodValue {
                period: 20,
                change: rank.map(|r| r / 1000.0),
                rank_pct: rank,
            }],
        }
    }

    #[test]
    fn test_store_initialization() {
        let store = SqliteStore::in_memory();
        assert!(store.is_ok());
    }

    #[test]
    fn test_load_closes_empty_is_not_an_error() {
        let store = SqliteStore::in_memory().unwrap();
        let df = store.load_closes(AssetClass::Stock, None, day(31)).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(store.latest_date(AssetClass::Stock).unwrap(), None);
    }

    #[test]
    fn test_load_closes_respects_window() {
        let store = SqliteStore::in_memory().unwrap();
        let bars: Vec<_> = (2..=6)
            .map(|d| PriceBar::flat("A", day(d), d as f64))
            .collect();
        store.put_bars(AssetClass::Stock, &bars).unwrap();

        let df = store
            .load_closes(AssetClass::Stock, Some(day(3)), day(5))
            .unwrap();
        assert_eq!(df.height(), 3);
        let closes = df.column("close").unwrap().f64().unwrap();
        assert_eq!(closes.get(0), Some(3.0));
        assert_eq!(closes.get(2), Some(5.0));

        assert!(
            store
                .load_closes(AssetClass::Stock, Some(day(6)), day(5))
                .is_err()
        );
        assert_eq!(store.latest_date(AssetClass::Stock).unwrap(), Some(day(6)));
    }

    #[test]
    fn test_history_is_oldest_first_and_bounded() {
        let store = SqliteStore::in_memory().unwrap();
        let bars: Vec<_> = (2..=9)
            .map(|d| PriceBar::flat("A", day(d), d as f64))
            .collect();
        store.put_bars(AssetClass::Stock, &bars).unwrap();

        let history = store.history(AssetClass::Stock, "A", day(8), 3).unwrap();
        let dates: Vec<_> = history.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![day(6), day(7), day(8)]);
    }

    #[test]
    fn test_replace_factor_dates_only_touches_given_dates() {
        let store = SqliteStore::in_memory().unwrap();
        let periods = [20];
        store
            .replace_factor_dates(
                AssetClass::Stock,
                &periods,
                &[
                    factor_row("A", day(2), Some(50.0)),
                    factor_row("B", day(3), Some(100.0)),
                ],
            )
            .unwrap();

        // Rewrite day 3 only; day 2 must survive untouched.
        store
            .replace_factor_dates(
                AssetClass::Stock,
                &periods,
                &[factor_row("C", day(3), Some(75.0))],
            )
            .unwrap();

        let day2 = store
            .factor_snapshot(AssetClass::Stock, day(2), &periods)
            .unwrap();
        assert_eq!(day2.len(), 1);
        let day3 = store
            .factor_snapshot(AssetClass::Stock, day(3), &periods)
            .unwrap();
        assert_eq!(day3.len(), 1);
        assert_eq!(day3[0].entity_id, "C");
        assert_eq!(day3[0].rank(20), Some(75.0));
    }

    #[test]
    fn test_factor_nulls_round_trip_as_none() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_factor_table(AssetClass::Sector, &[20], &[factor_row("X", day(2), None)])
            .unwrap();
        let rows = store
            .factor_snapshot(AssetClass::Sector, day(2), &[20, 250])
            .unwrap();
        assert_eq!(rows[0].rank(20), None);
        assert_eq!(rows[0].change(20), None);
        // Period never written reads back as undefined.
        assert_eq!(rows[0].rank(250), None);
    }

    #[test]
    fn test_factor_table_grows_new_period_columns() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_factor_table(AssetClass::Etf, &[20], &[factor_row("E", day(2), Some(1.0))])
            .unwrap();
        let row = FactorRow {
            entity_id: "E".to_string(),
            date: day(3),
            values: vec![PeriodValue {
                period: 60,
                change: Some(0.2),
                rank_pct: Some(40.0),
            }],
        };
        store
            .replace_factor_dates(AssetClass::Etf, &[60], &[row])
            .unwrap();
        let rows = store
            .factor_snapshot(AssetClass::Etf, day(3), &[60])
            .unwrap();
        assert_eq!(rows[0].rank(60), Some(40.0));
        assert_eq!(store.latest_factor_date(AssetClass::Etf).unwrap(), Some(day(3)));
    }

    #[test]
    fn test_latest_factor_date_without_table() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.latest_factor_date(AssetClass::Stock).unwrap(), None);
        assert!(
            store
                .factor_snapshot(AssetClass::Stock, day(2), &[20])
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_replace_pool_drops_stale_members() {
        let store = SqliteStore::in_memory().unwrap();
        let member = |id: &str| PoolMember {
            pool_name: "core".to_string(),
            entity_id: id.to_string(),
            reason: "fund".to_string(),
            as_of_date: day(2),
            active: true,
        };
        store.replace_pool("core", &[member("A"), member("B")]).unwrap();
        store.replace_pool("core", &[member("B")]).unwrap();

        let members = store.pool_members("core").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].entity_id, "B");
    }

    #[test]
    fn test_replace_signals_is_scoped_to_strategy_and_date() {
        let store = SqliteStore::in_memory().unwrap();
        let signal = |strategy: &str, id: &str, date| SignalRecord {
            strategy_name: strategy.to_string(),
            entity_id: id.to_string(),
            date,
            signal_type: SignalType::Buy,
            meta: json!({ "reason": "test" }),
        };
        store
            .replace_signals("s1", day(2), &[signal("s1", "A", day(2))])
            .unwrap();
        store
            .replace_signals("s2", day(2), &[signal("s2", "B", day(2))])
            .unwrap();
        store.replace_signals("s1", day(2), &[]).unwrap();

        assert!(store.signals(Some("s1"), day(2)).unwrap().is_empty());
        let all = store.signals(None, day(2)).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].meta["reason"], "test");
    }

    #[test]
    fn test_store_stats() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_bars(AssetClass::Etf, &[PriceBar::flat("510300", day(2), 4.0)])
            .unwrap();
        let stats = store.get_stats().unwrap();
        assert!(stats.price_rows.contains(&(AssetClass::Etf, 1)));
        assert!(stats.factor_rows.iter().all(|(_, n)| *n == 0));
        assert_eq!(stats.signal_rows, 0);
    }
}

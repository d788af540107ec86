//! Persistence layer for prices, fundamentals and derived tables.

pub mod sqlite;

pub use sqlite::{SqliteStore, StoreStats, change_column, rank_column};

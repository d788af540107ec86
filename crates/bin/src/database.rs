//! Database location.
//!
//! The store lives in a platform-specific data directory unless `--db` or
//! the `database` key of the configuration file says otherwise.

use rps_data::{DataError, SqliteStore};
use std::path::{Path, PathBuf};

/// Get the default data directory path.
///
/// Uses platform-specific data directories:
/// - Linux: `~/.local/share/rps/`
/// - macOS: `~/Library/Application Support/rps/`
/// - Windows: `%APPDATA%\rps\`
pub(crate) fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rps")
}

/// Get the default database path.
pub(crate) fn default_database_path() -> PathBuf {
    default_data_dir().join("rps.db")
}

/// Resolve the database path: command line first, then configuration, then default.
pub(crate) fn resolve_path(cli: Option<&Path>, configured: Option<&Path>) -> PathBuf {
    cli.or(configured)
        .map_or_else(default_database_path, Path::to_path_buf)
}

/// Open the store, creating the directory if needed.
pub(crate) fn open_store(path: &Path) -> Result<SqliteStore, DataError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    SqliteStore::new(path)
}

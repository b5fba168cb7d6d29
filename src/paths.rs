//! XDG directory helpers for the local database location.

use std::path::PathBuf;

use crate::config::Config;

/// Base directory for persistent data (the SQLite database).
///
/// Uses `CARDSYNC_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/cardsync` or
/// `~/.local/share/cardsync`.
pub(crate) fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CARDSYNC_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("cardsync")
}

/// Resolved path of the local database file.
pub(crate) fn database_path(config: &Config) -> PathBuf {
    data_dir().join(&config.database.filename)
}

//! SQLite schema and connection setup.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use super::StoreError;

const SCHEMA_VERSION: u32 = 1;
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// The mirrored card table. Column set matches the remote table; booleans
/// are stored as 0/1 integers and the social list as a JSON text blob.
const CREATE_CARDS: &str = "\
CREATE TABLE IF NOT EXISTS digital_cards (
    id                TEXT PRIMARY KEY,
    digital_card_name TEXT,
    full_name         TEXT,
    first_name        TEXT,
    middle_name       TEXT,
    last_name         TEXT,
    prefix            TEXT,
    suffix            TEXT,
    accreditations    TEXT,
    preferred_name    TEXT,
    title             TEXT,
    department        TEXT,
    company           TEXT,
    headline          TEXT,
    background_url    TEXT,
    avatar_url        TEXT,
    contact_type      TEXT,
    digital_card_url  TEXT,
    notes             TEXT,
    qr_code           TEXT,
    created_at        TEXT,
    is_public         INTEGER,
    user_id           TEXT,
    theme             TEXT,
    social_media      TEXT
)";

/// Pending local mutations awaiting remote confirmation. FIFO by `seq`;
/// `tx_id` groups the atomic batch a drain uploads together.
const CREATE_CRUD_LOG: &str = "\
CREATE TABLE IF NOT EXISTS crud_log (
    seq    INTEGER PRIMARY KEY AUTOINCREMENT,
    tx_id  INTEGER NOT NULL,
    op     TEXT NOT NULL,
    tbl    TEXT NOT NULL,
    row_id TEXT NOT NULL,
    data   TEXT
)";

const CREATE_CRUD_LOG_TX_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS crud_log_tx ON crud_log (tx_id, seq)";

const CREATE_META: &str = "\
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

pub(crate) fn open_database(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let conn = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&conn)?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;

    let is_new = !table_exists(&conn, "meta")?;
    if is_new {
        initialize_schema(&conn)?;
    } else {
        validate_schema_version(&conn)?;
    }

    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("BEGIN")?;
    let result = (|| -> Result<(), StoreError> {
        conn.execute(CREATE_META, [])?;
        conn.execute(CREATE_CARDS, [])?;
        conn.execute(CREATE_CRUD_LOG, [])?;
        conn.execute(CREATE_CRUD_LOG_TX_INDEX, [])?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)",
            [SCHEMA_VERSION.to_string()],
        )?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('next_tx_id', '1')",
            [],
        )?;
        Ok(())
    })();
    match result {
        Ok(()) => conn.execute_batch("COMMIT")?,
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }
    Ok(())
}

fn validate_schema_version(conn: &Connection) -> Result<(), StoreError> {
    let got: String = conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    let got: u32 = got
        .parse()
        .map_err(|_| StoreError::SchemaVersionMismatch {
            expected: SCHEMA_VERSION,
            got: 0,
        })?;
    if got != SCHEMA_VERSION {
        return Err(StoreError::SchemaVersionMismatch {
            expected: SCHEMA_VERSION,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.db");

        {
            let conn = open_database(&path).unwrap();
            assert!(table_exists(&conn, "digital_cards").unwrap());
            assert!(table_exists(&conn, "crud_log").unwrap());
        }
        // Second open validates instead of re-initializing.
        let conn = open_database(&path).unwrap();
        validate_schema_version(&conn).unwrap();
    }
}

//! Durable FIFO log of pending local mutations.
//!
//! Entries are appended inside the same SQL transaction as the optimistic
//! write, so the log and the materialized row can never diverge. Once
//! appended, only the uploader touches an entry, and only to complete a
//! fully-confirmed batch.

use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::{Connection, params};
use serde_json::{Map, Value};

use super::local::SharedDb;
use super::StoreError;

/// Operation kind recorded for one row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum OpKind {
    /// Insert or replace the whole row.
    Put,
    /// Partial column update.
    Patch,
    /// Remove the row.
    Delete,
}

impl OpKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            OpKind::Put => "PUT",
            OpKind::Patch => "PATCH",
            OpKind::Delete => "DELETE",
        }
    }

    fn parse(s: &str) -> Option<OpKind> {
        match s {
            "PUT" => Some(OpKind::Put),
            "PATCH" => Some(OpKind::Patch),
            "DELETE" => Some(OpKind::Delete),
            _ => None,
        }
    }
}

/// One pending operation.
#[derive(Debug, Clone)]
pub(crate) struct CrudEntry {
    pub seq: i64,
    pub op: OpKind,
    pub table: String,
    pub row_id: String,
    /// Touched columns in local representation; `None` for DELETE.
    pub data: Option<Map<String, Value>>,
}

/// The oldest un-confirmed batch: an atomic unit for upload.
#[derive(Debug, Clone)]
pub(crate) struct CrudTransaction {
    pub tx_id: i64,
    pub ops: Vec<CrudEntry>,
}

/// Allocate a fresh transaction id. Runs inside the caller's SQL
/// transaction so ids stay monotonic across completed batches.
pub(crate) fn allocate_tx_id(conn: &Connection) -> Result<i64, StoreError> {
    let id: String = conn.query_row(
        "SELECT value FROM meta WHERE key = 'next_tx_id'",
        [],
        |row| row.get(0),
    )?;
    let id: i64 = id
        .parse()
        .map_err(|_| StoreError::LogRowDecode(format!("next_tx_id not an integer: {id:?}")))?;
    conn.execute(
        "UPDATE meta SET value = ? WHERE key = 'next_tx_id'",
        [(id + 1).to_string()],
    )?;
    Ok(id)
}

/// Append one operation to the log inside the caller's SQL transaction.
pub(crate) fn append_op(
    conn: &Connection,
    tx_id: i64,
    op: OpKind,
    table: &str,
    row_id: &str,
    data: Option<&Map<String, Value>>,
) -> Result<(), StoreError> {
    let data = data.map(|map| Value::Object(map.clone()).to_string());
    conn.execute(
        "INSERT INTO crud_log (tx_id, op, tbl, row_id, data) VALUES (?, ?, ?, ?, ?)",
        params![tx_id, op.as_str(), table, row_id, data],
    )?;
    Ok(())
}

/// Read-side handle over the log, held by the uploader (drain/complete)
/// and consulted by the downloader for the pending-id set.
#[derive(Clone)]
pub(crate) struct MutationLog {
    db: Arc<SharedDb>,
}

impl MutationLog {
    pub(crate) fn new(db: Arc<SharedDb>) -> Self {
        Self { db }
    }

    /// The oldest incomplete batch, or `None` when the log is drained.
    pub(crate) fn next_transaction(&self) -> Result<Option<CrudTransaction>, StoreError> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seq, tx_id, op, tbl, row_id, data FROM crud_log
             WHERE tx_id = (SELECT tx_id FROM crud_log ORDER BY seq ASC LIMIT 1)
             ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut tx_id = None;
        let mut ops = Vec::new();
        for row in rows {
            let (seq, row_tx_id, op, table, row_id, data) = row?;
            let op = OpKind::parse(&op)
                .ok_or_else(|| StoreError::LogRowDecode(format!("unknown op kind: {op:?}")))?;
            let data = match data {
                None => None,
                Some(text) => match serde_json::from_str::<Value>(&text) {
                    Ok(Value::Object(map)) => Some(map),
                    Ok(other) => {
                        return Err(StoreError::LogRowDecode(format!(
                            "op data is not a JSON object: {other}"
                        )));
                    }
                    Err(e) => return Err(StoreError::LogRowDecode(e.to_string())),
                },
            };
            tx_id = Some(row_tx_id);
            ops.push(CrudEntry {
                seq,
                op,
                table,
                row_id,
                data,
            });
        }

        Ok(tx_id.map(|tx_id| CrudTransaction { tx_id, ops }))
    }

    /// Remove a batch after the uploader confirmed every operation in it.
    pub(crate) fn complete(&self, txn: &CrudTransaction) -> Result<(), StoreError> {
        let conn = self.db.lock()?;
        conn.execute("DELETE FROM crud_log WHERE tx_id = ?", [txn.tx_id])?;
        Ok(())
    }

    /// Row ids of `table` with operations still awaiting confirmation.
    /// The reconciler must not overwrite these with remote state.
    pub(crate) fn pending_row_ids(&self, table: &str) -> Result<HashSet<String>, StoreError> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT row_id FROM crud_log WHERE tbl = ?")?;
        let rows = stmt.query_map([table], |row| row.get::<_, String>(0))?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    /// Number of pending operations across all batches.
    pub(crate) fn pending_ops(&self) -> Result<u64, StoreError> {
        let conn = self.db.lock()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM crud_log", [], |row| row.get(0))?;
        Ok(count)
    }
}

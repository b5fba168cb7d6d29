//! Local materialized store over SQLite.
//!
//! Sole owner of UI-visible state. All writes - optimistic UI mutations
//! and downloader reconciliation - serialize through one connection
//! behind a mutex, so no two writes interleave at sub-row granularity.
//! Optimistic writes append to the crud log in the same SQL transaction
//! as the row write; reconciliation writes bypass the log.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam::channel::Sender;
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use serde_json::{Map, Value};
use tracing::warn;

use super::StoreError;
use super::crud_log::{self, MutationLog, OpKind};
use super::schema;
use crate::config::{Config, Limits};
use crate::core::{
    ActorId, CARDS_TABLE, Card, CardFields, CardId, CardPatch, Theme, decode_links_lossy,
    encode_links, now_rfc3339,
};
use crate::paths;
use crate::query::{
    BroadcastError, CardWatch, ChangeBroadcaster, ChangeKind, ChangeOrigin, ChangeSubscription,
    RowChange, WatchLimits,
};

const CARD_COLUMNS: &str = "id, digital_card_name, full_name, first_name, middle_name, \
     last_name, prefix, suffix, accreditations, preferred_name, title, department, company, \
     headline, background_url, avatar_url, contact_type, digital_card_url, notes, qr_code, \
     created_at, is_public, user_id, theme, social_media";

const INSERT_CARD: &str = "INSERT OR REPLACE INTO digital_cards (id, digital_card_name, \
     full_name, first_name, middle_name, last_name, prefix, suffix, accreditations, \
     preferred_name, title, department, company, headline, background_url, avatar_url, \
     contact_type, digital_card_url, notes, qr_code, created_at, is_public, user_id, theme, \
     social_media) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Connection shared between the store and the mutation log handle.
pub(crate) struct SharedDb {
    conn: Mutex<Connection>,
}

impl SharedDb {
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// One entry of an atomic multi-operation batch for [`LocalStore::apply_batch`].
#[derive(Debug, Clone)]
pub enum CardMutation {
    Create(CardFields),
    Update(CardId, CardPatch),
    Delete(CardId),
}

/// Handle to the local materialized store. Cheap to clone.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    db: Arc<SharedDb>,
    broadcaster: ChangeBroadcaster,
    upload_signal: Mutex<Option<Sender<()>>>,
}

impl LocalStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path, limits: &Limits) -> Result<LocalStore, StoreError> {
        let conn = schema::open_database(path)?;
        Ok(LocalStore {
            inner: Arc::new(StoreInner {
                db: Arc::new(SharedDb {
                    conn: Mutex::new(conn),
                }),
                broadcaster: ChangeBroadcaster::new(WatchLimits::from_limits(limits)),
                upload_signal: Mutex::new(None),
            }),
        })
    }

    /// Open the database at its configured default location.
    pub fn open_default(config: &Config) -> Result<LocalStore, StoreError> {
        Self::open(&paths::database_path(config), &config.limits)
    }

    // ---------------------------------------------------------------------
    // Optimistic mutations (row write + crud log append, one transaction)
    // ---------------------------------------------------------------------

    /// Create a card with a fresh client-generated id.
    ///
    /// The row is visible to live queries before any network round trip.
    pub fn create_card(&self, fields: CardFields) -> Result<Card, StoreError> {
        let card = fields.into_card(CardId::generate(), now_rfc3339());
        {
            let mut conn = self.inner.db.lock()?;
            let tx = conn.transaction()?;
            let tx_id = crud_log::allocate_tx_id(&tx)?;
            insert_card_row(&tx, &card)?;
            crud_log::append_op(
                &tx,
                tx_id,
                OpKind::Put,
                CARDS_TABLE,
                card.id.as_str(),
                Some(&card_local_columns(&card)),
            )?;
            tx.commit()?;
        }
        self.notify(ChangeKind::Put, ChangeOrigin::Local, card.id.as_str());
        self.nudge_uploader();
        Ok(card)
    }

    /// Apply a partial update. A patch touching nothing is a no-op.
    pub fn update_card(&self, id: &CardId, patch: &CardPatch) -> Result<(), StoreError> {
        let cols = patch.touched_columns();
        if cols.is_empty() {
            return Ok(());
        }
        {
            let mut conn = self.inner.db.lock()?;
            let tx = conn.transaction()?;
            let affected = update_row(&tx, id.as_str(), &cols)?;
            if affected == 0 {
                return Err(StoreError::CardNotFound(id.clone()));
            }
            let tx_id = crud_log::allocate_tx_id(&tx)?;
            crud_log::append_op(&tx, tx_id, OpKind::Patch, CARDS_TABLE, id.as_str(), Some(&cols))?;
            tx.commit()?;
        }
        self.notify(ChangeKind::Patch, ChangeOrigin::Local, id.as_str());
        self.nudge_uploader();
        Ok(())
    }

    /// Flip the public/private visibility flag.
    pub fn set_visibility(&self, id: &CardId, public: bool) -> Result<(), StoreError> {
        self.update_card(id, &CardPatch::visibility(public))
    }

    /// Delete a card locally and queue the remote delete.
    pub fn delete_card(&self, id: &CardId) -> Result<(), StoreError> {
        {
            let mut conn = self.inner.db.lock()?;
            let tx = conn.transaction()?;
            let affected = tx.execute("DELETE FROM digital_cards WHERE id = ?", [id.as_str()])?;
            if affected == 0 {
                return Err(StoreError::CardNotFound(id.clone()));
            }
            let tx_id = crud_log::allocate_tx_id(&tx)?;
            crud_log::append_op(&tx, tx_id, OpKind::Delete, CARDS_TABLE, id.as_str(), None)?;
            tx.commit()?;
        }
        self.notify(ChangeKind::Delete, ChangeOrigin::Local, id.as_str());
        self.nudge_uploader();
        Ok(())
    }

    /// Apply several mutations as one atomic batch.
    ///
    /// All row writes and log appends share one SQL transaction and one
    /// crud transaction id, so the uploader confirms them as a unit.
    /// Returns the created cards in order.
    pub fn apply_batch(&self, mutations: Vec<CardMutation>) -> Result<Vec<Card>, StoreError> {
        if mutations.is_empty() {
            return Ok(Vec::new());
        }
        let mut created = Vec::new();
        let mut events: Vec<(ChangeKind, String)> = Vec::new();
        {
            let mut conn = self.inner.db.lock()?;
            let tx = conn.transaction()?;
            let tx_id = crud_log::allocate_tx_id(&tx)?;
            for mutation in mutations {
                match mutation {
                    CardMutation::Create(fields) => {
                        let card = fields.into_card(CardId::generate(), now_rfc3339());
                        insert_card_row(&tx, &card)?;
                        crud_log::append_op(
                            &tx,
                            tx_id,
                            OpKind::Put,
                            CARDS_TABLE,
                            card.id.as_str(),
                            Some(&card_local_columns(&card)),
                        )?;
                        events.push((ChangeKind::Put, card.id.as_str().to_string()));
                        created.push(card);
                    }
                    CardMutation::Update(id, patch) => {
                        let cols = patch.touched_columns();
                        if cols.is_empty() {
                            continue;
                        }
                        let affected = update_row(&tx, id.as_str(), &cols)?;
                        if affected == 0 {
                            return Err(StoreError::CardNotFound(id));
                        }
                        crud_log::append_op(
                            &tx,
                            tx_id,
                            OpKind::Patch,
                            CARDS_TABLE,
                            id.as_str(),
                            Some(&cols),
                        )?;
                        events.push((ChangeKind::Patch, id.as_str().to_string()));
                    }
                    CardMutation::Delete(id) => {
                        let affected =
                            tx.execute("DELETE FROM digital_cards WHERE id = ?", [id.as_str()])?;
                        if affected == 0 {
                            return Err(StoreError::CardNotFound(id));
                        }
                        crud_log::append_op(
                            &tx,
                            tx_id,
                            OpKind::Delete,
                            CARDS_TABLE,
                            id.as_str(),
                            None,
                        )?;
                        events.push((ChangeKind::Delete, id.as_str().to_string()));
                    }
                }
            }
            tx.commit()?;
        }
        for (kind, row_id) in events {
            self.notify(kind, ChangeOrigin::Local, &row_id);
        }
        self.nudge_uploader();
        Ok(created)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get_card(&self, id: &CardId) -> Result<Option<Card>, StoreError> {
        let conn = self.inner.db.lock()?;
        let sql = format!("SELECT {CARD_COLUMNS} FROM digital_cards WHERE id = ?");
        let card = conn
            .query_row(&sql, [id.as_str()], card_from_row)
            .optional()?;
        Ok(card)
    }

    /// All cards, newest first - the dashboard's watch query.
    pub fn list_cards(&self) -> Result<Vec<Card>, StoreError> {
        let conn = self.inner.db.lock()?;
        let sql =
            format!("SELECT {CARD_COLUMNS} FROM digital_cards ORDER BY created_at DESC, id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], card_from_row)?;
        let mut cards = Vec::new();
        for row in rows {
            cards.push(row?);
        }
        Ok(cards)
    }

    /// Number of local operations still awaiting remote confirmation.
    /// Zero means the remote store has caught up with every local edit.
    pub fn pending_upload_ops(&self) -> Result<u64, StoreError> {
        self.mutation_log().pending_ops()
    }

    /// How many cards an owner holds. The presentation layer gates card
    /// creation on this (at most 3 per owner); the core does not.
    pub fn card_count_for_owner(&self, owner: &ActorId) -> Result<u64, StoreError> {
        let conn = self.inner.db.lock()?;
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM digital_cards WHERE user_id = ?",
            [owner.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ---------------------------------------------------------------------
    // Live queries
    // ---------------------------------------------------------------------

    /// Live view of all cards, newest first.
    pub fn watch_cards(&self) -> Result<CardWatch, BroadcastError> {
        let subscription = self.inner.broadcaster.subscribe()?;
        Ok(CardWatch::new(self.clone(), None, subscription))
    }

    /// Live view of a single card.
    pub fn watch_card(&self, id: &CardId) -> Result<CardWatch, BroadcastError> {
        let subscription = self.inner.broadcaster.subscribe()?;
        Ok(CardWatch::new(self.clone(), Some(id.clone()), subscription))
    }

    /// Raw change stream, for consumers that want events rather than rows.
    pub fn subscribe_changes(&self) -> Result<ChangeSubscription, BroadcastError> {
        self.inner.broadcaster.subscribe()
    }

    // ---------------------------------------------------------------------
    // Sync-side entry points
    // ---------------------------------------------------------------------

    pub(crate) fn mutation_log(&self) -> MutationLog {
        MutationLog::new(Arc::clone(&self.inner.db))
    }

    pub(crate) fn set_upload_signal(&self, signal: Sender<()>) {
        if let Ok(mut guard) = self.inner.upload_signal.lock() {
            *guard = Some(signal);
        }
    }

    /// Replace a row with authoritative remote state, bypassing the log.
    ///
    /// Pending local mutations win: the check runs under the same write
    /// lock that mutations append through, so a row queued between the
    /// caller's pending-set sample and this write is still protected.
    /// Returns false when nothing was written (pending or already equal).
    pub(crate) fn apply_remote_card(&self, card: &Card) -> Result<bool, StoreError> {
        let changed = {
            let conn = self.inner.db.lock()?;
            if row_has_pending_ops(&conn, card.id.as_str())? {
                return Ok(false);
            }
            let sql = format!("SELECT {CARD_COLUMNS} FROM digital_cards WHERE id = ?");
            let existing = conn
                .query_row(&sql, [card.id.as_str()], card_from_row)
                .optional()?;
            if existing.as_ref() == Some(card) {
                false
            } else {
                insert_card_row(&conn, card)?;
                true
            }
        };
        if changed {
            self.notify(ChangeKind::Put, ChangeOrigin::Remote, card.id.as_str());
        }
        Ok(changed)
    }

    /// Remove local rows the remote no longer has, sparing rows with
    /// pending mutations (a freshly created card not yet uploaded must
    /// survive the pull). Returns the removed row ids.
    pub(crate) fn remove_rows_absent_remote(
        &self,
        remote_ids: &HashSet<String>,
    ) -> Result<Vec<String>, StoreError> {
        let mut removed = Vec::new();
        {
            let conn = self.inner.db.lock()?;
            let mut stmt = conn.prepare("SELECT id FROM digital_cards")?;
            let local_ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for id in local_ids {
                if remote_ids.contains(&id) || row_has_pending_ops(&conn, &id)? {
                    continue;
                }
                conn.execute("DELETE FROM digital_cards WHERE id = ?", [id.as_str()])?;
                removed.push(id);
            }
        }
        for id in &removed {
            self.notify(ChangeKind::Delete, ChangeOrigin::Remote, id);
        }
        Ok(removed)
    }

    fn notify(&self, kind: ChangeKind, origin: ChangeOrigin, row_id: &str) {
        let change = RowChange {
            table: CARDS_TABLE.to_string(),
            row_id: row_id.to_string(),
            kind,
            origin,
        };
        if let Err(err) = self.inner.broadcaster.publish(change) {
            warn!(%err, "failed to publish row change");
        }
    }

    fn nudge_uploader(&self) {
        if let Ok(guard) = self.inner.upload_signal.lock()
            && let Some(signal) = guard.as_ref()
        {
            // Full just means a wake-up is already queued.
            let _ = signal.try_send(());
        }
    }
}

// -------------------------------------------------------------------------
// Row encode/decode
// -------------------------------------------------------------------------

fn row_has_pending_ops(conn: &Connection, row_id: &str) -> Result<bool, StoreError> {
    let queued: u64 = conn.query_row(
        "SELECT COUNT(*) FROM crud_log WHERE tbl = ? AND row_id = ?",
        [CARDS_TABLE, row_id],
        |row| row.get(0),
    )?;
    Ok(queued > 0)
}

fn insert_card_row(conn: &Connection, card: &Card) -> Result<(), StoreError> {
    let text = |v: &Option<String>| -> rusqlite::types::Value {
        match v {
            None => rusqlite::types::Value::Null,
            Some(s) => rusqlite::types::Value::Text(s.clone()),
        }
    };
    let params: Vec<rusqlite::types::Value> = vec![
        rusqlite::types::Value::Text(card.id.as_str().to_string()),
        text(&card.digital_card_name),
        text(&card.full_name),
        text(&card.first_name),
        text(&card.middle_name),
        text(&card.last_name),
        text(&card.prefix),
        text(&card.suffix),
        text(&card.accreditations),
        text(&card.preferred_name),
        text(&card.title),
        text(&card.department),
        text(&card.company),
        text(&card.headline),
        text(&card.background_url),
        text(&card.avatar_url),
        text(&card.contact_type),
        text(&card.digital_card_url),
        text(&card.notes),
        text(&card.qr_code),
        text(&card.created_at),
        rusqlite::types::Value::Integer(i64::from(card.is_public)),
        match &card.user_id {
            None => rusqlite::types::Value::Null,
            Some(actor) => rusqlite::types::Value::Text(actor.as_str().to_string()),
        },
        rusqlite::types::Value::Text(card.theme.as_str().to_string()),
        rusqlite::types::Value::Text(encode_links(&card.social_media)),
    ];
    conn.execute(INSERT_CARD, params_from_iter(params))?;
    Ok(())
}

fn update_row(
    conn: &Connection,
    id: &str,
    cols: &Map<String, Value>,
) -> Result<usize, StoreError> {
    let mut sql = String::from("UPDATE digital_cards SET ");
    let mut params: Vec<rusqlite::types::Value> = Vec::with_capacity(cols.len() + 1);
    for (i, (name, value)) in cols.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('"');
        sql.push_str(name);
        sql.push_str("\" = ?");
        params.push(sql_value(value));
    }
    sql.push_str(" WHERE id = ?");
    params.push(rusqlite::types::Value::Text(id.to_string()));
    let affected = conn.execute(&sql, params_from_iter(params))?;
    Ok(affected)
}

fn sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => rusqlite::types::Value::Integer(i),
            None => rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let theme: Option<String> = row.get(23)?;
    let social: Option<String> = row.get(24)?;
    Ok(Card {
        id: CardId::new(row.get::<_, String>(0)?),
        digital_card_name: row.get(1)?,
        full_name: row.get(2)?,
        first_name: row.get(3)?,
        middle_name: row.get(4)?,
        last_name: row.get(5)?,
        prefix: row.get(6)?,
        suffix: row.get(7)?,
        accreditations: row.get(8)?,
        preferred_name: row.get(9)?,
        title: row.get(10)?,
        department: row.get(11)?,
        company: row.get(12)?,
        headline: row.get(13)?,
        background_url: row.get(14)?,
        avatar_url: row.get(15)?,
        contact_type: row.get(16)?,
        digital_card_url: row.get(17)?,
        notes: row.get(18)?,
        qr_code: row.get(19)?,
        created_at: row.get(20)?,
        is_public: row.get::<_, Option<i64>>(21)?.is_some_and(|v| v != 0),
        user_id: row.get::<_, Option<String>>(22)?.map(ActorId::new),
        theme: theme
            .as_deref()
            .and_then(Theme::parse)
            .unwrap_or(Theme::Light),
        social_media: decode_links_lossy(social.as_deref()),
    })
}

/// All non-id columns of a card in local representation, for PUT log data.
fn card_local_columns(card: &Card) -> Map<String, Value> {
    let mut map = Map::new();
    let mut text = |name: &str, v: &Option<String>| {
        map.insert(
            name.to_string(),
            v.as_ref()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
        );
    };
    text("digital_card_name", &card.digital_card_name);
    text("full_name", &card.full_name);
    text("first_name", &card.first_name);
    text("middle_name", &card.middle_name);
    text("last_name", &card.last_name);
    text("prefix", &card.prefix);
    text("suffix", &card.suffix);
    text("accreditations", &card.accreditations);
    text("preferred_name", &card.preferred_name);
    text("title", &card.title);
    text("department", &card.department);
    text("company", &card.company);
    text("headline", &card.headline);
    text("background_url", &card.background_url);
    text("avatar_url", &card.avatar_url);
    text("contact_type", &card.contact_type);
    text("digital_card_url", &card.digital_card_url);
    text("notes", &card.notes);
    text("qr_code", &card.qr_code);
    text("created_at", &card.created_at);
    map.insert(
        "is_public".to_string(),
        Value::from(i64::from(card.is_public)),
    );
    map.insert(
        "user_id".to_string(),
        card.user_id
            .as_ref()
            .map(|a| Value::String(a.as_str().to_string()))
            .unwrap_or(Value::Null),
    );
    map.insert(
        "theme".to_string(),
        Value::String(card.theme.as_str().to_string()),
    );
    map.insert(
        "social_media".to_string(),
        Value::String(encode_links(&card.social_media)),
    );
    map
}

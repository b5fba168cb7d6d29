//! Shared fakes for exercising the sync engine without a network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cardsync::config::Config;
use cardsync::sync::RemoteRow;
use cardsync::{ActorId, AuthProvider, RemoteError, RemoteStore, Session};
use serde_json::Value;

/// In-memory stand-in for the hosted relational store.
///
/// `fetch_one` models the anonymous visitor path: row-level security lets
/// a visitor read a row only when it is public.
#[derive(Default)]
pub struct FakeRemote {
    tables: Mutex<BTreeMap<String, BTreeMap<String, RemoteRow>>>,
    offline: AtomicBool,
    /// Reject this many upcoming write calls before touching state.
    fail_writes: AtomicUsize,
    /// Apply this many upcoming upserts but still report failure,
    /// simulating a lost success acknowledgement.
    lose_acks: AtomicUsize,
    pub upsert_calls: AtomicUsize,
    /// Flat record of applied writes, e.g. `UPDATE c1 title=Y`.
    ops_log: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, count: usize) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    pub fn lose_acks(&self, count: usize) {
        self.lose_acks.store(count, Ordering::SeqCst);
    }

    pub fn row(&self, table: &str, id: &str) -> Option<RemoteRow> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    pub fn rows(&self, table: &str) -> Vec<RemoteRow> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Seed remote state directly, as if another device wrote it.
    pub fn insert_row(&self, table: &str, row: RemoteRow) {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .expect("seed row needs an id")
            .to_string();
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    pub fn remove_row(&self, table: &str, id: &str) {
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.remove(id);
        }
    }

    pub fn applied_ops(&self) -> Vec<String> {
        self.ops_log.lock().unwrap().clone()
    }

    fn gate(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable {
                message: "simulated outage".to_string(),
            });
        }
        if self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RemoteError::Rejected {
                message: "simulated rejection".to_string(),
            });
        }
        Ok(())
    }

    fn maybe_lose_ack(&self) -> Result<(), RemoteError> {
        if self
            .lose_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RemoteError::Unavailable {
                message: "acknowledgement lost".to_string(),
            });
        }
        Ok(())
    }
}

impl RemoteStore for FakeRemote {
    fn upsert(&self, table: &str, row: &RemoteRow) -> Result<(), RemoteError> {
        self.gate()?;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let Some(id) = row.get("id").and_then(Value::as_str) else {
            return Err(RemoteError::Rejected {
                message: "upsert requires an id".to_string(),
            });
        };
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), row.clone());
        self.ops_log.lock().unwrap().push(format!("PUT {id}"));
        self.maybe_lose_ack()
    }

    fn update(&self, table: &str, id: &str, fields: &RemoteRow) -> Result<(), RemoteError> {
        self.gate()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(id))
        {
            for (key, value) in fields {
                row.insert(key.clone(), value.clone());
            }
            let cols: Vec<&str> = fields.keys().map(String::as_str).collect();
            self.ops_log
                .lock()
                .unwrap()
                .push(format!("PATCH {id} {}", cols.join(",")));
        }
        // Updating an absent row matches zero rows and succeeds.
        Ok(())
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.gate()?;
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.remove(id);
        }
        self.ops_log.lock().unwrap().push(format!("DELETE {id}"));
        Ok(())
    }

    fn fetch_one(&self, table: &str, id: &str) -> Result<Option<RemoteRow>, RemoteError> {
        self.gate()?;
        let row = self.row(table, id);
        Ok(row.filter(|row| row.get("is_public") == Some(&Value::Bool(true))))
    }

    fn pull(&self, table: &str) -> Result<Vec<RemoteRow>, RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable {
                message: "simulated outage".to_string(),
            });
        }
        Ok(self.rows(table))
    }
}

/// Switchable fake auth provider.
pub struct FakeAuth {
    session: Mutex<Option<Session>>,
}

impl FakeAuth {
    pub fn signed_in(actor: &str) -> Arc<Self> {
        let auth = Self {
            session: Mutex::new(None),
        };
        auth.sign_in(actor);
        Arc::new(auth)
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(None),
        })
    }

    pub fn sign_in(&self, actor: &str) {
        *self.session.lock().unwrap() = Some(Session {
            actor: ActorId::new(actor),
            access_token: "test-token".to_string(),
            expires_at: None,
        });
    }
}

impl AuthProvider for FakeAuth {
    fn session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }
}

/// Config with timings tightened for tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.upload.debounce_ms = 5;
    config.upload.backoff_base_ms = 10;
    config.upload.backoff_max_ms = 50;
    config.download.poll_interval_ms = 25;
    config
}

/// Poll `pred` until it holds or the timeout elapses.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

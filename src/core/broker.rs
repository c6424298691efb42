use crate::core::db;
use crate::core::error::LedgerError;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// The DB Broker is the "Thin Waist" for entity store access.
///
/// Every mutation goes through `with_conn`, which opens a WAL connection,
/// runs the closure and appends one line to the flat trail. Mutations that
/// must be serialized per session or per goal take a keyed lock first via
/// `with_lock`.
pub struct DbBroker {
    db_path: PathBuf,
    trail_path: Option<PathBuf>,
    locks: KeyedLocks,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub db_id: String,
    pub subject: Option<String>,
    pub status: String,
}

impl DbBroker {
    pub fn new(store: &Store, trail_enabled: bool) -> Self {
        Self {
            db_path: store.entity_db_path(),
            trail_path: trail_enabled.then(|| store.trail_path()),
            locks: KeyedLocks::default(),
        }
    }

    /// Execute a mutation with a fresh connection and record it on the trail.
    pub fn with_conn<F, R>(
        &self,
        actor: &str,
        op_name: &str,
        subject: Option<&str>,
        f: F,
    ) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut Connection) -> Result<R, LedgerError>,
    {
        let mut conn = db::db_connect(&self.db_path)?;
        let result = f(&mut conn);

        let status = if result.is_ok() { "success" } else { "error" };
        self.trail(actor, op_name, subject, status);

        result
    }

    /// Read-only access; not recorded on the trail.
    pub fn read<F, R>(&self, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, LedgerError>,
    {
        let conn = db::db_connect(&self.db_path)?;
        f(&conn)
    }

    /// Run `f` inside the exclusive scope for `key` (e.g. `session:S_...`).
    pub fn with_lock<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let slot = self.locks.slot(key);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Append to the flat trail. Pure side log: failures are swallowed.
    pub fn trail(&self, actor: &str, op: &str, subject: Option<&str>, status: &str) {
        let Some(path) = &self.trail_path else {
            return;
        };
        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            db_id: self
                .db_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            subject: subject.map(|s| s.to_string()),
            status: status.to_string(),
        };
        if let Err(e) = append_trail_line(path, &ev) {
            debug!(error = %e, op, "broker trail append skipped");
        }
    }
}

fn append_trail_line(path: &Path, ev: &BrokerEvent) -> Result<(), LedgerError> {
    let mut line = serde_json::to_string(ev)?;
    line.push('\n');
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    // One write per event keeps concurrent appenders from interleaving.
    f.write_all(line.as_bytes())?;
    Ok(())
}

/// Lazily created mutex per key. Keys are never evicted; a store sees at
/// most one entry per session and goal it touches in this process.
#[derive(Default)]
struct KeyedLocks {
    inner: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(key.to_string()).or_default().clone()
    }
}

pub fn read_trail(store: &Store) -> Result<Vec<BrokerEvent>, LedgerError> {
    use std::io::{BufRead, BufReader};
    let path = store.trail_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let f = std::fs::File::open(&path)?;
    let mut out = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

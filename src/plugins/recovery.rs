//! Disaster recovery: rebuild an entity database from the audit archive.
//!
//! The latest archived version of each session, goal, subtask and checkpoint
//! is replayed into a fresh store in archive sequence order. Records whose
//! parent did not make it into the archive are skipped and reported.

use crate::core::db;
use crate::core::error::LedgerError;
use crate::core::store::Store;
use crate::plugins::archive::{self, AuditArchive, Namespace};
use crate::plugins::checkpoint::{self, Checkpoint};
use crate::plugins::goals::{self, Goal, Subtask};
use crate::plugins::session::{self, Session};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildSummary {
    pub sessions: usize,
    pub goals: usize,
    pub subtasks: usize,
    pub checkpoints: usize,
    pub skipped: Vec<String>,
}

fn decode<T: DeserializeOwned>(
    namespace: Namespace,
    entity_id: &str,
    payload: JsonValue,
    skipped: &mut Vec<String>,
) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(v) => Some(v),
        Err(e) => {
            skipped.push(format!("{} {}: undecodable ({})", namespace.entity_type(), entity_id, e));
            None
        }
    }
}

fn exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, LedgerError> {
    let n: i64 = conn.query_row(sql, [id], |row| row.get(0))?;
    Ok(n > 0)
}

pub fn rebuild_from_archive(
    archive: &dyn AuditArchive,
    target: &Store,
) -> Result<RebuildSummary, LedgerError> {
    db::initialize_ledger_db(target)?;
    let mut conn = db::db_connect(&target.entity_db_path())?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: i64 = tx.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
    if existing > 0 {
        return Err(LedgerError::ValidationError(format!(
            "rebuild target {} is not empty",
            target.root.display()
        )));
    }

    let mut summary = RebuildSummary::default();

    for (entry, payload) in archive::latest_per_entity(archive, Namespace::Sessions)? {
        let Some(s) = decode::<Session>(Namespace::Sessions, &entry.entity_id, payload, &mut summary.skipped) else {
            continue;
        };
        session::insert_session(&tx, &s)?;
        summary.sessions += 1;
    }

    for (entry, payload) in archive::latest_per_entity(archive, Namespace::Goals)? {
        let Some(g) = decode::<Goal>(Namespace::Goals, &entry.entity_id, payload, &mut summary.skipped) else {
            continue;
        };
        if !exists(&tx, "SELECT COUNT(*) FROM sessions WHERE session_id = ?1", &g.session_id)? {
            summary
                .skipped
                .push(format!("goal {}: owner session {} not archived", g.goal_id, g.session_id));
            continue;
        }
        goals::insert_goal(&tx, &g)?;
        summary.goals += 1;
    }

    for (entry, payload) in archive::latest_per_entity(archive, Namespace::Subtasks)? {
        let Some(st) = decode::<Subtask>(Namespace::Subtasks, &entry.entity_id, payload, &mut summary.skipped) else {
            continue;
        };
        if !exists(&tx, "SELECT COUNT(*) FROM goals WHERE goal_id = ?1", &st.goal_id)? {
            summary
                .skipped
                .push(format!("subtask {}: goal {} not archived", st.subtask_id, st.goal_id));
            continue;
        }
        goals::insert_subtask(&tx, &st, &entry.ts)?;
        summary.subtasks += 1;
    }

    // Insertion order drives phase history, so restore write order: creation
    // time first, archive seq within the same second. A retried mirror that
    // landed late in the archive still sorts by its creation time.
    let mut checkpoints = Vec::new();
    for (entry, payload) in archive::latest_per_entity(archive, Namespace::Checkpoints)? {
        if let Some(cp) = decode::<Checkpoint>(Namespace::Checkpoints, &entry.entity_id, payload, &mut summary.skipped) {
            checkpoints.push((entry.seq, cp));
        }
    }
    checkpoints.sort_by(|(seq_a, a), (seq_b, b)| {
        a.created_at
            .len()
            .cmp(&b.created_at.len())
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then(seq_a.cmp(seq_b))
    });
    for (_, cp) in checkpoints {
        if !exists(&tx, "SELECT COUNT(*) FROM sessions WHERE session_id = ?1", &cp.session_id)? {
            summary.skipped.push(format!(
                "checkpoint {}: session {} not archived",
                cp.checkpoint_id, cp.session_id
            ));
            continue;
        }
        checkpoint::insert_checkpoint(&tx, &cp)?;
        summary.checkpoints += 1;
    }

    tx.commit()?;
    info!(
        sessions = summary.sessions,
        goals = summary.goals,
        checkpoints = summary.checkpoints,
        skipped = summary.skipped.len(),
        "entity store rebuilt from archive"
    );
    Ok(summary)
}

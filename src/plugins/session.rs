use crate::core::error::LedgerError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub agent_id: String,
    pub created_at: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(3)?;
    Ok(Session {
        session_id: row.get(0)?,
        agent_id: row.get(1)?,
        created_at: row.get(2)?,
        status: if status == "ended" {
            SessionStatus::Ended
        } else {
            SessionStatus::Active
        },
        ended_at: row.get(4)?,
    })
}

pub(crate) fn insert_session(conn: &Connection, session: &Session) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO sessions(session_id, agent_id, created_at, status, ended_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![
            session.session_id,
            session.agent_id,
            session.created_at,
            session.status.as_str(),
            session.ended_at
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, session_id: &str) -> Result<Option<Session>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT session_id, agent_id, created_at, status, ended_at
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            row_to_session,
        )
        .optional()?)
}

pub(crate) fn require_session(conn: &Connection, session_id: &str) -> Result<Session, LedgerError> {
    get_session(conn, session_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("session {}", session_id)))
}

/// Flip status to `ended`. Ending an ended session is a no-op.
pub(crate) fn mark_ended(conn: &Connection, session_id: &str, ts: &str) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE sessions SET status = 'ended', ended_at = ?2
         WHERE session_id = ?1 AND status = 'active'",
        params![session_id, ts],
    )?;
    Ok(())
}

pub fn list_sessions(conn: &Connection, agent_id: Option<&str>) -> Result<Vec<Session>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT session_id, agent_id, created_at, status, ended_at FROM sessions
         WHERE (?1 IS NULL OR agent_id = ?1)
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map(params![agent_id], row_to_session)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Most recently created active session for an agent.
pub fn current_for_agent(conn: &Connection, agent_id: &str) -> Result<Option<Session>, LedgerError> {
    Ok(conn
        .query_row(
            "SELECT session_id, agent_id, created_at, status, ended_at FROM sessions
             WHERE agent_id = ?1 AND status = 'active'
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            params![agent_id],
            row_to_session,
        )
        .optional()?)
}

use crate::core::error::LedgerError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The epistemic vectors a checkpoint may carry.
pub const CANONICAL_VECTORS: &[&str] = &[
    "engagement",
    "know",
    "do",
    "context",
    "clarity",
    "coherence",
    "signal",
    "density",
    "state",
    "change",
    "completion",
    "impact",
    "uncertainty",
];

pub type Vectors = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Preflight,
    Check,
    Postflight,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preflight => "PREFLIGHT",
            Phase::Check => "CHECK",
            Phase::Postflight => "POSTFLIGHT",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Phase::Preflight => 0,
            Phase::Check => 1,
            Phase::Postflight => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PREFLIGHT" => Ok(Phase::Preflight),
            "CHECK" => Ok(Phase::Check),
            "POSTFLIGHT" => Ok(Phase::Postflight),
            other => Err(LedgerError::ValidationError(format!(
                "Invalid phase: {}. Must be one of: PREFLIGHT, CHECK, POSTFLIGHT",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub session_id: String,
    pub phase: Phase,
    pub round: u32,
    pub vectors: Vectors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    pub created_at: String,
}

/// Reject unknown names, empty sets, and values outside [0, 1].
pub fn validate_vectors(vectors: &Vectors) -> Result<(), LedgerError> {
    if vectors.is_empty() {
        return Err(LedgerError::ValidationError(
            "vectors must contain at least one metric".into(),
        ));
    }
    for (name, value) in vectors {
        if !CANONICAL_VECTORS.contains(&name.as_str()) {
            return Err(LedgerError::ValidationError(format!(
                "unknown vector '{}'",
                name
            )));
        }
        if !value.is_finite() || !(0.0..=1.0).contains(value) {
            return Err(LedgerError::ValidationError(format!(
                "vector '{}' = {} is outside [0.0, 1.0]",
                name, value
            )));
        }
    }
    Ok(())
}

/// Parse `know=0.5,uncertainty=0.4` or a JSON object into vectors.
pub fn parse_vectors(input: &str) -> Result<Vectors, LedgerError> {
    let trimmed = input.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| LedgerError::ValidationError(format!("vectors: {}", e)));
    }
    let mut out = Vectors::new();
    for pair in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            LedgerError::ValidationError(format!("expected name=value, got '{}'", pair))
        })?;
        let value: f64 = value.trim().parse().map_err(|_| {
            LedgerError::ValidationError(format!("vector '{}' is not a number", name.trim()))
        })?;
        out.insert(name.trim().to_string(), value);
    }
    Ok(out)
}

const CHECKPOINT_COLUMNS: &str =
    "checkpoint_id, session_id, phase, round, vectors, metadata, created_at";

const CHECKPOINT_ORDER: &str = "CASE phase WHEN 'PREFLIGHT' THEN 0 WHEN 'CHECK' THEN 1 ELSE 2 END, round, created_at, rowid";

fn row_to_checkpoint(row: &Row<'_>) -> rusqlite::Result<(Checkpoint, String, Option<String>)> {
    let phase: String = row.get(2)?;
    let phase = phase.parse::<Phase>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok((
        Checkpoint {
            checkpoint_id: row.get(0)?,
            session_id: row.get(1)?,
            phase,
            round: row.get(3)?,
            vectors: Vectors::new(),
            metadata: None,
            created_at: row.get(6)?,
        },
        row.get(4)?,
        row.get(5)?,
    ))
}

fn hydrate(
    (mut cp, vectors, metadata): (Checkpoint, String, Option<String>),
) -> Result<Checkpoint, LedgerError> {
    cp.vectors = serde_json::from_str(&vectors)?;
    cp.metadata = metadata.map(|m| serde_json::from_str(&m)).transpose()?;
    Ok(cp)
}

pub(crate) fn insert_checkpoint(conn: &Connection, cp: &Checkpoint) -> Result<(), LedgerError> {
    let vectors = serde_json::to_string(&cp.vectors)?;
    let metadata = cp.metadata.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        &format!(
            "INSERT INTO checkpoints({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            CHECKPOINT_COLUMNS
        ),
        params![
            cp.checkpoint_id,
            cp.session_id,
            cp.phase.as_str(),
            cp.round,
            vectors,
            metadata,
            cp.created_at
        ],
    )?;
    Ok(())
}

pub fn get_checkpoint(conn: &Connection, checkpoint_id: &str) -> Result<Option<Checkpoint>, LedgerError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM checkpoints WHERE checkpoint_id = ?1",
                CHECKPOINT_COLUMNS
            ),
            params![checkpoint_id],
            row_to_checkpoint,
        )
        .optional()?;
    raw.map(hydrate).transpose()
}

/// Latest checkpoint for a session+phase (highest round).
pub fn latest_for_phase(
    conn: &Connection,
    session_id: &str,
    phase: Phase,
) -> Result<Option<Checkpoint>, LedgerError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM checkpoints WHERE session_id = ?1 AND phase = ?2
                 ORDER BY round DESC, created_at DESC, rowid DESC LIMIT 1",
                CHECKPOINT_COLUMNS
            ),
            params![session_id, phase.as_str()],
            row_to_checkpoint,
        )
        .optional()?;
    raw.map(hydrate).transpose()
}

/// All checkpoints for a session ordered by phase, then round, then time.
pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Checkpoint>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM checkpoints WHERE session_id = ?1 ORDER BY {}",
        CHECKPOINT_COLUMNS, CHECKPOINT_ORDER
    ))?;
    let rows = stmt.query_map(params![session_id], row_to_checkpoint)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(hydrate(r?)?);
    }
    Ok(out)
}

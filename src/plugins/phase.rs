//! Phase state machine for checkpoint sequencing.
//!
//! `NONE -> PREFLIGHT_DONE -> (CHECK_DONE)* -> [ACT] -> POSTFLIGHT_DONE`
//!
//! ACT is work performed between checkpoints and never recorded as one, so
//! the machine only observes PREFLIGHT, CHECK and POSTFLIGHT. POSTFLIGHT is
//! not terminal here: whether a finished session may take more checkpoints
//! is the caller's call.

use crate::core::error::LedgerError;
use crate::plugins::checkpoint::Phase;
use rusqlite::{Connection, params};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerState {
    None,
    PreflightDone,
    CheckDone,
    PostflightDone,
}

impl LedgerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerState::None => "none",
            LedgerState::PreflightDone => "PREFLIGHT_DONE",
            LedgerState::CheckDone => "CHECK_DONE",
            LedgerState::PostflightDone => "POSTFLIGHT_DONE",
        }
    }
}

/// What the machine needs to know about a session's recorded checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseHistory {
    /// Phase of the most recently recorded checkpoint.
    pub last_phase: Option<Phase>,
    pub has_preflight: bool,
    /// Highest round seen per phase, indexed by `Phase::index`.
    pub last_rounds: [Option<u32>; 3],
}

impl PhaseHistory {
    pub fn state(&self) -> LedgerState {
        match self.last_phase {
            None => LedgerState::None,
            Some(Phase::Preflight) => LedgerState::PreflightDone,
            Some(Phase::Check) => LedgerState::CheckDone,
            Some(Phase::Postflight) => LedgerState::PostflightDone,
        }
    }

    pub fn last_round(&self, phase: Phase) -> Option<u32> {
        self.last_rounds[phase.index()]
    }

    /// Fold one recorded checkpoint into the history (insertion order).
    pub fn record(&mut self, phase: Phase, round: u32) {
        self.last_phase = Some(phase);
        if phase == Phase::Preflight {
            self.has_preflight = true;
        }
        let slot = &mut self.last_rounds[phase.index()];
        *slot = Some(slot.map_or(round, |r| r.max(round)));
    }
}

pub fn load_history(conn: &Connection, session_id: &str) -> Result<PhaseHistory, LedgerError> {
    let mut stmt =
        conn.prepare("SELECT phase, round FROM checkpoints WHERE session_id = ?1 ORDER BY rowid")?;
    let rows = stmt.query_map(params![session_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
    })?;
    let mut history = PhaseHistory::default();
    for r in rows {
        let (phase, round) = r?;
        history.record(phase.parse()?, round);
    }
    Ok(history)
}

/// Accept or reject a checkpoint of `phase`/`round` given the history.
pub fn validate_transition(
    session_id: &str,
    history: &PhaseHistory,
    phase: Phase,
    round: u32,
) -> Result<(), LedgerError> {
    if round == 0 {
        return Err(LedgerError::ValidationError(
            "round must be a positive integer".into(),
        ));
    }

    let needs_preflight = matches!(phase, Phase::Check | Phase::Postflight);
    if needs_preflight && !history.has_preflight {
        return Err(LedgerError::InvalidPhaseSequence {
            session_id: session_id.to_string(),
            phase: phase.to_string(),
            expected: Phase::Preflight.to_string(),
            found: history.state().as_str().to_string(),
        });
    }

    if let Some(last) = history.last_round(phase) {
        if round <= last {
            return Err(LedgerError::InvalidPhaseSequence {
                session_id: session_id.to_string(),
                phase: phase.to_string(),
                expected: format!("round > {}", last),
                found: format!("round {}", round),
            });
        }
    }

    Ok(())
}

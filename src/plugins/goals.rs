//! Goals, subtasks and their append-only histories.
//!
//! A goal's `lineage` and a subtask's `findings`/`unknowns`/`dead_ends` live
//! in their own tables keyed by `(owner, seq)`, so appending is an INSERT and
//! the storage guards reject any update or delete of earlier entries.

use crate::core::error::LedgerError;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeScores {
    pub breadth: f64,
    pub duration: f64,
    pub coordination: f64,
}

impl ScopeScores {
    pub fn validate(&self) -> Result<(), LedgerError> {
        for (name, v) in [
            ("breadth", self.breadth),
            ("duration", self.duration),
            ("coordination", self.coordination),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(LedgerError::ValidationError(format!(
                    "scope.{} = {} is outside [0.0, 1.0]",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::InProgress => "in_progress",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for GoalStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(GoalStatus::InProgress),
            "completed" => Ok(GoalStatus::Completed),
            "abandoned" => Ok(GoalStatus::Abandoned),
            other => Err(LedgerError::ValidationError(format!(
                "Invalid goal status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub agent_id: String,
    pub action: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub session_id: String,
    pub objective: String,
    pub scope: ScopeScores,
    pub status: GoalStatus,
    pub lineage: Vec<LineageEntry>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Critical,
    High,
    Medium,
    Low,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Critical => "critical",
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }
}

impl FromStr for Importance {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Importance::Critical),
            "high" => Ok(Importance::High),
            "medium" => Ok(Importance::Medium),
            "low" => Ok(Importance::Low),
            other => Err(LedgerError::ValidationError(format!(
                "Invalid importance: {}. Must be one of: critical, high, medium, low",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Finding,
    Unknown,
    DeadEnd,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Finding => "finding",
            LogKind::Unknown => "unknown",
            LogKind::DeadEnd => "dead_end",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub subtask_id: String,
    pub goal_id: String,
    pub description: String,
    pub importance: Importance,
    pub findings: Vec<String>,
    pub unknowns: Vec<String>,
    pub dead_ends: Vec<String>,
    pub created_at: String,
}

impl Subtask {
    pub fn log(&self, kind: LogKind) -> &[String] {
        match kind {
            LogKind::Finding => &self.findings,
            LogKind::Unknown => &self.unknowns,
            LogKind::DeadEnd => &self.dead_ends,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalNode {
    pub goal: Goal,
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalTree {
    pub session_id: String,
    pub goals: Vec<GoalNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenUnknown {
    pub goal_id: String,
    pub subtask_id: String,
    pub subtask: String,
    pub unknown: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownsSummary {
    pub session_id: String,
    pub total: usize,
    pub goals_with_unknowns: usize,
    pub unknowns: Vec<OpenUnknown>,
}

// --- Entity store access ---

const GOAL_COLUMNS: &str = "goal_id, session_id, objective, scope_breadth, scope_duration, scope_coordination, status, created_at, updated_at";

fn row_to_goal(row: &Row<'_>) -> rusqlite::Result<(Goal, String)> {
    Ok((
        Goal {
            goal_id: row.get(0)?,
            session_id: row.get(1)?,
            objective: row.get(2)?,
            scope: ScopeScores {
                breadth: row.get(3)?,
                duration: row.get(4)?,
                coordination: row.get(5)?,
            },
            status: GoalStatus::InProgress,
            lineage: Vec::new(),
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        },
        row.get(6)?,
    ))
}

fn hydrate_goal(conn: &Connection, (mut goal, status): (Goal, String)) -> Result<Goal, LedgerError> {
    goal.status = status.parse()?;
    goal.lineage = load_lineage(conn, &goal.goal_id)?;
    Ok(goal)
}

fn load_lineage(conn: &Connection, goal_id: &str) -> Result<Vec<LineageEntry>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT agent_id, action, ts FROM goal_lineage WHERE goal_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![goal_id], |row| {
        Ok(LineageEntry {
            agent_id: row.get(0)?,
            action: row.get(1)?,
            timestamp: row.get(2)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Insert a goal row together with all of its lineage entries.
pub(crate) fn insert_goal(conn: &Connection, goal: &Goal) -> Result<(), LedgerError> {
    conn.execute(
        &format!(
            "INSERT INTO goals({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            GOAL_COLUMNS
        ),
        params![
            goal.goal_id,
            goal.session_id,
            goal.objective,
            goal.scope.breadth,
            goal.scope.duration,
            goal.scope.coordination,
            goal.status.as_str(),
            goal.created_at,
            goal.updated_at
        ],
    )?;
    for entry in &goal.lineage {
        append_lineage(conn, &goal.goal_id, entry)?;
    }
    Ok(())
}

pub fn get_goal(conn: &Connection, goal_id: &str) -> Result<Option<Goal>, LedgerError> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM goals WHERE goal_id = ?1", GOAL_COLUMNS),
            params![goal_id],
            row_to_goal,
        )
        .optional()?;
    raw.map(|r| hydrate_goal(conn, r)).transpose()
}

pub(crate) fn require_goal(conn: &Connection, goal_id: &str) -> Result<Goal, LedgerError> {
    get_goal(conn, goal_id)?.ok_or_else(|| LedgerError::NotFound(format!("goal {}", goal_id)))
}

pub fn goals_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Goal>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM goals WHERE session_id = ?1 ORDER BY created_at, rowid",
        GOAL_COLUMNS
    ))?;
    let rows = stmt.query_map(params![session_id], row_to_goal)?;
    let mut raw = Vec::new();
    for r in rows {
        raw.push(r?);
    }
    raw.into_iter().map(|r| hydrate_goal(conn, r)).collect()
}

pub(crate) fn append_lineage(
    conn: &Connection,
    goal_id: &str,
    entry: &LineageEntry,
) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO goal_lineage(goal_id, seq, agent_id, action, ts)
         VALUES(?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM goal_lineage WHERE goal_id = ?1), ?2, ?3, ?4)",
        params![goal_id, entry.agent_id, entry.action, entry.timestamp],
    )?;
    Ok(())
}

pub(crate) fn set_goal_owner(
    conn: &Connection,
    goal_id: &str,
    session_id: &str,
    ts: &str,
) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE goals SET session_id = ?2, updated_at = ?3 WHERE goal_id = ?1",
        params![goal_id, session_id, ts],
    )?;
    Ok(())
}

pub(crate) fn set_goal_status(
    conn: &Connection,
    goal_id: &str,
    status: GoalStatus,
    ts: &str,
) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE goals SET status = ?2, updated_at = ?3 WHERE goal_id = ?1",
        params![goal_id, status.as_str(), ts],
    )?;
    Ok(())
}

const SUBTASK_COLUMNS: &str = "subtask_id, goal_id, description, importance, created_at";

fn row_to_subtask(row: &Row<'_>) -> rusqlite::Result<(Subtask, String)> {
    Ok((
        Subtask {
            subtask_id: row.get(0)?,
            goal_id: row.get(1)?,
            description: row.get(2)?,
            importance: Importance::Medium,
            findings: Vec::new(),
            unknowns: Vec::new(),
            dead_ends: Vec::new(),
            created_at: row.get(4)?,
        },
        row.get(3)?,
    ))
}

fn hydrate_subtask(
    conn: &Connection,
    (mut subtask, importance): (Subtask, String),
) -> Result<Subtask, LedgerError> {
    subtask.importance = importance.parse()?;
    let mut stmt = conn.prepare(
        "SELECT kind, text FROM subtask_log WHERE subtask_id = ?1 ORDER BY kind, seq",
    )?;
    let rows = stmt.query_map(params![subtask.subtask_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for r in rows {
        let (kind, text) = r?;
        match kind.as_str() {
            "finding" => subtask.findings.push(text),
            "unknown" => subtask.unknowns.push(text),
            _ => subtask.dead_ends.push(text),
        }
    }
    Ok(subtask)
}

/// Insert a subtask row together with any log entries it already carries.
pub(crate) fn insert_subtask(conn: &Connection, subtask: &Subtask, ts: &str) -> Result<(), LedgerError> {
    conn.execute(
        &format!(
            "INSERT INTO subtasks({}) VALUES(?1, ?2, ?3, ?4, ?5)",
            SUBTASK_COLUMNS
        ),
        params![
            subtask.subtask_id,
            subtask.goal_id,
            subtask.description,
            subtask.importance.as_str(),
            subtask.created_at
        ],
    )?;
    for kind in [LogKind::Finding, LogKind::Unknown, LogKind::DeadEnd] {
        for text in subtask.log(kind) {
            append_log(conn, &subtask.subtask_id, kind, text, ts)?;
        }
    }
    Ok(())
}

pub fn get_subtask(conn: &Connection, subtask_id: &str) -> Result<Option<Subtask>, LedgerError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM subtasks WHERE subtask_id = ?1",
                SUBTASK_COLUMNS
            ),
            params![subtask_id],
            row_to_subtask,
        )
        .optional()?;
    raw.map(|r| hydrate_subtask(conn, r)).transpose()
}

pub(crate) fn require_subtask(conn: &Connection, subtask_id: &str) -> Result<Subtask, LedgerError> {
    get_subtask(conn, subtask_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("subtask {}", subtask_id)))
}

pub fn subtasks_for_goal(conn: &Connection, goal_id: &str) -> Result<Vec<Subtask>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM subtasks WHERE goal_id = ?1 ORDER BY created_at, rowid",
        SUBTASK_COLUMNS
    ))?;
    let rows = stmt.query_map(params![goal_id], row_to_subtask)?;
    let mut raw = Vec::new();
    for r in rows {
        raw.push(r?);
    }
    raw.into_iter().map(|r| hydrate_subtask(conn, r)).collect()
}

pub(crate) fn append_log(
    conn: &Connection,
    subtask_id: &str,
    kind: LogKind,
    text: &str,
    ts: &str,
) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO subtask_log(subtask_id, kind, seq, text, ts)
         VALUES(?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM subtask_log WHERE subtask_id = ?1 AND kind = ?2), ?3, ?4)",
        params![subtask_id, kind.as_str(), text, ts],
    )?;
    Ok(())
}

pub fn goal_tree(conn: &Connection, session_id: &str) -> Result<GoalTree, LedgerError> {
    let goals = goals_for_session(conn, session_id)?
        .into_iter()
        .map(|goal| {
            let subtasks = subtasks_for_goal(conn, &goal.goal_id)?;
            Ok(GoalNode { goal, subtasks })
        })
        .collect::<Result<Vec<_>, LedgerError>>()?;
    Ok(GoalTree {
        session_id: session_id.to_string(),
        goals,
    })
}

pub fn unknowns_summary(tree: &GoalTree) -> UnknownsSummary {
    let mut unknowns = Vec::new();
    let mut goals_with_unknowns = 0;
    for node in &tree.goals {
        let before = unknowns.len();
        for subtask in &node.subtasks {
            for u in &subtask.unknowns {
                unknowns.push(OpenUnknown {
                    goal_id: node.goal.goal_id.clone(),
                    subtask_id: subtask.subtask_id.clone(),
                    subtask: subtask.description.clone(),
                    unknown: u.clone(),
                });
            }
        }
        if unknowns.len() > before {
            goals_with_unknowns += 1;
        }
    }
    UnknownsSummary {
        session_id: tree.session_id.clone(),
        total: unknowns.len(),
        goals_with_unknowns,
        unknowns,
    }
}

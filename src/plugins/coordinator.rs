//! Write coordinator: one logical write across entity store and archive.
//!
//! Ordering for every write:
//! 1. validate (phase machine, vector ranges, ownership) with no side effects
//! 2. persist to the entity store in one IMMEDIATE transaction, under the
//!    per-session (or per-goal/subtask) lock
//! 3. mirror to the audit archive outside the lock
//! 4. append the flat broker trail (swallowed on failure)
//!
//! Archive failure is reported through `archived: false` for checkpoints,
//! sessions and subtask logs. Goal writes are discovery-critical: their
//! archive entry is written before the transaction commits and a failure
//! rolls the transaction back.
//!
//! The converse gap remains for goals: a commit that fails after its archive
//! put leaves that version in the archive. For an update the previously
//! committed version is archived again so discovery sees the store's state;
//! a created goal whose commit fails stays discoverable in the archive
//! although the entity store never held it.

use crate::core::anchor::{self, AnchorSource};
use crate::core::broker::DbBroker;
use crate::core::config::{self, LedgerConfig};
use crate::core::db;
use crate::core::error::LedgerError;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::archive::{self, ArchiveEntry, AuditArchive, FsArchive, Namespace};
use crate::plugins::checkpoint::{self, Checkpoint, Phase, Vectors};
use crate::plugins::drift::{
    self, CalibrationClassifier, CalibrationReport, DriftAssessment, MetricDelta,
    UncertaintyTracksKnowledge,
};
use crate::plugins::goals::{
    self, Goal, GoalStatus, GoalTree, Importance, LineageEntry, LogKind, ScopeScores, Subtask,
    UnknownsSummary,
};
use crate::plugins::phase;
use crate::plugins::session::{self, Session, SessionStatus};
use regex::Regex;
use rusqlite::{Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

static AGENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@-]{0,127}$").unwrap());

/// Outcome of the best-effort archive leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveStatus {
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<ArchiveEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session: Session,
    pub archive: ArchiveStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointRecord {
    pub checkpoint: Checkpoint,
    pub archived: bool,
    pub archive: ArchiveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalRecord {
    pub goal: Goal,
    pub archive_entry: ArchiveEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtaskRecord {
    pub subtask: Subtask,
    pub archived: bool,
    pub archive: ArchiveStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub goal_id: String,
    pub agent_id: String,
    pub from_session: String,
    pub to_session: String,
    pub timestamp: String,
}

pub struct CheckpointRequest<'a> {
    pub session_id: &'a str,
    pub phase: Phase,
    pub round: u32,
    pub vectors: Vectors,
    pub metadata: Option<JsonValue>,
}

pub struct Ledger {
    store: Store,
    broker: DbBroker,
    archive: Arc<dyn AuditArchive>,
    anchor: Box<dyn AnchorSource>,
    config: LedgerConfig,
}

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

fn goal_key(goal_id: &str) -> String {
    format!("goal:{}", goal_id)
}

fn subtask_key(subtask_id: &str) -> String {
    format!("subtask:{}", subtask_id)
}

fn validate_agent_id(agent_id: &str) -> Result<(), LedgerError> {
    if !AGENT_ID_RE.is_match(agent_id) {
        return Err(LedgerError::ValidationError(format!(
            "invalid agent_id '{}'",
            agent_id
        )));
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.trim().is_empty() {
        return Err(LedgerError::ValidationError(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

impl Ledger {
    /// Open the ledger for a project: resolve the store, load config,
    /// initialize the entity database and the filesystem archive.
    pub fn open(project_root: &Path) -> Result<Self, LedgerError> {
        let store = Store::resolve(project_root);
        let config = config::load_config(project_root, &store)?;
        let archive = Arc::new(FsArchive::open(store.archive_root())?);
        let anchor = anchor::anchor_for(config.archive.anchor, project_root);
        Self::with_parts(store, config, archive, anchor)
    }

    pub fn with_parts(
        store: Store,
        config: LedgerConfig,
        archive: Arc<dyn AuditArchive>,
        anchor: Box<dyn AnchorSource>,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        db::initialize_ledger_db(&store)?;
        let broker = DbBroker::new(&store, config.trail.enabled);
        Ok(Self {
            store,
            broker,
            archive,
            anchor,
            config,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn archive(&self) -> &dyn AuditArchive {
        self.archive.as_ref()
    }

    fn archive_put<T: Serialize>(
        &self,
        namespace: Namespace,
        entity_id: &str,
        record: &T,
    ) -> Result<ArchiveEntry, LedgerError> {
        let payload = serde_json::to_value(record)?;
        let anchor = self.anchor.current()?;
        self.archive
            .put(namespace, entity_id, &anchor, &payload)
            .map_err(|e| match e {
                LedgerError::ArchiveWriteFailed(_) => e,
                other => LedgerError::ArchiveWriteFailed(other.to_string()),
            })
    }

    /// Best-effort mirror; never fails the caller.
    /// Archive `goal`, then commit. A failed commit re-archives `committed`
    /// (the version the store still holds) so it is the latest again.
    fn commit_goal(
        &self,
        tx: Transaction<'_>,
        goal: &Goal,
        committed: Option<&Goal>,
    ) -> Result<ArchiveEntry, LedgerError> {
        let entry = self.archive_put(Namespace::Goals, &goal.goal_id, goal)?;
        if let Err(e) = tx.commit() {
            match committed {
                Some(prev) => {
                    if let Err(restore) = self.archive_put(Namespace::Goals, &prev.goal_id, prev) {
                        warn!(goal_id = %goal.goal_id, error = %restore, "could not re-archive committed goal");
                    }
                }
                None => {
                    warn!(goal_id = %goal.goal_id, seq = entry.seq, "goal archived but never committed");
                }
            }
            return Err(e.into());
        }
        Ok(entry)
    }

    fn mirror<T: Serialize>(&self, namespace: Namespace, entity_id: &str, record: &T) -> ArchiveStatus {
        match self.archive_put(namespace, entity_id, record) {
            Ok(entry) => ArchiveStatus {
                archived: true,
                entry: Some(entry),
                error: None,
            },
            Err(e) => {
                warn!(
                    namespace = namespace.as_str(),
                    entity_id,
                    error = %e,
                    "archive mirror failed; entity store write stands"
                );
                ArchiveStatus {
                    archived: false,
                    entry: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    // --- Sessions ---

    pub fn create_session(&self, agent_id: &str) -> Result<SessionRecord, LedgerError> {
        validate_agent_id(agent_id)?;
        let session = Session {
            session_id: time::new_id("S"),
            agent_id: agent_id.to_string(),
            created_at: time::now_epoch_z(),
            status: SessionStatus::Active,
            ended_at: None,
        };
        self.broker
            .with_conn(agent_id, "session.create", Some(&session.session_id), |conn| {
                session::insert_session(conn, &session)
            })?;
        info!(session_id = %session.session_id, agent_id, "session created");
        let archive = self.mirror(Namespace::Sessions, &session.session_id, &session);
        Ok(SessionRecord { session, archive })
    }

    pub fn end_session(&self, session_id: &str) -> Result<SessionRecord, LedgerError> {
        let session = self.broker.with_lock(&session_key(session_id), || {
            self.broker
                .with_conn("ledger", "session.end", Some(session_id), |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    session::require_session(&tx, session_id)?;
                    session::mark_ended(&tx, session_id, &time::now_epoch_z())?;
                    let session = session::require_session(&tx, session_id)?;
                    tx.commit()?;
                    Ok(session)
                })
        })?;
        let archive = self.mirror(Namespace::Sessions, session_id, &session);
        Ok(SessionRecord { session, archive })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session, LedgerError> {
        self.broker
            .read(|conn| session::require_session(conn, session_id))
    }

    pub fn list_sessions(&self, agent_id: Option<&str>) -> Result<Vec<Session>, LedgerError> {
        self.broker
            .read(|conn| session::list_sessions(conn, agent_id))
    }

    // --- Checkpoints ---

    pub fn write_checkpoint(&self, req: CheckpointRequest<'_>) -> Result<CheckpointRecord, LedgerError> {
        checkpoint::validate_vectors(&req.vectors)?;
        let session_id = req.session_id;

        // Steps 1-2: validate + persist, atomic per session.
        let (cp, agent_id) = self.broker.with_lock(&session_key(session_id), || {
            self.broker.with_conn(
                "ledger",
                "checkpoint.write",
                Some(session_id),
                |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let session = session::require_session(&tx, session_id)?;
                    if session.status == SessionStatus::Ended {
                        return Err(LedgerError::ValidationError(format!(
                            "session {} has ended",
                            session_id
                        )));
                    }
                    let history = phase::load_history(&tx, session_id)?;
                    phase::validate_transition(session_id, &history, req.phase, req.round)?;

                    let cp = Checkpoint {
                        checkpoint_id: time::new_id("CP"),
                        session_id: session_id.to_string(),
                        phase: req.phase,
                        round: req.round,
                        vectors: req.vectors,
                        metadata: req.metadata,
                        created_at: time::now_epoch_z(),
                    };
                    checkpoint::insert_checkpoint(&tx, &cp)?;
                    tx.commit()?;
                    Ok((cp, session.agent_id))
                },
            )
        })?;
        info!(
            checkpoint_id = %cp.checkpoint_id,
            session_id,
            phase = %cp.phase,
            round = cp.round,
            "checkpoint persisted"
        );

        // Step 3: mirror outside the session scope.
        let archive = self.mirror(Namespace::Checkpoints, &cp.checkpoint_id, &cp);

        let drift = matches!(cp.phase, Phase::Check | Phase::Postflight)
            .then(|| self.drift_for(session_id, &agent_id));
        let calibration = if cp.phase == Phase::Postflight {
            match self.compute_calibration(session_id) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(session_id, error = %e, "calibration not available");
                    None
                }
            }
        } else {
            None
        };

        Ok(CheckpointRecord {
            archived: archive.archived,
            checkpoint: cp,
            archive,
            drift,
            calibration,
        })
    }

    /// Re-run only the archive leg for a committed checkpoint.
    pub fn retry_checkpoint_archive(&self, checkpoint_id: &str) -> Result<ArchiveEntry, LedgerError> {
        let cp = self.get_checkpoint(checkpoint_id)?;
        self.archive_put(Namespace::Checkpoints, &cp.checkpoint_id, &cp)
    }

    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint, LedgerError> {
        self.broker.read(|conn| {
            checkpoint::get_checkpoint(conn, checkpoint_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("checkpoint {}", checkpoint_id)))
        })
    }

    /// Highest-round checkpoint of `phase`, `None` when the phase has no
    /// checkpoint yet. Unknown sessions are `NotFound`.
    pub fn latest_checkpoint(
        &self,
        session_id: &str,
        phase: Phase,
    ) -> Result<Option<Checkpoint>, LedgerError> {
        self.broker.read(|conn| {
            session::require_session(conn, session_id)?;
            checkpoint::latest_for_phase(conn, session_id, phase)
        })
    }

    pub fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>, LedgerError> {
        self.broker.read(|conn| {
            session::require_session(conn, session_id)?;
            checkpoint::list_for_session(conn, session_id)
        })
    }

    // --- Drift & calibration ---

    pub fn metric_delta(&self, session_id: &str, metric: &str) -> Result<Option<MetricDelta>, LedgerError> {
        let checkpoints = self.list_checkpoints(session_id)?;
        Ok(drift::metric_delta(&checkpoints, metric))
    }

    pub fn compute_calibration(&self, session_id: &str) -> Result<CalibrationReport, LedgerError> {
        let session = self.get_session(session_id)?;
        let classifier = UncertaintyTracksKnowledge {
            tolerance: self.config.tolerance_for(&session.agent_id),
        };
        self.compute_calibration_with(session_id, &classifier)
    }

    pub fn compute_calibration_with(
        &self,
        session_id: &str,
        classifier: &dyn CalibrationClassifier,
    ) -> Result<CalibrationReport, LedgerError> {
        let checkpoints = self.list_checkpoints(session_id)?;
        drift::calibration_report(session_id, &checkpoints, classifier)
    }

    /// Unknown session is `NotFound`; anything else fails open.
    pub fn compute_drift_severity(&self, session_id: &str) -> Result<DriftAssessment, LedgerError> {
        let session = self.get_session(session_id)?;
        Ok(self.drift_for(session_id, &session.agent_id))
    }

    fn drift_for(&self, session_id: &str, agent_id: &str) -> DriftAssessment {
        let window = self.config.drift_window_for(agent_id);
        match self.list_checkpoints(session_id) {
            Ok(checkpoints) => drift::assess_drift(
                session_id,
                &checkpoints,
                &self.config.drift.bias_indicators,
                window,
            ),
            Err(e) => {
                warn!(session_id, error = %e, "drift history unreadable; proceeding");
                DriftAssessment::unavailable(session_id, window, &e.to_string())
            }
        }
    }

    // --- Goals ---

    pub fn create_goal(
        &self,
        session_id: &str,
        objective: &str,
        scope: ScopeScores,
    ) -> Result<GoalRecord, LedgerError> {
        require_text("objective", objective)?;
        scope.validate()?;

        let (goal, entry) = self.broker.with_conn(
            "ledger",
            "goal.create",
            Some(session_id),
            |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let session = session::require_session(&tx, session_id)?;
                let ts = time::now_epoch_z();
                let goal = Goal {
                    goal_id: time::new_id("G"),
                    session_id: session_id.to_string(),
                    objective: objective.to_string(),
                    scope,
                    status: GoalStatus::InProgress,
                    lineage: vec![LineageEntry {
                        agent_id: session.agent_id,
                        action: "created".to_string(),
                        timestamp: ts.clone(),
                    }],
                    created_at: ts.clone(),
                    updated_at: ts,
                };
                goals::insert_goal(&tx, &goal)?;
                // Discoverability is the point of a goal: no archive, no commit.
                let entry = self.commit_goal(tx, &goal, None)?;
                Ok((goal, entry))
            },
        )?;
        info!(goal_id = %goal.goal_id, session_id, "goal created");
        Ok(GoalRecord {
            goal,
            archive_entry: entry,
        })
    }

    /// Hand a goal to `new_agent_id`'s current active session.
    pub fn resume_goal(&self, goal_id: &str, new_agent_id: &str) -> Result<GoalRecord, LedgerError> {
        validate_agent_id(new_agent_id)?;
        let (goal, entry, handoff) = self.broker.with_lock(&goal_key(goal_id), || {
            self.broker
                .with_conn(new_agent_id, "goal.resume", Some(goal_id), |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let before = goals::require_goal(&tx, goal_id)?;
                    let target = session::current_for_agent(&tx, new_agent_id)?.ok_or_else(|| {
                        LedgerError::NotFound(format!("active session for agent {}", new_agent_id))
                    })?;
                    let ts = time::now_epoch_z();
                    goals::append_lineage(
                        &tx,
                        goal_id,
                        &LineageEntry {
                            agent_id: new_agent_id.to_string(),
                            action: "resumed".to_string(),
                            timestamp: ts.clone(),
                        },
                    )?;
                    goals::set_goal_owner(&tx, goal_id, &target.session_id, &ts)?;
                    let goal = goals::require_goal(&tx, goal_id)?;
                    let entry = self.commit_goal(tx, &goal, Some(&before))?;
                    let handoff = Handoff {
                        goal_id: goal_id.to_string(),
                        agent_id: new_agent_id.to_string(),
                        from_session: before.session_id,
                        to_session: target.session_id,
                        timestamp: ts,
                    };
                    Ok((goal, entry, handoff))
                })
        })?;
        info!(goal_id, agent_id = new_agent_id, session_id = %goal.session_id, "goal resumed");

        let handoff_id = format!("{}@{}", goal_id, entry.seq);
        self.mirror(Namespace::Handoffs, &handoff_id, &handoff);

        Ok(GoalRecord {
            goal,
            archive_entry: entry,
        })
    }

    pub fn complete_goal(&self, goal_id: &str) -> Result<GoalRecord, LedgerError> {
        self.set_goal_status(goal_id, GoalStatus::Completed, "completed")
    }

    pub fn abandon_goal(&self, goal_id: &str) -> Result<GoalRecord, LedgerError> {
        self.set_goal_status(goal_id, GoalStatus::Abandoned, "abandoned")
    }

    fn set_goal_status(
        &self,
        goal_id: &str,
        status: GoalStatus,
        action: &str,
    ) -> Result<GoalRecord, LedgerError> {
        let (goal, entry) = self.broker.with_lock(&goal_key(goal_id), || {
            self.broker
                .with_conn("ledger", &format!("goal.{}", action), Some(goal_id), |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let current = goals::require_goal(&tx, goal_id)?;
                    let owner = session::require_session(&tx, &current.session_id)?;
                    let ts = time::now_epoch_z();
                    goals::append_lineage(
                        &tx,
                        goal_id,
                        &LineageEntry {
                            agent_id: owner.agent_id,
                            action: action.to_string(),
                            timestamp: ts.clone(),
                        },
                    )?;
                    goals::set_goal_status(&tx, goal_id, status, &ts)?;
                    let goal = goals::require_goal(&tx, goal_id)?;
                    let entry = self.commit_goal(tx, &goal, Some(&current))?;
                    Ok((goal, entry))
                })
        })?;
        Ok(GoalRecord {
            goal,
            archive_entry: entry,
        })
    }

    pub fn get_goal(&self, goal_id: &str) -> Result<Goal, LedgerError> {
        self.broker.read(|conn| goals::require_goal(conn, goal_id))
    }

    pub fn goals_for_session(&self, session_id: &str) -> Result<Vec<Goal>, LedgerError> {
        self.broker
            .read(|conn| goals::goals_for_session(conn, session_id))
    }

    pub fn get_goal_tree(&self, session_id: &str) -> Result<GoalTree, LedgerError> {
        self.broker.read(|conn| {
            session::require_session(conn, session_id)?;
            goals::goal_tree(conn, session_id)
        })
    }

    pub fn query_unknowns_summary(&self, session_id: &str) -> Result<UnknownsSummary, LedgerError> {
        let tree = self.get_goal_tree(session_id)?;
        Ok(goals::unknowns_summary(&tree))
    }

    /// Goals as recorded in the archive, optionally limited to goals whose
    /// lineage includes `agent_filter`. Reads the archive, not the entity
    /// store, so it sees goals written by other agents and other stores.
    pub fn discover_goals(&self, agent_filter: Option<&str>) -> Result<Vec<Goal>, LedgerError> {
        let mut out = Vec::new();
        for (entry, payload) in archive::latest_per_entity(self.archive.as_ref(), Namespace::Goals)? {
            let goal: Goal = match serde_json::from_value(payload) {
                Ok(goal) => goal,
                Err(e) => {
                    warn!(goal_id = %entry.entity_id, error = %e, "skipping unreadable archived goal");
                    continue;
                }
            };
            let matches = agent_filter
                .is_none_or(|agent| goal.lineage.iter().any(|l| l.agent_id == agent));
            if matches {
                out.push(goal);
            }
        }
        Ok(out)
    }

    pub fn list_handoffs(&self, goal_id: Option<&str>) -> Result<Vec<Handoff>, LedgerError> {
        let mut out = Vec::new();
        for entry in self.archive.entries(Namespace::Handoffs)? {
            let handoff: Handoff = serde_json::from_value(self.archive.load(&entry)?)?;
            if goal_id.is_none_or(|g| handoff.goal_id == g) {
                out.push(handoff);
            }
        }
        Ok(out)
    }

    // --- Subtasks ---

    pub fn create_subtask(
        &self,
        goal_id: &str,
        description: &str,
        importance: Importance,
    ) -> Result<SubtaskRecord, LedgerError> {
        require_text("description", description)?;
        let subtask = self
            .broker
            .with_conn("ledger", "subtask.create", Some(goal_id), |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                goals::require_goal(&tx, goal_id)?;
                let ts = time::now_epoch_z();
                let subtask = Subtask {
                    subtask_id: time::new_id("ST"),
                    goal_id: goal_id.to_string(),
                    description: description.to_string(),
                    importance,
                    findings: Vec::new(),
                    unknowns: Vec::new(),
                    dead_ends: Vec::new(),
                    created_at: ts.clone(),
                };
                goals::insert_subtask(&tx, &subtask, &ts)?;
                tx.commit()?;
                Ok(subtask)
            })?;
        let archive = self.mirror(Namespace::Subtasks, &subtask.subtask_id, &subtask);
        Ok(SubtaskRecord {
            archived: archive.archived,
            subtask,
            archive,
        })
    }

    pub fn append_subtask_finding(&self, subtask_id: &str, text: &str) -> Result<SubtaskRecord, LedgerError> {
        self.append_subtask_log(subtask_id, LogKind::Finding, text)
    }

    pub fn append_subtask_unknown(&self, subtask_id: &str, text: &str) -> Result<SubtaskRecord, LedgerError> {
        self.append_subtask_log(subtask_id, LogKind::Unknown, text)
    }

    pub fn append_subtask_dead_end(&self, subtask_id: &str, text: &str) -> Result<SubtaskRecord, LedgerError> {
        self.append_subtask_log(subtask_id, LogKind::DeadEnd, text)
    }

    pub fn append_subtask_log(
        &self,
        subtask_id: &str,
        kind: LogKind,
        text: &str,
    ) -> Result<SubtaskRecord, LedgerError> {
        require_text(kind.as_str(), text)?;
        let subtask = self.broker.with_lock(&subtask_key(subtask_id), || {
            self.broker
                .with_conn("ledger", &format!("subtask.{}", kind), Some(subtask_id), |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    goals::require_subtask(&tx, subtask_id)?;
                    goals::append_log(&tx, subtask_id, kind, text, &time::now_epoch_z())?;
                    let subtask = goals::require_subtask(&tx, subtask_id)?;
                    tx.commit()?;
                    Ok(subtask)
                })
        })?;
        let archive = self.mirror(Namespace::Subtasks, subtask_id, &subtask);
        Ok(SubtaskRecord {
            archived: archive.archived,
            subtask,
            archive,
        })
    }

    pub fn get_subtask(&self, subtask_id: &str) -> Result<Subtask, LedgerError> {
        self.broker
            .read(|conn| goals::require_subtask(conn, subtask_id))
    }
}

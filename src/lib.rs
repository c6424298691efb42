//! epiledger: a checkpoint ledger for agent epistemic state.
//!
//! An agent reports its own epistemic vectors (know, uncertainty, clarity,
//! ...) at PREFLIGHT, CHECK and POSTFLIGHT checkpoints. The ledger sequences
//! those checkpoints, persists them to a local SQLite entity store, mirrors
//! every write into a content-addressed audit archive, and derives
//! calibration and drift reports from the history.
//!
//! # Architecture
//!
//! ## Two stores
//!
//! - **Entity store** (`<store>/ledger.db`): canonical sessions, checkpoints,
//!   goals and subtasks. Append-only fields are guarded by triggers.
//! - **Audit archive** (`<store>/archive/`): write-once objects named by
//!   SHA-256, indexed per namespace with a monotonically increasing sequence
//!   and the host repository's `HEAD` as anchor.
//!
//! ## The Thin Waist
//!
//! All entity mutations route through `DbBroker` for per-session
//! serialization and the flat `broker.events.jsonl` trail.
//!
//! ## Subsystems
//!
//! - `phase`: checkpoint sequencing rules
//! - `coordinator`: the `Ledger` write path across both stores
//! - `drift`: deltas, drift severity, calibration
//! - `goals`: goals, subtasks, lineage, investigation logs
//! - `recovery`: rebuild the entity store from the archive
//!
//! # Crate Structure
//!
//! - [`core`]: store, broker, schemas, config, anchors, errors
//! - [`plugins`]: ledger subsystems

pub mod core;
pub mod plugins;

mod cli;

use crate::cli::{
    ArchiveCommand, CheckpointCommand, Cli, Command, GoalCommand, SessionCommand, SubtaskCommand,
};
use crate::core::error::LedgerError;
use crate::core::time;
use crate::plugins::archive::{self, FsArchive};
use crate::plugins::checkpoint::{self, Phase};
use crate::plugins::coordinator::{CheckpointRequest, Ledger};
use crate::plugins::goals::{Importance, ScopeScores};
use crate::plugins::recovery;
use clap::Parser;
use serde::Serialize;
use serde_json::Value as JsonValue;

fn ok_envelope<T: Serialize>(cmd: &str, key: &str, value: &T) -> Result<JsonValue, LedgerError> {
    let mut extra = serde_json::Map::new();
    extra.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(time::command_envelope(cmd, "ok", JsonValue::Object(extra)))
}

pub fn error_envelope(cmd: &str, err: &LedgerError) -> JsonValue {
    time::command_envelope(
        cmd,
        "error",
        serde_json::json!({
            "error": {
                "code": err.code(),
                "message": err.to_string(),
            }
        }),
    )
}

/// Parse args, run one command, print its JSON envelope to stdout.
pub fn run() -> Result<(), LedgerError> {
    let cli = Cli::parse();
    let project = match cli.project {
        Some(p) => p,
        None => std::env::current_dir()?,
    };
    let cmd_name = command_name(&cli.command);
    let ledger = Ledger::open(&project)?;

    match dispatch(&ledger, cli.command, &cmd_name) {
        Ok(envelope) => {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&error_envelope(&cmd_name, &e))?);
            Err(e)
        }
    }
}

fn command_name(command: &Command) -> String {
    let name = match command {
        Command::Session(s) => match s.command {
            SessionCommand::Create { .. } => "session.create",
            SessionCommand::End { .. } => "session.end",
            SessionCommand::Show { .. } => "session.show",
            SessionCommand::List { .. } => "session.list",
        },
        Command::Checkpoint(c) => match c.command {
            CheckpointCommand::Write { .. } => "checkpoint.write",
            CheckpointCommand::List { .. } => "checkpoint.list",
            CheckpointCommand::Delta { .. } => "checkpoint.delta",
        },
        Command::Goal(g) => match g.command {
            GoalCommand::Create { .. } => "goal.create",
            GoalCommand::Resume { .. } => "goal.resume",
            GoalCommand::Complete { .. } => "goal.complete",
            GoalCommand::Abandon { .. } => "goal.abandon",
            GoalCommand::Tree { .. } => "goal.tree",
            GoalCommand::Discover { .. } => "goal.discover",
        },
        Command::Subtask(s) => match s.command {
            SubtaskCommand::Add { .. } => "subtask.add",
            SubtaskCommand::Finding { .. } => "subtask.finding",
            SubtaskCommand::Unknown { .. } => "subtask.unknown",
            SubtaskCommand::DeadEnd { .. } => "subtask.dead_end",
        },
        Command::Unknowns { .. } => "unknowns",
        Command::Calibration { .. } => "calibration",
        Command::Drift { .. } => "drift",
        Command::Archive(a) => match a.command {
            ArchiveCommand::Verify => "archive.verify",
            ArchiveCommand::Retry { .. } => "archive.retry",
            ArchiveCommand::Rebuild { .. } => "archive.rebuild",
            ArchiveCommand::Handoffs { .. } => "archive.handoffs",
        },
    };
    name.to_string()
}

fn dispatch(ledger: &Ledger, command: Command, cmd: &str) -> Result<JsonValue, LedgerError> {
    match command {
        Command::Session(s) => match s.command {
            SessionCommand::Create { agent } => {
                ok_envelope(cmd, "result", &ledger.create_session(&agent)?)
            }
            SessionCommand::End { session } => {
                ok_envelope(cmd, "result", &ledger.end_session(&session)?)
            }
            SessionCommand::Show { session } => {
                ok_envelope(cmd, "session", &ledger.get_session(&session)?)
            }
            SessionCommand::List { agent } => {
                ok_envelope(cmd, "sessions", &ledger.list_sessions(agent.as_deref())?)
            }
        },
        Command::Checkpoint(c) => match c.command {
            CheckpointCommand::Write {
                session,
                phase,
                round,
                vectors,
                metadata,
            } => {
                let metadata = metadata
                    .map(|m| {
                        serde_json::from_str::<JsonValue>(&m).map_err(|e| {
                            LedgerError::ValidationError(format!("metadata: {}", e))
                        })
                    })
                    .transpose()?;
                let record = ledger.write_checkpoint(CheckpointRequest {
                    session_id: &session,
                    phase: phase.parse::<Phase>()?,
                    round,
                    vectors: checkpoint::parse_vectors(&vectors)?,
                    metadata,
                })?;
                ok_envelope(cmd, "result", &record)
            }
            CheckpointCommand::List { session } => {
                ok_envelope(cmd, "checkpoints", &ledger.list_checkpoints(&session)?)
            }
            CheckpointCommand::Delta { session, metric } => {
                ok_envelope(cmd, "delta", &ledger.metric_delta(&session, &metric)?)
            }
        },
        Command::Goal(g) => match g.command {
            GoalCommand::Create {
                session,
                objective,
                breadth,
                duration,
                coordination,
            } => {
                let scope = ScopeScores {
                    breadth,
                    duration,
                    coordination,
                };
                ok_envelope(cmd, "result", &ledger.create_goal(&session, &objective, scope)?)
            }
            GoalCommand::Resume { goal, agent } => {
                ok_envelope(cmd, "result", &ledger.resume_goal(&goal, &agent)?)
            }
            GoalCommand::Complete { goal } => {
                ok_envelope(cmd, "result", &ledger.complete_goal(&goal)?)
            }
            GoalCommand::Abandon { goal } => {
                ok_envelope(cmd, "result", &ledger.abandon_goal(&goal)?)
            }
            GoalCommand::Tree { session } => {
                ok_envelope(cmd, "tree", &ledger.get_goal_tree(&session)?)
            }
            GoalCommand::Discover { agent } => {
                ok_envelope(cmd, "goals", &ledger.discover_goals(agent.as_deref())?)
            }
        },
        Command::Subtask(s) => match s.command {
            SubtaskCommand::Add {
                goal,
                description,
                importance,
            } => {
                let importance = importance.parse::<Importance>()?;
                ok_envelope(
                    cmd,
                    "result",
                    &ledger.create_subtask(&goal, &description, importance)?,
                )
            }
            SubtaskCommand::Finding { subtask, text } => {
                ok_envelope(cmd, "result", &ledger.append_subtask_finding(&subtask, &text)?)
            }
            SubtaskCommand::Unknown { subtask, text } => {
                ok_envelope(cmd, "result", &ledger.append_subtask_unknown(&subtask, &text)?)
            }
            SubtaskCommand::DeadEnd { subtask, text } => {
                ok_envelope(cmd, "result", &ledger.append_subtask_dead_end(&subtask, &text)?)
            }
        },
        Command::Unknowns { session } => {
            ok_envelope(cmd, "summary", &ledger.query_unknowns_summary(&session)?)
        }
        Command::Calibration { session } => {
            ok_envelope(cmd, "report", &ledger.compute_calibration(&session)?)
        }
        Command::Drift { session } => {
            ok_envelope(cmd, "assessment", &ledger.compute_drift_severity(&session)?)
        }
        Command::Archive(a) => match a.command {
            ArchiveCommand::Verify => {
                let fs_archive = FsArchive::open(ledger.store().archive_root())?;
                ok_envelope(cmd, "report", &archive::verify_archive(&fs_archive)?)
            }
            ArchiveCommand::Retry { checkpoint } => {
                ok_envelope(cmd, "entry", &ledger.retry_checkpoint_archive(&checkpoint)?)
            }
            ArchiveCommand::Rebuild { target } => {
                let target = crate::core::store::Store::new(target);
                ok_envelope(
                    cmd,
                    "summary",
                    &recovery::rebuild_from_archive(ledger.archive(), &target)?,
                )
            }
            ArchiveCommand::Handoffs { goal } => {
                ok_envelope(cmd, "handoffs", &ledger.list_handoffs(goal.as_deref())?)
            }
        },
    }
}

//! CLI struct definitions for the `epiledger` command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "epiledger",
    version = env!("CARGO_PKG_VERSION"),
    about = "Checkpoint ledger for agent epistemic state: record, mirror, and audit calibration and drift."
)]
pub(crate) struct Cli {
    /// Project root (defaults to the current directory).
    #[clap(long, global = true)]
    pub project: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Session lifecycle.
    Session(SessionCli),
    /// Record and inspect checkpoints.
    Checkpoint(CheckpointCli),
    /// Goals and their lineage.
    Goal(GoalCli),
    /// Subtasks and investigation logs.
    Subtask(SubtaskCli),
    /// Open unknowns across a session's goal tree.
    Unknowns {
        #[clap(long)]
        session: String,
    },
    /// PREFLIGHT vs POSTFLIGHT calibration report.
    Calibration {
        #[clap(long)]
        session: String,
    },
    /// Drift severity over the recent checkpoint window.
    Drift {
        #[clap(long)]
        session: String,
    },
    /// Audit archive maintenance.
    Archive(ArchiveCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct SessionCli {
    #[clap(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SessionCommand {
    /// Start a new session for an agent.
    Create {
        #[clap(long)]
        agent: String,
    },
    /// Mark a session ended.
    End {
        #[clap(long)]
        session: String,
    },
    Show {
        #[clap(long)]
        session: String,
    },
    List {
        #[clap(long)]
        agent: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct CheckpointCli {
    #[clap(subcommand)]
    pub command: CheckpointCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CheckpointCommand {
    /// Record a checkpoint.
    Write {
        #[clap(long)]
        session: String,
        /// PREFLIGHT, CHECK or POSTFLIGHT
        #[clap(long)]
        phase: String,
        #[clap(long, default_value = "1")]
        round: u32,
        /// `know=0.6,uncertainty=0.3` or a JSON object
        #[clap(long)]
        vectors: String,
        /// Free-form JSON metadata
        #[clap(long)]
        metadata: Option<String>,
    },
    /// List a session's checkpoints in phase/round order.
    List {
        #[clap(long)]
        session: String,
    },
    /// Delta of one metric between the two most recent checkpoints.
    Delta {
        #[clap(long)]
        session: String,
        #[clap(long)]
        metric: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct GoalCli {
    #[clap(subcommand)]
    pub command: GoalCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum GoalCommand {
    Create {
        #[clap(long)]
        session: String,
        #[clap(long)]
        objective: String,
        #[clap(long, default_value = "0.5")]
        breadth: f64,
        #[clap(long, default_value = "0.5")]
        duration: f64,
        #[clap(long, default_value = "0.0")]
        coordination: f64,
    },
    /// Take over a goal into the agent's current session.
    Resume {
        #[clap(long)]
        goal: String,
        #[clap(long)]
        agent: String,
    },
    Complete {
        #[clap(long)]
        goal: String,
    },
    Abandon {
        #[clap(long)]
        goal: String,
    },
    /// Goals and subtasks owned by a session.
    Tree {
        #[clap(long)]
        session: String,
    },
    /// Goals recorded in the archive, across agents.
    Discover {
        #[clap(long)]
        agent: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct SubtaskCli {
    #[clap(subcommand)]
    pub command: SubtaskCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SubtaskCommand {
    Add {
        #[clap(long)]
        goal: String,
        #[clap(long)]
        description: String,
        /// critical, high, medium, low
        #[clap(long, default_value = "medium")]
        importance: String,
    },
    Finding {
        #[clap(long)]
        subtask: String,
        #[clap(long)]
        text: String,
    },
    Unknown {
        #[clap(long)]
        subtask: String,
        #[clap(long)]
        text: String,
    },
    DeadEnd {
        #[clap(long)]
        subtask: String,
        #[clap(long)]
        text: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ArchiveCli {
    #[clap(subcommand)]
    pub command: ArchiveCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ArchiveCommand {
    /// Recompute object hashes and check the index.
    Verify,
    /// Re-mirror a committed checkpoint.
    Retry {
        #[clap(long)]
        checkpoint: String,
    },
    /// Rebuild an entity database from the archive into an empty directory.
    Rebuild {
        #[clap(long)]
        target: PathBuf,
    },
    Handoffs {
        #[clap(long)]
        goal: Option<String>,
    },
}

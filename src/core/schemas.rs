//! Centralized schema definitions for the ledger's entity database.
//!
//! The entity store (`ledger.db`) is the single source of truth for sessions,
//! checkpoints, goals and subtasks. Append-only and immutable fields are
//! enforced with triggers so that no code path can rewrite history.

pub const LEDGER_DB_NAME: &str = "ledger.db";
pub const ARCHIVE_DIR_NAME: &str = "archive";
pub const TRAIL_FILE_NAME: &str = "broker.events.jsonl";

pub const LEDGER_SCHEMA_VERSION: u32 = 2;

pub const LEDGER_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const LEDGER_DB_SCHEMA_SESSIONS: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'ended')),
        ended_at TEXT
    )
";

pub const LEDGER_DB_SCHEMA_CHECKPOINTS: &str = "
    CREATE TABLE IF NOT EXISTS checkpoints (
        checkpoint_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        phase TEXT NOT NULL CHECK (phase IN ('PREFLIGHT', 'CHECK', 'POSTFLIGHT')),
        round INTEGER NOT NULL CHECK (round >= 1),
        vectors TEXT NOT NULL,
        metadata TEXT,
        created_at TEXT NOT NULL,
        UNIQUE(session_id, phase, round),
        FOREIGN KEY(session_id) REFERENCES sessions(session_id)
    )
";

pub const LEDGER_DB_SCHEMA_GOALS: &str = "
    CREATE TABLE IF NOT EXISTS goals (
        goal_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        objective TEXT NOT NULL,
        scope_breadth REAL NOT NULL,
        scope_duration REAL NOT NULL,
        scope_coordination REAL NOT NULL,
        status TEXT NOT NULL DEFAULT 'in_progress',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(session_id) REFERENCES sessions(session_id)
    )
";

pub const LEDGER_DB_SCHEMA_GOAL_LINEAGE: &str = "
    CREATE TABLE IF NOT EXISTS goal_lineage (
        goal_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        agent_id TEXT NOT NULL,
        action TEXT NOT NULL,
        ts TEXT NOT NULL,
        PRIMARY KEY(goal_id, seq),
        FOREIGN KEY(goal_id) REFERENCES goals(goal_id)
    )
";

pub const LEDGER_DB_SCHEMA_SUBTASKS: &str = "
    CREATE TABLE IF NOT EXISTS subtasks (
        subtask_id TEXT PRIMARY KEY,
        goal_id TEXT NOT NULL,
        description TEXT NOT NULL,
        importance TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(goal_id) REFERENCES goals(goal_id)
    )
";

pub const LEDGER_DB_SCHEMA_SUBTASK_LOG: &str = "
    CREATE TABLE IF NOT EXISTS subtask_log (
        subtask_id TEXT NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('finding', 'unknown', 'dead_end')),
        seq INTEGER NOT NULL,
        text TEXT NOT NULL,
        ts TEXT NOT NULL,
        PRIMARY KEY(subtask_id, kind, seq),
        FOREIGN KEY(subtask_id) REFERENCES subtasks(subtask_id)
    )
";

pub const LEDGER_DB_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id, phase, round)",
    "CREATE INDEX IF NOT EXISTS idx_goals_session ON goals(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_subtasks_goal ON subtasks(goal_id)",
];

/// History is never rewritten: checkpoints are immutable, lineage and
/// investigation logs only grow, and a subtask never changes parent goal.
pub const LEDGER_DB_GUARDS: &[&str] = &[
    "CREATE TRIGGER IF NOT EXISTS trg_checkpoints_immutable BEFORE UPDATE ON checkpoints
     BEGIN SELECT RAISE(ABORT, 'checkpoints are immutable'); END",
    "CREATE TRIGGER IF NOT EXISTS trg_checkpoints_no_delete BEFORE DELETE ON checkpoints
     BEGIN SELECT RAISE(ABORT, 'checkpoints are append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS trg_sessions_no_delete BEFORE DELETE ON sessions
     BEGIN SELECT RAISE(ABORT, 'sessions are append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS trg_lineage_immutable BEFORE UPDATE ON goal_lineage
     BEGIN SELECT RAISE(ABORT, 'goal lineage is append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS trg_lineage_no_delete BEFORE DELETE ON goal_lineage
     BEGIN SELECT RAISE(ABORT, 'goal lineage is append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS trg_subtask_log_immutable BEFORE UPDATE ON subtask_log
     BEGIN SELECT RAISE(ABORT, 'subtask logs are append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS trg_subtask_log_no_delete BEFORE DELETE ON subtask_log
     BEGIN SELECT RAISE(ABORT, 'subtask logs are append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS trg_subtask_parent_fixed BEFORE UPDATE OF goal_id ON subtasks
     BEGIN SELECT RAISE(ABORT, 'subtask parent goal is fixed'); END",
];

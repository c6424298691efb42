//! Store abstraction for the ledger's on-disk state.
//!
//! A store root holds the entity database, the audit archive directory and
//! the flat broker trail. Nothing outside the root is written.

use crate::core::schemas;
use std::path::{Path, PathBuf};

/// Store handle representing one ledger workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the store root: `EPILEDGER_HOME` wins, otherwise
    /// `<project>/.epiledger/data`.
    pub fn resolve(project_root: &Path) -> Self {
        match std::env::var("EPILEDGER_HOME") {
            Ok(home) if !home.trim().is_empty() => Self::new(home),
            _ => Self::new(project_root.join(".epiledger").join("data")),
        }
    }

    pub fn entity_db_path(&self) -> PathBuf {
        self.root.join(schemas::LEDGER_DB_NAME)
    }

    pub fn archive_root(&self) -> PathBuf {
        self.root.join(schemas::ARCHIVE_DIR_NAME)
    }

    pub fn trail_path(&self) -> PathBuf {
        self.root.join(schemas::TRAIL_FILE_NAME)
    }
}

//! Archive anchors: the revision label each archive entry is filed under.
//!
//! The archive itself assigns a monotonically increasing sequence number to
//! every entry, so the anchor only has to say *where* in the host
//! repository's history a write happened.

use crate::core::config::AnchorKind;
use crate::core::error::LedgerError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub trait AnchorSource: Send + Sync {
    /// Current anchor revision, e.g. a commit SHA.
    fn current(&self) -> Result<String, LedgerError>;
}

/// Anchors entries to the host repository's `HEAD` commit.
#[derive(Debug, Clone)]
pub struct GitAnchor {
    repo_root: PathBuf,
}

impl GitAnchor {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }
}

impl AnchorSource for GitAnchor {
    fn current(&self) -> Result<String, LedgerError> {
        run_git(&self.repo_root, &["rev-parse", "HEAD"])
    }
}

/// Fixed label for stores outside a git checkout; ordering comes from the
/// archive sequence alone.
#[derive(Debug, Clone)]
pub struct SequenceAnchor {
    label: String,
}

impl SequenceAnchor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Default for SequenceAnchor {
    fn default() -> Self {
        Self::new("local")
    }
}

impl AnchorSource for SequenceAnchor {
    fn current(&self) -> Result<String, LedgerError> {
        Ok(self.label.clone())
    }
}

/// Pick the anchor for a project. `git` falls back to a sequence anchor
/// when the project is not a git checkout or has no commits yet.
pub fn anchor_for(kind: AnchorKind, project_root: &Path) -> Box<dyn AnchorSource> {
    match kind {
        AnchorKind::Git => {
            let git = GitAnchor::new(project_root);
            match git.current() {
                Ok(_) => Box::new(git),
                Err(e) => {
                    debug!(error = %e, "git anchor unavailable, using sequence anchor");
                    Box::new(SequenceAnchor::default())
                }
            }
        }
        AnchorKind::Sequence => Box::new(SequenceAnchor::default()),
    }
}

fn run_git(repo_root: &Path, args: &[&str]) -> Result<String, LedgerError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()?;

    if !output.status.success() {
        return Err(LedgerError::ArchiveWriteFailed(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

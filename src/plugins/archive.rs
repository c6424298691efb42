//! Audit archive: write-once, content-addressed mirror of entity writes.
//!
//! Layout under the archive root:
//! - `objects/<2 hex>/<62 hex>`: canonical JSON payload, named by its SHA-256
//! - `refs/<namespace>.jsonl`: append-only index of [`ArchiveEntry`] lines
//! - `refs.lock`: held exclusively while a sequence number is allocated
//!
//! Every put appends a new index line with the next archive sequence number,
//! so later versions of an entity are new entries, never overwrites. The
//! sequence is global across namespaces and allocated under a file lock, so
//! separate processes sharing a store never hand out the same number. The
//! archive is only read back for discovery, verification and disaster
//! recovery; the entity store stays canonical.

use crate::core::error::LedgerError;
use crate::core::time;
use fs2::FileExt;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Sessions,
    Checkpoints,
    Goals,
    Subtasks,
    Handoffs,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::Sessions,
        Namespace::Checkpoints,
        Namespace::Goals,
        Namespace::Subtasks,
        Namespace::Handoffs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Sessions => "sessions",
            Namespace::Checkpoints => "checkpoints",
            Namespace::Goals => "goals",
            Namespace::Subtasks => "subtasks",
            Namespace::Handoffs => "handoffs",
        }
    }

    pub fn entity_type(&self) -> &'static str {
        match self {
            Namespace::Sessions => "session",
            Namespace::Checkpoints => "checkpoint",
            Namespace::Goals => "goal",
            Namespace::Subtasks => "subtask",
            Namespace::Handoffs => "handoff",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub seq: u64,
    pub anchor: String,
    pub namespace: Namespace,
    pub entity_type: String,
    pub entity_id: String,
    pub content_hash: String,
    pub ts: String,
}

pub trait AuditArchive: Send + Sync {
    /// Mirror `payload` for `(namespace, entity_id)` under `anchor`.
    fn put(
        &self,
        namespace: Namespace,
        entity_id: &str,
        anchor: &str,
        payload: &JsonValue,
    ) -> Result<ArchiveEntry, LedgerError>;

    /// Index entries of a namespace in sequence order.
    fn entries(&self, namespace: Namespace) -> Result<Vec<ArchiveEntry>, LedgerError>;

    fn load(&self, entry: &ArchiveEntry) -> Result<JsonValue, LedgerError>;
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Deterministic bytes for a payload (object keys are sorted).
pub fn canonical_bytes(payload: &JsonValue) -> Result<Vec<u8>, LedgerError> {
    Ok(serde_json::to_vec(payload)?)
}

/// Folded view of one refs file: latest entry per entity and highest seq.
#[derive(Debug, Default)]
struct RefsIndex {
    /// Bytes of the refs file already folded in.
    offset: u64,
    terminated: bool,
    max_seq: u64,
    latest: FxHashMap<String, ArchiveEntry>,
}

impl RefsIndex {
    fn fold(&mut self, entry: ArchiveEntry) {
        self.max_seq = self.max_seq.max(entry.seq);
        match self.latest.get(&entry.entity_id) {
            Some(prev) if prev.seq >= entry.seq => {}
            _ => {
                self.latest.insert(entry.entity_id.clone(), entry);
            }
        }
    }
}

/// Filesystem archive rooted at `<store>/archive`.
///
/// Sequence numbers are allocated under an exclusive lock on `refs.lock`,
/// so several handles (in one process or many) can share a root.
pub struct FsArchive {
    root: PathBuf,
    index: Mutex<FxHashMap<Namespace, RefsIndex>>,
}

impl FsArchive {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("refs"))?;
        Ok(Self {
            root,
            index: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, hash: &str) -> PathBuf {
        let (head, tail) = hash.split_at(2.min(hash.len()));
        self.root.join("objects").join(head).join(tail)
    }

    fn refs_path(&self, namespace: Namespace) -> PathBuf {
        self.root
            .join("refs")
            .join(format!("{}.jsonl", namespace.as_str()))
    }

    /// Index entries in seq order plus the count of unreadable lines.
    fn read_refs(&self, namespace: Namespace) -> Result<(Vec<ArchiveEntry>, usize), LedgerError> {
        let path = self.refs_path(namespace);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e.into()),
        };
        let (mut entries, unreadable) = parse_refs(&bytes, &path);
        entries.sort_by_key(|e| e.seq);
        Ok((entries, unreadable))
    }

    fn lock_refs(&self) -> Result<fs::File, LedgerError> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.root.join("refs.lock"))?;
        f.lock_exclusive()?;
        Ok(f)
    }

    /// Fold whatever other writers appended since the last look.
    fn refresh(&self, index: &mut FxHashMap<Namespace, RefsIndex>) -> Result<(), LedgerError> {
        for ns in Namespace::ALL {
            let path = self.refs_path(ns);
            let len = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            };
            let slot = index.entry(ns).or_default();
            if len < slot.offset {
                *slot = RefsIndex::default();
            }
            if len == slot.offset {
                continue;
            }
            let mut f = fs::File::open(&path)?;
            f.seek(SeekFrom::Start(slot.offset))?;
            let mut tail = Vec::new();
            f.read_to_end(&mut tail)?;
            let (entries, _) = parse_refs(&tail, &path);
            for entry in entries {
                slot.fold(entry);
            }
            slot.offset += tail.len() as u64;
            slot.terminated = tail.last() == Some(&b'\n');
        }
        Ok(())
    }

    /// Write-once: an existing object must already hold identical bytes.
    fn write_object(&self, hash: &str, bytes: &[u8]) -> Result<(), LedgerError> {
        let path = self.object_path(hash);
        if path.exists() {
            let existing = fs::read(&path)?;
            if hash_bytes(&existing) != hash {
                return Err(LedgerError::ArchiveWriteFailed(format!(
                    "object {} exists with different content",
                    hash
                )));
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("tmp-{}", time::new_event_id()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn put_inner(
        &self,
        namespace: Namespace,
        entity_id: &str,
        anchor: &str,
        payload: &JsonValue,
    ) -> Result<ArchiveEntry, LedgerError> {
        let bytes = canonical_bytes(payload)?;
        let content_hash = hash_bytes(&bytes);

        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        let _refs_lock = self.lock_refs()?;
        self.refresh(&mut index)?;

        // Re-mirroring unchanged content is a no-op.
        if let Some(last) = index.get(&namespace).and_then(|s| s.latest.get(entity_id)) {
            if last.content_hash == content_hash {
                return Ok(last.clone());
            }
        }

        self.write_object(&content_hash, &bytes)?;

        let seq = index.values().map(|s| s.max_seq).max().unwrap_or(0) + 1;
        let entry = ArchiveEntry {
            seq,
            anchor: anchor.to_string(),
            namespace,
            entity_type: namespace.entity_type().to_string(),
            entity_id: entity_id.to_string(),
            content_hash,
            ts: time::now_epoch_z(),
        };

        let slot = index.entry(namespace).or_default();
        let mut line = String::new();
        // A crash can leave a torn last line; never glue onto it.
        if slot.offset > 0 && !slot.terminated {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(&entry)?);
        line.push('\n');
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.refs_path(namespace))?;
        f.write_all(line.as_bytes())?;
        slot.offset += line.len() as u64;
        slot.terminated = true;
        slot.fold(entry.clone());
        Ok(entry)
    }
}

fn parse_refs(bytes: &[u8], path: &Path) -> (Vec<ArchiveEntry>, usize) {
    let mut entries = Vec::new();
    let mut unreadable = 0;
    for line in bytes.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<ArchiveEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                unreadable += 1;
                warn!(path = %path.display(), error = %e, "skipping unreadable archive index line");
            }
        }
    }
    (entries, unreadable)
}

impl AuditArchive for FsArchive {
    fn put(
        &self,
        namespace: Namespace,
        entity_id: &str,
        anchor: &str,
        payload: &JsonValue,
    ) -> Result<ArchiveEntry, LedgerError> {
        self.put_inner(namespace, entity_id, anchor, payload)
            .map_err(|e| match e {
                LedgerError::ArchiveWriteFailed(_) => e,
                other => LedgerError::ArchiveWriteFailed(other.to_string()),
            })
    }

    fn entries(&self, namespace: Namespace) -> Result<Vec<ArchiveEntry>, LedgerError> {
        Ok(self.read_refs(namespace)?.0)
    }

    fn load(&self, entry: &ArchiveEntry) -> Result<JsonValue, LedgerError> {
        let path = self.object_path(&entry.content_hash);
        if !path.exists() {
            return Err(LedgerError::NotFound(format!(
                "archive object {}",
                entry.content_hash
            )));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Every archived version of one entity, oldest first.
pub fn history(
    archive: &dyn AuditArchive,
    namespace: Namespace,
    entity_id: &str,
) -> Result<Vec<(ArchiveEntry, JsonValue)>, LedgerError> {
    let mut out = Vec::new();
    for entry in archive.entries(namespace)? {
        if entry.entity_id == entity_id {
            let payload = archive.load(&entry)?;
            out.push((entry, payload));
        }
    }
    Ok(out)
}

/// Latest archived version of every entity in a namespace, ordered by the
/// sequence number of that latest version.
pub fn latest_per_entity(
    archive: &dyn AuditArchive,
    namespace: Namespace,
) -> Result<Vec<(ArchiveEntry, JsonValue)>, LedgerError> {
    let mut latest: BTreeMap<String, ArchiveEntry> = BTreeMap::new();
    for entry in archive.entries(namespace)? {
        match latest.get(&entry.entity_id) {
            Some(prev) if prev.seq >= entry.seq => {}
            _ => {
                latest.insert(entry.entity_id.clone(), entry);
            }
        }
    }
    let mut entries: Vec<ArchiveEntry> = latest.into_values().collect();
    entries.sort_by_key(|e| e.seq);
    entries
        .into_iter()
        .map(|e| {
            let payload = archive.load(&e)?;
            Ok((e, payload))
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub entries_checked: usize,
    pub failures: Vec<String>,
}

impl VerifyReport {
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Recompute every object's hash, check sequence numbers are unique and
/// report unreadable index lines.
pub fn verify_archive(archive: &FsArchive) -> Result<VerifyReport, LedgerError> {
    let mut all = Vec::new();
    let mut damaged = Vec::new();
    for ns in Namespace::ALL {
        let (entries, unreadable) = archive.read_refs(ns)?;
        if unreadable > 0 {
            damaged.push(format!(
                "refs/{}.jsonl: {} unreadable line(s)",
                ns.as_str(),
                unreadable
            ));
        }
        all.extend(entries);
    }

    let mut failures: Vec<String> = all
        .par_iter()
        .filter_map(|entry| {
            let path = archive.object_path(&entry.content_hash);
            match fs::read(&path) {
                Err(_) => Some(format!(
                    "{} {} seq {}: object missing",
                    entry.entity_type, entry.entity_id, entry.seq
                )),
                Ok(bytes) if hash_bytes(&bytes) != entry.content_hash => Some(format!(
                    "{} {} seq {}: content hash mismatch",
                    entry.entity_type, entry.entity_id, entry.seq
                )),
                Ok(_) => None,
            }
        })
        .collect();

    let mut seqs: Vec<u64> = all.iter().map(|e| e.seq).collect();
    seqs.sort_unstable();
    for pair in seqs.windows(2) {
        if pair[0] == pair[1] {
            failures.push(format!("duplicate archive seq {}", pair[0]));
        }
    }
    failures.extend(damaged);
    failures.sort();

    Ok(VerifyReport {
        entries_checked: all.len(),
        failures,
    })
}

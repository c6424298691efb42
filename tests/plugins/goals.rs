use epiledger::core::anchor::SequenceAnchor;
use epiledger::core::config::LedgerConfig;
use epiledger::core::error::LedgerError;
use epiledger::core::store::Store;
use epiledger::plugins::archive::{ArchiveEntry, AuditArchive, FsArchive, Namespace};
use epiledger::plugins::coordinator::Ledger;
use epiledger::plugins::goals::{GoalStatus, Importance, ScopeScores};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::{TempDir, tempdir};

struct FaultyArchive {
    inner: FsArchive,
    failing: AtomicBool,
}

impl AuditArchive for FaultyArchive {
    fn put(
        &self,
        namespace: Namespace,
        entity_id: &str,
        anchor: &str,
        payload: &JsonValue,
    ) -> Result<ArchiveEntry, LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::ArchiveWriteFailed("injected fault".into()));
        }
        self.inner.put(namespace, entity_id, anchor, payload)
    }

    fn entries(&self, namespace: Namespace) -> Result<Vec<ArchiveEntry>, LedgerError> {
        self.inner.entries(namespace)
    }

    fn load(&self, entry: &ArchiveEntry) -> Result<JsonValue, LedgerError> {
        self.inner.load(entry)
    }
}

fn open_ledger() -> (TempDir, Arc<FaultyArchive>, Ledger) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().join("data"));
    let archive = Arc::new(FaultyArchive {
        inner: FsArchive::open(store.archive_root()).unwrap(),
        failing: AtomicBool::new(false),
    });
    let ledger = Ledger::with_parts(
        store,
        LedgerConfig::default(),
        archive.clone(),
        Box::new(SequenceAnchor::default()),
    )
    .unwrap();
    (tmp, archive, ledger)
}

fn scope() -> ScopeScores {
    ScopeScores {
        breadth: 0.4,
        duration: 0.6,
        coordination: 0.2,
    }
}

#[test]
fn test_goal_creation_and_lineage() {
    let (_tmp, _archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    let record = ledger.create_goal(&sid, "fix the flaky build", scope()).unwrap();
    assert_eq!(record.goal.status, GoalStatus::InProgress);
    assert_eq!(record.goal.lineage.len(), 1);
    assert_eq!(record.goal.lineage[0].agent_id, "agent-A");
    assert_eq!(record.goal.lineage[0].action, "created");
    assert_eq!(record.archive_entry.entity_id, record.goal.goal_id);

    let stored = ledger.get_goal(&record.goal.goal_id).unwrap();
    assert_eq!(stored.scope, scope());
    assert_eq!(stored.session_id, sid);
}

#[test]
fn test_goal_validation() {
    let (_tmp, _archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    let err = ledger.create_goal(&sid, "   ", scope()).unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    let bad = ScopeScores {
        breadth: 1.2,
        ..scope()
    };
    let err = ledger.create_goal(&sid, "too wide", bad).unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    let err = ledger.create_goal("S_missing", "orphan", scope()).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_goal_create_rolls_back_when_archive_fails() {
    let (_tmp, archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    archive.failing.store(true, Ordering::SeqCst);
    let err = ledger.create_goal(&sid, "undiscoverable", scope()).unwrap_err();
    assert!(matches!(err, LedgerError::ArchiveWriteFailed(_)));
    assert!(ledger.goals_for_session(&sid).unwrap().is_empty());
}

#[test]
fn test_resume_hands_goal_to_new_session() {
    let (_tmp, archive, ledger) = open_ledger();
    let sid_a = ledger.create_session("agent-A").unwrap().session.session_id;
    let goal = ledger.create_goal(&sid_a, "port the codec", scope()).unwrap().goal;
    let sid_b = ledger.create_session("agent-B").unwrap().session.session_id;

    let resumed = ledger.resume_goal(&goal.goal_id, "agent-B").unwrap().goal;
    assert_eq!(resumed.session_id, sid_b);
    assert_eq!(resumed.lineage.len(), goal.lineage.len() + 1);
    let last = resumed.lineage.last().unwrap();
    assert_eq!(last.agent_id, "agent-B");
    assert_eq!(last.action, "resumed");

    let handoffs = ledger.list_handoffs(Some(&goal.goal_id)).unwrap();
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].from_session, sid_a);
    assert_eq!(handoffs[0].to_session, sid_b);

    // Two archive versions of the goal: created, then resumed.
    let versions = archive
        .entries(Namespace::Goals)
        .unwrap()
        .into_iter()
        .filter(|e| e.entity_id == goal.goal_id)
        .count();
    assert_eq!(versions, 2);
}

#[test]
fn test_resume_without_active_session_is_not_found() {
    let (_tmp, _archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    let goal = ledger.create_goal(&sid, "port the codec", scope()).unwrap().goal;

    let err = ledger.resume_goal(&goal.goal_id, "agent-B").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert_eq!(ledger.get_goal(&goal.goal_id).unwrap().lineage.len(), 1);

    let err = ledger.resume_goal("G_missing", "agent-A").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_resume_rolls_back_when_archive_fails() {
    let (_tmp, archive, ledger) = open_ledger();
    let sid_a = ledger.create_session("agent-A").unwrap().session.session_id;
    let goal = ledger.create_goal(&sid_a, "port the codec", scope()).unwrap().goal;
    ledger.create_session("agent-B").unwrap();

    archive.failing.store(true, Ordering::SeqCst);
    let err = ledger.resume_goal(&goal.goal_id, "agent-B").unwrap_err();
    assert!(matches!(err, LedgerError::ArchiveWriteFailed(_)));

    let stored = ledger.get_goal(&goal.goal_id).unwrap();
    assert_eq!(stored.session_id, sid_a);
    assert_eq!(stored.lineage.len(), 1);
}

#[test]
fn test_discover_goals_across_agents() {
    let (_tmp, _archive, ledger) = open_ledger();
    let sid_a = ledger.create_session("agent-A").unwrap().session.session_id;
    let goal = ledger.create_goal(&sid_a, "audit the cache", scope()).unwrap().goal;
    let sid_c = ledger.create_session("agent-C").unwrap().session.session_id;
    ledger.create_goal(&sid_c, "unrelated work", scope()).unwrap();

    let sid_b = ledger.create_session("agent-B").unwrap().session.session_id;
    ledger.resume_goal(&goal.goal_id, "agent-B").unwrap();

    let found = ledger.discover_goals(Some("agent-A")).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].goal_id, goal.goal_id);
    assert_eq!(found[0].lineage.len(), 2);
    assert_eq!(found[0].session_id, sid_b);

    assert_eq!(ledger.discover_goals(None).unwrap().len(), 2);
    assert!(ledger.discover_goals(Some("agent-Z")).unwrap().is_empty());
}

#[test]
fn test_complete_and_abandon_append_lineage() {
    let (_tmp, _archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    let done = ledger.create_goal(&sid, "ship it", scope()).unwrap().goal;
    let dropped = ledger.create_goal(&sid, "rewrite it", scope()).unwrap().goal;

    let done = ledger.complete_goal(&done.goal_id).unwrap().goal;
    assert_eq!(done.status, GoalStatus::Completed);
    assert_eq!(done.lineage.last().unwrap().action, "completed");

    let dropped = ledger.abandon_goal(&dropped.goal_id).unwrap().goal;
    assert_eq!(dropped.status, GoalStatus::Abandoned);
    assert_eq!(dropped.lineage.len(), 2);
}

#[test]
fn test_subtask_logs_are_append_only() {
    let (_tmp, _archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    let goal = ledger.create_goal(&sid, "profile startup", scope()).unwrap().goal;
    let st = ledger
        .create_subtask(&goal.goal_id, "measure config load", Importance::Critical)
        .unwrap();
    assert!(st.archived);
    let st_id = st.subtask.subtask_id;

    ledger.append_subtask_finding(&st_id, "toml parse is 2ms").unwrap();
    ledger.append_subtask_finding(&st_id, "env lookups are free").unwrap();
    ledger.append_subtask_dead_end(&st_id, "lazy statics did not help").unwrap();
    let record = ledger.append_subtask_unknown(&st_id, "cold disk cost?").unwrap();

    let subtask = record.subtask;
    assert_eq!(subtask.importance, Importance::Critical);
    assert_eq!(
        subtask.findings,
        vec!["toml parse is 2ms".to_string(), "env lookups are free".to_string()]
    );
    assert_eq!(subtask.dead_ends.len(), 1);
    assert_eq!(subtask.unknowns, vec!["cold disk cost?".to_string()]);

    let err = ledger.append_subtask_finding(&st_id, "").unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));
    let err = ledger.append_subtask_finding("ST_missing", "x").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    let err = ledger
        .create_subtask("G_missing", "nowhere", Importance::Low)
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_subtask_log_survives_archive_failure() {
    let (_tmp, archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    let goal = ledger.create_goal(&sid, "profile startup", scope()).unwrap().goal;
    let st_id = ledger
        .create_subtask(&goal.goal_id, "measure", Importance::Medium)
        .unwrap()
        .subtask
        .subtask_id;

    archive.failing.store(true, Ordering::SeqCst);
    let record = ledger.append_subtask_unknown(&st_id, "why 40ms?").unwrap();
    assert!(!record.archived);
    assert_eq!(ledger.get_subtask(&st_id).unwrap().unknowns.len(), 1);
}

#[test]
fn test_unknowns_summary_and_tree() {
    let (_tmp, _archive, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    let g1 = ledger.create_goal(&sid, "first", scope()).unwrap().goal;
    let g2 = ledger.create_goal(&sid, "second", scope()).unwrap().goal;
    ledger.create_goal(&sid, "third", scope()).unwrap();

    let s1 = ledger
        .create_subtask(&g1.goal_id, "a", Importance::High)
        .unwrap()
        .subtask
        .subtask_id;
    let s2 = ledger
        .create_subtask(&g2.goal_id, "b", Importance::Low)
        .unwrap()
        .subtask
        .subtask_id;
    ledger.append_subtask_unknown(&s1, "u1").unwrap();
    ledger.append_subtask_unknown(&s1, "u2").unwrap();
    ledger.append_subtask_unknown(&s2, "u3").unwrap();
    ledger.append_subtask_finding(&s2, "f1").unwrap();

    let tree = ledger.get_goal_tree(&sid).unwrap();
    assert_eq!(tree.goals.len(), 3);
    assert_eq!(tree.goals[0].subtasks.len(), 1);
    assert!(tree.goals[2].subtasks.is_empty());

    let summary = ledger.query_unknowns_summary(&sid).unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.goals_with_unknowns, 2);

    let err = ledger.query_unknowns_summary("S_missing").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

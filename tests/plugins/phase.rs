use epiledger::core::anchor::SequenceAnchor;
use epiledger::core::config::LedgerConfig;
use epiledger::core::error::LedgerError;
use epiledger::core::store::Store;
use epiledger::plugins::archive::FsArchive;
use epiledger::plugins::checkpoint::{Phase, Vectors};
use epiledger::plugins::coordinator::{CheckpointRequest, Ledger};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

fn open_ledger() -> (TempDir, Ledger) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().join("data"));
    let archive = Arc::new(FsArchive::open(store.archive_root()).unwrap());
    let ledger = Ledger::with_parts(
        store,
        LedgerConfig::default(),
        archive,
        Box::new(SequenceAnchor::default()),
    )
    .unwrap();
    (tmp, ledger)
}

fn vectors(pairs: &[(&str, f64)]) -> Vectors {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn write(
    ledger: &Ledger,
    session_id: &str,
    phase: Phase,
    round: u32,
    know: f64,
) -> Result<String, LedgerError> {
    ledger
        .write_checkpoint(CheckpointRequest {
            session_id,
            phase,
            round,
            vectors: vectors(&[("know", know), ("uncertainty", 1.0 - know)]),
            metadata: None,
        })
        .map(|r| r.checkpoint.checkpoint_id)
}

#[test]
fn test_check_before_preflight_is_rejected_without_a_row() {
    let (_tmp, ledger) = open_ledger();
    let session = ledger.create_session("agent-A").unwrap().session;

    let err = write(&ledger, &session.session_id, Phase::Check, 1, 0.5).unwrap_err();
    match err {
        LedgerError::InvalidPhaseSequence {
            expected, found, ..
        } => {
            assert_eq!(expected, "PREFLIGHT");
            assert_eq!(found, "none");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ledger.list_checkpoints(&session.session_id).unwrap().is_empty());

    let err = write(&ledger, &session.session_id, Phase::Postflight, 1, 0.5).unwrap_err();
    assert_eq!(err.code(), "invalid_phase_sequence");
    assert!(ledger.list_checkpoints(&session.session_id).unwrap().is_empty());
}

#[test]
fn test_full_lifecycle_with_multiple_checks() {
    let (_tmp, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    write(&ledger, &sid, Phase::Preflight, 1, 0.4).unwrap();
    write(&ledger, &sid, Phase::Check, 1, 0.5).unwrap();
    write(&ledger, &sid, Phase::Check, 2, 0.6).unwrap();
    write(&ledger, &sid, Phase::Postflight, 1, 0.7).unwrap();

    let listed = ledger.list_checkpoints(&sid).unwrap();
    let order: Vec<(Phase, u32)> = listed.iter().map(|c| (c.phase, c.round)).collect();
    assert_eq!(
        order,
        vec![
            (Phase::Preflight, 1),
            (Phase::Check, 1),
            (Phase::Check, 2),
            (Phase::Postflight, 1),
        ]
    );

    // POSTFLIGHT does not close the session to further rounds.
    write(&ledger, &sid, Phase::Check, 3, 0.75).unwrap();
    write(&ledger, &sid, Phase::Postflight, 2, 0.8).unwrap();
    assert_eq!(ledger.list_checkpoints(&sid).unwrap().len(), 6);
}

#[test]
fn test_latest_checkpoint_picks_highest_round() {
    let (_tmp, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    assert!(
        ledger
            .latest_checkpoint(&sid, Phase::Preflight)
            .unwrap()
            .is_none()
    );

    write(&ledger, &sid, Phase::Preflight, 1, 0.4).unwrap();
    write(&ledger, &sid, Phase::Check, 1, 0.5).unwrap();
    write(&ledger, &sid, Phase::Check, 2, 0.6).unwrap();
    let third = write(&ledger, &sid, Phase::Check, 3, 0.65).unwrap();

    let latest = ledger.latest_checkpoint(&sid, Phase::Check).unwrap().unwrap();
    assert_eq!(latest.checkpoint_id, third);
    assert_eq!(latest.round, 3);
    assert_eq!(latest.vectors.get("know"), Some(&0.65));
    assert!(
        ledger
            .latest_checkpoint(&sid, Phase::Postflight)
            .unwrap()
            .is_none()
    );

    let err = ledger
        .latest_checkpoint("S_missing", Phase::Check)
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_duplicate_round_rejected_and_original_untouched() {
    let (_tmp, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    write(&ledger, &sid, Phase::Preflight, 1, 0.4).unwrap();
    let first = write(&ledger, &sid, Phase::Check, 1, 0.5).unwrap();

    let err = write(&ledger, &sid, Phase::Check, 1, 0.9).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPhaseSequence { .. }));

    let stored = ledger.get_checkpoint(&first).unwrap();
    assert_eq!(stored.vectors.get("know"), Some(&0.5));
    assert_eq!(ledger.list_checkpoints(&sid).unwrap().len(), 2);

    // Rounds only move forward.
    write(&ledger, &sid, Phase::Check, 3, 0.6).unwrap();
    let err = write(&ledger, &sid, Phase::Check, 2, 0.6).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPhaseSequence { .. }));
}

#[test]
fn test_second_preflight_needs_higher_round() {
    let (_tmp, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    write(&ledger, &sid, Phase::Preflight, 1, 0.4).unwrap();
    assert!(write(&ledger, &sid, Phase::Preflight, 1, 0.4).is_err());
    write(&ledger, &sid, Phase::Preflight, 2, 0.45).unwrap();
}

#[test]
fn test_invalid_inputs_are_validation_errors() {
    let (_tmp, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    let err = write(&ledger, &sid, Phase::Preflight, 0, 0.4).unwrap_err();
    assert_eq!(err.code(), "validation_error");

    let err = ledger
        .write_checkpoint(CheckpointRequest {
            session_id: &sid,
            phase: Phase::Preflight,
            round: 1,
            vectors: vectors(&[("know", 1.5)]),
            metadata: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    let err = ledger
        .write_checkpoint(CheckpointRequest {
            session_id: &sid,
            phase: Phase::Preflight,
            round: 1,
            vectors: vectors(&[("confidence_vibes", 0.5)]),
            metadata: None,
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    assert!(ledger.list_checkpoints(&sid).unwrap().is_empty());
}

#[test]
fn test_unknown_session_is_not_found() {
    let (_tmp, ledger) = open_ledger();
    let err = write(&ledger, "S_missing", Phase::Preflight, 1, 0.4).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_ended_session_rejects_checkpoints() {
    let (_tmp, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, 0.4).unwrap();

    let ended = ledger.end_session(&sid).unwrap().session;
    assert!(ended.ended_at.is_some());

    let err = write(&ledger, &sid, Phase::Check, 1, 0.5).unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));
    assert_eq!(ledger.list_checkpoints(&sid).unwrap().len(), 1);
}

#[test]
fn test_checkpoint_metadata_round_trips() {
    let (_tmp, ledger) = open_ledger();
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    let record = ledger
        .write_checkpoint(CheckpointRequest {
            session_id: &sid,
            phase: Phase::Preflight,
            round: 1,
            vectors: vectors(&[("know", 0.4), ("context", 0.7)]),
            metadata: Some(serde_json::json!({"task": "triage flaky test"})),
        })
        .unwrap();

    let stored = ledger.get_checkpoint(&record.checkpoint.checkpoint_id).unwrap();
    assert_eq!(stored.metadata, Some(serde_json::json!({"task": "triage flaky test"})));
    assert!(record.drift.is_none());
    assert!(record.calibration.is_none());
}

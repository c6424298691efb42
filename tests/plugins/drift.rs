use epiledger::core::anchor::SequenceAnchor;
use epiledger::core::config::LedgerConfig;
use epiledger::core::error::LedgerError;
use epiledger::core::store::Store;
use epiledger::plugins::archive::FsArchive;
use epiledger::plugins::checkpoint::{Phase, Vectors};
use epiledger::plugins::coordinator::{CheckpointRecord, CheckpointRequest, Ledger};
use epiledger::plugins::drift::{
    CalibrationClassifier, CalibrationLabel, DriftSeverity, DriftStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

fn open_ledger(config: LedgerConfig) -> (TempDir, Ledger) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().join("data"));
    let archive = Arc::new(FsArchive::open(store.archive_root()).unwrap());
    let ledger =
        Ledger::with_parts(store, config, archive, Box::new(SequenceAnchor::default())).unwrap();
    (tmp, ledger)
}

fn write(
    ledger: &Ledger,
    session_id: &str,
    phase: Phase,
    round: u32,
    pairs: &[(&str, f64)],
) -> CheckpointRecord {
    let vectors: Vectors = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    ledger
        .write_checkpoint(CheckpointRequest {
            session_id,
            phase,
            round,
            vectors,
            metadata: None,
        })
        .unwrap()
}

#[test]
fn test_calibration_well_calibrated_session() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.5), ("uncertainty", 0.6)]);
    write(&ledger, &sid, Phase::Check, 1, &[("know", 0.6), ("uncertainty", 0.5)]);
    let post = write(&ledger, &sid, Phase::Postflight, 1, &[("know", 0.8), ("uncertainty", 0.3)]);

    let report = post.calibration.expect("postflight carries calibration");
    assert_eq!(report.deltas.get("know"), Some(&0.3));
    assert_eq!(report.deltas.get("uncertainty"), Some(&-0.3));
    assert_eq!(report.label, CalibrationLabel::WellCalibrated);

    let again = ledger.compute_calibration(&sid).unwrap();
    assert_eq!(again, report);
}

#[test]
fn test_calibration_flags_overconfidence() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;

    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.5), ("uncertainty", 0.7)]);
    write(&ledger, &sid, Phase::Postflight, 1, &[("know", 0.6), ("uncertainty", 0.2)]);

    let report = ledger.compute_calibration(&sid).unwrap();
    assert_eq!(report.label, CalibrationLabel::Overconfident);
}

#[test]
fn test_calibration_uses_agent_tolerance_override() {
    let config = LedgerConfig::parse(
        r#"
[agents.loose-agent]
tolerance = 0.5
"#,
    )
    .unwrap();
    let (_tmp, ledger) = open_ledger(config);
    let strict = ledger.create_session("agent-A").unwrap().session.session_id;
    let loose = ledger.create_session("loose-agent").unwrap().session.session_id;

    for sid in [&strict, &loose] {
        write(&ledger, sid, Phase::Preflight, 1, &[("know", 0.5), ("uncertainty", 0.7)]);
        write(&ledger, sid, Phase::Postflight, 1, &[("know", 0.6), ("uncertainty", 0.2)]);
    }

    assert_eq!(
        ledger.compute_calibration(&strict).unwrap().label,
        CalibrationLabel::Overconfident
    );
    assert_eq!(
        ledger.compute_calibration(&loose).unwrap().label,
        CalibrationLabel::WellCalibrated
    );
}

#[test]
fn test_calibration_requires_both_endpoints() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.5)]);

    let err = ledger.compute_calibration(&sid).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let err = ledger.compute_calibration("S_missing").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

struct AlwaysIndeterminate;

impl CalibrationClassifier for AlwaysIndeterminate {
    fn classify(&self, _deltas: &BTreeMap<String, f64>) -> CalibrationLabel {
        CalibrationLabel::Indeterminate
    }
}

#[test]
fn test_calibration_classifier_is_pluggable() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.5), ("uncertainty", 0.6)]);
    write(&ledger, &sid, Phase::Postflight, 1, &[("know", 0.8), ("uncertainty", 0.3)]);

    let report = ledger
        .compute_calibration_with(&sid, &AlwaysIndeterminate)
        .unwrap();
    assert_eq!(report.label, CalibrationLabel::Indeterminate);
    assert_eq!(report.deltas.get("know"), Some(&0.3));
}

#[test]
fn test_drift_insufficient_data_is_safe() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.5)]);
    let check = write(&ledger, &sid, Phase::Check, 1, &[("know", 0.9)]);

    let drift = check.drift.expect("CHECK carries a drift assessment");
    assert_eq!(drift.status, DriftStatus::InsufficientData);
    assert!(drift.safe_to_proceed);
    assert!(drift.severity.is_none());
    assert_eq!(drift.checkpoints_considered, 2);
}

#[test]
fn test_drift_minor_steps() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.50), ("clarity", 0.5)]);
    write(&ledger, &sid, Phase::Check, 1, &[("know", 0.55), ("clarity", 0.5)]);
    write(&ledger, &sid, Phase::Check, 2, &[("know", 0.60), ("clarity", 0.55)]);
    write(&ledger, &sid, Phase::Check, 3, &[("know", 0.65), ("clarity", 0.6)]);
    let post = write(&ledger, &sid, Phase::Postflight, 1, &[("know", 0.70), ("clarity", 0.6)]);

    let drift = post.drift.unwrap();
    assert_eq!(drift.status, DriftStatus::Assessed);
    assert_eq!(drift.severity, Some(DriftSeverity::Minor));
    assert_eq!(drift.score, Some(0.05));
    assert!(drift.safe_to_proceed);
}

#[test]
fn test_drift_severe_jump_blocks() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.5), ("uncertainty", 0.5)]);
    write(&ledger, &sid, Phase::Check, 1, &[("know", 0.5), ("uncertainty", 0.5)]);
    write(&ledger, &sid, Phase::Check, 2, &[("know", 0.55), ("uncertainty", 0.45)]);
    write(&ledger, &sid, Phase::Check, 3, &[("know", 0.6), ("uncertainty", 0.4)]);
    write(&ledger, &sid, Phase::Check, 4, &[("know", 0.6), ("uncertainty", 0.1)]);
    let last = write(&ledger, &sid, Phase::Check, 5, &[("know", 0.1), ("uncertainty", 0.8)]);

    let drift = last.drift.unwrap();
    assert_eq!(drift.severity, Some(DriftSeverity::Severe));
    assert_eq!(drift.driver_metric.as_deref(), Some("uncertainty"));
    assert!(!drift.safe_to_proceed);

    // The write still stands; drift is advisory.
    assert_eq!(ledger.list_checkpoints(&sid).unwrap().len(), 6);

    let recomputed = ledger.compute_drift_severity(&sid).unwrap();
    assert_eq!(recomputed.severity, Some(DriftSeverity::Severe));
}

#[test]
fn test_drift_without_bias_indicators_is_unclassifiable() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, &[("signal", 0.5)]);
    for round in 1..=4 {
        write(&ledger, &sid, Phase::Check, round, &[("signal", 0.5)]);
    }

    let drift = ledger.compute_drift_severity(&sid).unwrap();
    assert_eq!(drift.status, DriftStatus::Unclassifiable);
    assert!(drift.safe_to_proceed);
}

#[test]
fn test_drift_unknown_session_is_not_found() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let err = ledger.compute_drift_severity("S_missing").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_metric_delta_between_latest_checkpoints() {
    let (_tmp, ledger) = open_ledger(LedgerConfig::default());
    let sid = ledger.create_session("agent-A").unwrap().session.session_id;
    write(&ledger, &sid, Phase::Preflight, 1, &[("know", 0.5), ("engagement", 0.9)]);
    write(&ledger, &sid, Phase::Check, 1, &[("know", 0.8)]);

    let delta = ledger.metric_delta(&sid, "know").unwrap().unwrap();
    assert_eq!(delta.previous, 0.5);
    assert_eq!(delta.current, 0.8);
    assert_eq!(delta.delta, 0.3);

    assert!(ledger.metric_delta(&sid, "engagement").unwrap().is_none());
}

//! Drift and calibration engine.
//!
//! Everything here is a pure function of checkpoint history. Nothing reads
//! or writes the entity store; callers load checkpoints and pass them in.
//! Drift assessment never fails: anything it cannot classify comes back as
//! `safe_to_proceed = true` with a note.

use crate::core::config::MIN_DRIFT_WINDOW;
use crate::core::error::LedgerError;
use crate::plugins::checkpoint::{Checkpoint, Phase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MODERATE_DRIFT: f64 = 0.3;
pub const SEVERE_DRIFT: f64 = 0.6;

/// Deltas are reported at nanounit precision so that, e.g., 0.8 - 0.5
/// classifies as 0.3 rather than 0.30000000000000004.
pub fn round_delta(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: String,
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
    pub from_checkpoint: String,
    pub to_checkpoint: String,
}

/// Delta of `metric` between the two most recent checkpoints that carry it.
pub fn metric_delta(checkpoints: &[Checkpoint], metric: &str) -> Option<MetricDelta> {
    let mut carrying = checkpoints
        .iter()
        .rev()
        .filter_map(|cp| cp.vectors.get(metric).map(|v| (cp, *v)));
    let (current_cp, current) = carrying.next()?;
    let (previous_cp, previous) = carrying.next()?;
    Some(MetricDelta {
        metric: metric.to_string(),
        previous,
        current,
        delta: round_delta(current - previous),
        from_checkpoint: previous_cp.checkpoint_id.clone(),
        to_checkpoint: current_cp.checkpoint_id.clone(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    Minor,
    Moderate,
    Severe,
}

pub fn classify_drift(score: f64) -> DriftSeverity {
    if score >= SEVERE_DRIFT {
        DriftSeverity::Severe
    } else if score >= MODERATE_DRIFT {
        DriftSeverity::Moderate
    } else {
        DriftSeverity::Minor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    Assessed,
    InsufficientData,
    Unclassifiable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAssessment {
    pub session_id: String,
    pub status: DriftStatus,
    pub window: usize,
    pub checkpoints_considered: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<DriftSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_metric: Option<String>,
    pub safe_to_proceed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl DriftAssessment {
    fn open(session_id: &str, status: DriftStatus, window: usize, considered: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            status,
            window,
            checkpoints_considered: considered,
            score: None,
            severity: None,
            driver_metric: None,
            safe_to_proceed: true,
            notes: Vec::new(),
        }
    }

    /// Fail-open result for a history that could not even be loaded.
    pub fn unavailable(session_id: &str, window: usize, reason: &str) -> Self {
        let mut out = Self::open(session_id, DriftStatus::Unclassifiable, window, 0);
        out.notes.push(format!("drift not computed: {}", reason));
        out
    }
}

/// Score = largest absolute step between consecutive checkpoints in the
/// window, over the bias-indicator metrics both checkpoints carry.
pub fn assess_drift(
    session_id: &str,
    checkpoints: &[Checkpoint],
    bias_indicators: &[String],
    window: usize,
) -> DriftAssessment {
    let window = window.max(MIN_DRIFT_WINDOW);
    let start = checkpoints.len().saturating_sub(window);
    let recent = &checkpoints[start..];

    if recent.len() < MIN_DRIFT_WINDOW {
        let mut out =
            DriftAssessment::open(session_id, DriftStatus::InsufficientData, window, recent.len());
        out.notes.push(format!(
            "{} checkpoint(s) available, {} required",
            recent.len(),
            MIN_DRIFT_WINDOW
        ));
        return out;
    }

    let mut best: Option<(f64, &str)> = None;
    for pair in recent.windows(2) {
        for metric in bias_indicators {
            let (Some(a), Some(b)) = (pair[0].vectors.get(metric), pair[1].vectors.get(metric))
            else {
                continue;
            };
            if !is_unit(*a) || !is_unit(*b) {
                let mut out = DriftAssessment::open(
                    session_id,
                    DriftStatus::Unclassifiable,
                    window,
                    recent.len(),
                );
                out.notes.push(format!(
                    "malformed '{}' between {} and {}",
                    metric, pair[0].checkpoint_id, pair[1].checkpoint_id
                ));
                return out;
            }
            let step = round_delta((b - a).abs());
            if best.is_none_or(|(s, _)| step > s) {
                best = Some((step, metric.as_str()));
            }
        }
    }

    let Some((score, metric)) = best else {
        let mut out =
            DriftAssessment::open(session_id, DriftStatus::Unclassifiable, window, recent.len());
        out.notes
            .push("no bias-indicator metric present in consecutive checkpoints".into());
        return out;
    };

    let severity = classify_drift(score);
    let mut out = DriftAssessment::open(session_id, DriftStatus::Assessed, window, recent.len());
    out.score = Some(score);
    out.severity = Some(severity);
    out.driver_metric = Some(metric.to_string());
    out.safe_to_proceed = severity != DriftSeverity::Severe;
    out
}

fn is_unit(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalibrationLabel {
    WellCalibrated,
    Overconfident,
    Underconfident,
    Indeterminate,
}

/// Pluggable hook deciding the calibration label from raw deltas.
pub trait CalibrationClassifier {
    fn classify(&self, deltas: &BTreeMap<String, f64>) -> CalibrationLabel;
}

/// Declared uncertainty should fall about as much as knowledge rises.
///
/// `gap = -Δuncertainty - Δknow`. Within `tolerance` is well calibrated;
/// uncertainty dropping faster than knowledge grows is overconfidence, the
/// reverse is underconfidence.
#[derive(Debug, Clone, Copy)]
pub struct UncertaintyTracksKnowledge {
    pub tolerance: f64,
}

impl CalibrationClassifier for UncertaintyTracksKnowledge {
    fn classify(&self, deltas: &BTreeMap<String, f64>) -> CalibrationLabel {
        let (Some(know), Some(uncertainty)) = (deltas.get("know"), deltas.get("uncertainty"))
        else {
            return CalibrationLabel::Indeterminate;
        };
        let gap = round_delta(-uncertainty - know);
        if gap.abs() <= self.tolerance {
            CalibrationLabel::WellCalibrated
        } else if gap > 0.0 {
            CalibrationLabel::Overconfident
        } else {
            CalibrationLabel::Underconfident
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub session_id: String,
    pub preflight_checkpoint: String,
    pub postflight_checkpoint: String,
    pub deltas: BTreeMap<String, f64>,
    pub label: CalibrationLabel,
}

/// Compare the first PREFLIGHT with the last POSTFLIGHT of a session.
pub fn calibration_report(
    session_id: &str,
    checkpoints: &[Checkpoint],
    classifier: &dyn CalibrationClassifier,
) -> Result<CalibrationReport, LedgerError> {
    let pre = checkpoints
        .iter()
        .find(|cp| cp.phase == Phase::Preflight)
        .ok_or_else(|| {
            LedgerError::NotFound(format!("PREFLIGHT checkpoint for session {}", session_id))
        })?;
    let post = checkpoints
        .iter()
        .rev()
        .find(|cp| cp.phase == Phase::Postflight)
        .ok_or_else(|| {
            LedgerError::NotFound(format!("POSTFLIGHT checkpoint for session {}", session_id))
        })?;

    let deltas: BTreeMap<String, f64> = pre
        .vectors
        .iter()
        .filter_map(|(name, before)| {
            post.vectors
                .get(name)
                .map(|after| (name.clone(), round_delta(after - before)))
        })
        .collect();

    Ok(CalibrationReport {
        session_id: session_id.to_string(),
        preflight_checkpoint: pre.checkpoint_id.clone(),
        postflight_checkpoint: post.checkpoint_id.clone(),
        label: classifier.classify(&deltas),
        deltas,
    })
}

//! Data manipulation detector.
//!
//! Two heuristics over the edit/audit trail of the operational store:
//!   1. Massive same-day record changes by a single user
//!   2. Gaps in document number sequences (possible deletions)

use crate::{
    coerce::{document_sequence_number, parse_loose_datetime},
    config::EditTuning,
    detector::{already_cased, CandidateCase, DetectionContext, DetectorMetadata, FraudDetector},
    error::DetectResult,
    source::DEFAULT_FETCH_LIMIT,
    types::{ClientRef, DetectorKind, Severity},
};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

// ── Constants ────────────────────────────────────────────────────────────────

const MASSIVE_CHANGES_CONFIDENCE: f64 = 80.0;
const SEQUENCE_GAP_CONFIDENCE: f64 = 70.0;

/// Document types with a tracked consecutive numbering.
const TRACKED_DOC_TYPES: &[&str] = &["FC", "FV"];

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct DataManipulationDetector {
    tuning: EditTuning,
}

impl DataManipulationDetector {
    pub fn new(tuning: EditTuning) -> Self {
        Self { tuning }
    }

    /// Heuristic 1: one user editing a suspicious number of records in
    /// a single day.
    fn detect_massive_changes(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let edits = ctx.source.edit_log_entries(DEFAULT_FETCH_LIMIT)?;

        let cutoff = ctx.now - Duration::days(self.tuning.edit_lookback_days);
        let mut by_user_day: BTreeMap<(String, NaiveDate), i64> = BTreeMap::new();
        for edit in &edits {
            let Some(date) = parse_loose_datetime(edit.edited_at.as_deref()) else {
                continue;
            };
            if date < cutoff || date > ctx.now {
                continue;
            }
            let user = edit.user_code.clone().unwrap_or_else(|| "UNKNOWN".into());
            *by_user_day.entry((user, date.date())).or_insert(0) += 1;
        }

        for ((user, day), count) in by_user_day {
            if count <= self.tuning.massive_changes_min {
                continue;
            }
            let group_id = format!("MASSIVE_{}_{}_{}", user, day, count);
            if already_cased(ctx, "edit_log", &group_id, DetectorKind::DataManipulation) {
                continue;
            }

            let severity = if count > self.tuning.massive_changes_critical {
                Severity::High
            } else {
                Severity::Medium
            };

            candidates.push(CandidateCase {
                title: format!("Massive record changes - user {user}"),
                description: format!(
                    "User {user} made {count} modifications on {day}. \
                     This requires immediate review.",
                ),
                kind: DetectorKind::DataManipulation,
                severity,
                amount: None,
                source_table: "edit_log".into(),
                source_record_id: group_id,
                client: ClientRef::default(),
                transaction_date: day.and_hms_opt(0, 0, 0),
                confidence: MASSIVE_CHANGES_CONFIDENCE,
                detection_rule: serde_json::json!({
                    "rule": "massive_changes",
                    "user": user,
                    "count": count,
                }),
            });
        }

        Ok(candidates)
    }

    /// Heuristic 2: holes in the consecutive numbering of tracked
    /// document types issued inside the lookback window.
    fn detect_sequence_gaps(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let documents = ctx.source.documents(TRACKED_DOC_TYPES, DEFAULT_FETCH_LIMIT)?;

        let cutoff = ctx.now - Duration::days(self.tuning.document_lookback_days);
        let mut by_type: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for doc in &documents {
            let Some(date) = parse_loose_datetime(doc.issued_at.as_deref()) else {
                continue;
            };
            if date < cutoff || date > ctx.now {
                continue;
            }
            let Some(number) = doc
                .doc_number
                .as_deref()
                .and_then(document_sequence_number)
            else {
                continue;
            };
            by_type.entry(doc.doc_type.clone()).or_default().push(number);
        }

        for (doc_type, mut numbers) in by_type {
            if numbers.len() < self.tuning.sequence_min_documents {
                continue;
            }
            numbers.sort_unstable();

            let gaps: Vec<i64> = numbers
                .windows(2)
                .map(|w| w[1] - w[0])
                .filter(|diff| *diff > self.tuning.sequence_gap_min)
                .collect();
            if gaps.len() < self.tuning.sequence_gap_count_min {
                continue;
            }

            let total_gap: i64 = gaps.iter().sum();
            let group_id = format!("GAPS_{}_{}", doc_type, total_gap);
            if already_cased(ctx, "invoice", &group_id, DetectorKind::DataManipulation) {
                continue;
            }

            let severity = if total_gap < self.tuning.sequence_gap_total_high {
                Severity::Medium
            } else {
                Severity::High
            };

            candidates.push(CandidateCase {
                title: format!("Missing sequences in {doc_type}"),
                description: format!(
                    "{} gaps in the numbering of {doc_type} documents. \
                     Total missing numbers: {total_gap}. \
                     This may indicate document deletion.",
                    gaps.len(),
                ),
                kind: DetectorKind::DataManipulation,
                severity,
                amount: None,
                source_table: "invoice".into(),
                source_record_id: group_id,
                client: ClientRef::default(),
                transaction_date: None,
                confidence: SEQUENCE_GAP_CONFIDENCE,
                detection_rule: serde_json::json!({
                    "rule": "sequence_gap",
                    "gaps": gaps.len(),
                    "total": total_gap,
                }),
            });
        }

        Ok(candidates)
    }
}

impl FraudDetector for DataManipulationDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::DataManipulation
    }

    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            kind: DetectorKind::DataManipulation,
            name: "Data manipulation detector",
            description: "Flags massive record changes, suspicious deletions and \
                          unauthorized data alterations",
            enabled_by_default: true,
            rules: vec![
                "Massive record changes (more than 20 in one day)",
                "Missing sequences in document numbering",
                "Massive record deletions",
            ],
            thresholds: BTreeMap::from([
                ("massive_changes_min", self.tuning.massive_changes_min as f64),
                (
                    "massive_changes_critical",
                    self.tuning.massive_changes_critical as f64,
                ),
                ("sequence_gap_min", self.tuning.sequence_gap_min as f64),
                (
                    "sequence_gap_count_min",
                    self.tuning.sequence_gap_count_min as f64,
                ),
                ("edit_lookback_days", self.tuning.edit_lookback_days as f64),
                (
                    "document_lookback_days",
                    self.tuning.document_lookback_days as f64,
                ),
            ]),
        }
    }

    fn detect(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let heuristics = [
            ("massive_changes", self.detect_massive_changes(ctx)),
            ("sequence_gaps", self.detect_sequence_gaps(ctx)),
        ];
        for (label, result) in heuristics {
            match result {
                Ok(found) => candidates.extend(found),
                Err(e) => log::warn!("data_manipulation/{label} found nothing after error: {e}"),
            }
        }
        Ok(candidates)
    }
}

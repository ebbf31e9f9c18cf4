//! Data manipulation detector: massive same-day edits and document
//! sequence gaps.

use chrono::{NaiveDate, NaiveDateTime};
use fraudwatch_core::{
    case_store::CaseStore,
    config::EditTuning,
    detector::{CandidateCase, DetectionContext, FraudDetector},
    edit_detector::DataManipulationDetector,
    source::SourceDb,
    types::Severity,
};

fn pinned_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 12)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn stores() -> (SourceDb, CaseStore) {
    let source = SourceDb::in_memory().unwrap();
    source.ensure_schema().unwrap();
    let cases = CaseStore::in_memory().unwrap();
    cases.migrate().unwrap();
    (source, cases)
}

fn detect(source: &SourceDb, cases: &CaseStore) -> Vec<CandidateCase> {
    let detector = DataManipulationDetector::new(EditTuning::default());
    let ctx = DetectionContext::new(source, cases, pinned_now());
    detector.detect(&ctx).unwrap()
}

fn add_edits(source: &SourceDb, user: &str, day: &str, count: usize) {
    for i in 0..count {
        let minute = i % 60;
        let hour = 8 + (i / 60);
        source
            .insert_edit(Some(user), Some(&format!("{day} {hour}:{minute:02}:00")))
            .unwrap();
    }
}

fn add_documents(source: &SourceDb, doc_type: &str, numbers: &[i64]) {
    for n in numbers {
        source
            .insert_invoice(
                doc_type,
                Some(&format!("{doc_type}-{n:06}")),
                Some("10/03/2025 10:00:00"),
                None,
                Some(123.0),
                Some(0.0),
                Some(14.76),
                None,
            )
            .unwrap();
    }
}

/// Exactly 20 edits in a day stays under the strictly-greater
/// threshold; 21 raises a MEDIUM case.
#[test]
fn massive_changes_threshold_is_strict() {
    let (source, cases) = stores();
    add_edits(&source, "jperez", "10/03/2025", 20);

    assert!(detect(&source, &cases).is_empty(), "20 edits must pass");

    add_edits(&source, "mlopez", "10/03/2025", 21);
    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1);
    let case = &candidates[0];
    assert_eq!(case.severity, Severity::Medium);
    assert_eq!(case.confidence, 80.0);
    assert_eq!(case.source_record_id, "MASSIVE_mlopez_2025-03-10_21");
}

/// More than 50 edits in a day escalates to HIGH.
#[test]
fn massive_changes_over_fifty_is_high() {
    let (source, cases) = stores();
    add_edits(&source, "jperez", "11/03/2025", 51);

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].severity, Severity::High);
}

/// Edits spread across two days never pool into one group.
#[test]
fn massive_changes_group_per_calendar_day() {
    let (source, cases) = stores();
    add_edits(&source, "jperez", "10/03/2025", 15);
    add_edits(&source, "jperez", "11/03/2025", 15);

    assert!(
        detect(&source, &cases).is_empty(),
        "15 + 15 across two days must not be flagged"
    );
}

/// Edits older than the 7-day window are ignored.
#[test]
fn massive_changes_window() {
    let (source, cases) = stores();
    add_edits(&source, "jperez", "01/03/2025", 30);

    assert!(detect(&source, &cases).is_empty(), "March 1st is outside the window");
}

/// Two gaps larger than 10 raise a MEDIUM sequence case while the
/// total stays under 50.
#[test]
fn sequence_gaps_flagged_medium() {
    let (source, cases) = stores();
    let mut numbers: Vec<i64> = (1..=10).collect();
    numbers.push(25); // gap of 15
    numbers.push(45); // gap of 20
    add_documents(&source, "FV", &numbers);

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1);
    let case = &candidates[0];
    assert_eq!(case.source_record_id, "GAPS_FV_35");
    assert_eq!(case.severity, Severity::Medium);
    assert_eq!(case.confidence, 70.0);
}

/// A missing-number total of 50 or more escalates to HIGH.
#[test]
fn sequence_gaps_large_total_is_high() {
    let (source, cases) = stores();
    let mut numbers: Vec<i64> = (1..=10).collect();
    numbers.push(40); // gap of 30
    numbers.push(65); // gap of 25
    add_documents(&source, "FV", &numbers);

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].severity, Severity::High);
}

/// A single large gap is not enough; two are required.
#[test]
fn single_gap_not_flagged() {
    let (source, cases) = stores();
    let mut numbers: Vec<i64> = (1..=12).collect();
    numbers.push(40);
    add_documents(&source, "FV", &numbers);

    assert!(detect(&source, &cases).is_empty(), "one gap must not raise a case");
}

/// Gap analysis needs at least 10 documents of a type.
#[test]
fn too_few_documents_skips_gap_analysis() {
    let (source, cases) = stores();
    add_documents(&source, "FV", &[1, 20, 40, 60]);

    assert!(
        detect(&source, &cases).is_empty(),
        "four documents are below the minimum for sequence analysis"
    );
}

/// Documents issued outside the 30-day window are not sequenced: a
/// gap left by something deleted long ago must not resurface.
#[test]
fn sequence_gaps_window_excludes_old_documents() {
    let (source, cases) = stores();
    let mut numbers: Vec<i64> = (1..=10).collect();
    numbers.push(25);
    numbers.push(45);
    for n in &numbers {
        source
            .insert_invoice(
                "FV",
                Some(&format!("FV-{n:06}")),
                Some("10/01/2025 10:00:00"),
                None,
                Some(123.0),
                Some(0.0),
                Some(14.76),
                None,
            )
            .unwrap();
    }

    assert!(
        detect(&source, &cases).is_empty(),
        "January documents are outside the 30-day window"
    );
}

/// Documents whose date cannot be parsed cannot be placed in the
/// window and drop out of sequence analysis.
#[test]
fn sequence_gaps_skip_undated_documents() {
    let (source, cases) = stores();
    let mut numbers: Vec<i64> = (1..=10).collect();
    numbers.push(25);
    numbers.push(45);
    for n in &numbers {
        source
            .insert_invoice(
                "FV",
                Some(&format!("FV-{n:06}")),
                Some("31/2/2025 9:5:3"),
                None,
                Some(123.0),
                Some(0.0),
                Some(14.76),
                None,
            )
            .unwrap();
    }

    assert!(
        detect(&source, &cases).is_empty(),
        "undated documents cannot be window-scoped"
    );
}

/// Document numbers with alphanumeric prefixes still sequence by
/// their numeric part; types are analyzed independently.
#[test]
fn gaps_tracked_per_document_type() {
    let (source, cases) = stores();
    let mut fv: Vec<i64> = (1..=10).collect();
    fv.push(25);
    fv.push(45);
    add_documents(&source, "FV", &fv);
    add_documents(&source, "FC", &(1..=12).collect::<Vec<_>>());

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1, "only FV has gaps");
    assert!(candidates[0].source_record_id.starts_with("GAPS_FV_"));
}

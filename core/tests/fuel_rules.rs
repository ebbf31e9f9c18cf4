//! Fuel theft detector: overcapacity boundaries, same-day grouping,
//! client enrichment degradation.

use chrono::{NaiveDate, NaiveDateTime};
use fraudwatch_core::{
    case_store::CaseStore,
    config::FuelTuning,
    detector::{DetectionContext, FraudDetector},
    fuel_detector::FuelTheftDetector,
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

fn detect(source: &SourceDb, cases: &CaseStore) -> Vec<fraudwatch_core::detector::CandidateCase> {
    let detector = FuelTheftDetector::new(FuelTuning::default());
    let ctx = DetectionContext::new(source, cases, pinned_now());
    detector.detect(&ctx).unwrap()
}

/// quantity=200 passes (strictly greater required), 201 is MEDIUM,
/// 301 is HIGH.
#[test]
fn dispatch_quantity_boundaries() {
    let (source, cases) = stores();
    for quantity in [200.0, 201.0, 301.0] {
        source
            .insert_dispatch(
                Some("10/03/2025 09:00:00"),
                Some(quantity),
                Some(quantity * 3.7),
                Some("Diesel"),
                Some("C1"),
            )
            .unwrap();
    }

    let candidates = detect(&source, &cases);

    assert_eq!(
        candidates.len(),
        2,
        "quantity exactly 200 must not be flagged: {candidates:?}"
    );
    assert_eq!(candidates[0].severity, Severity::Medium);
    assert_eq!(candidates[1].severity, Severity::High);
    assert_eq!(candidates[0].confidence, 85.0);
}

/// Overcapacity candidates carry the dispatch's own record id, so
/// each dispatch dedups individually.
#[test]
fn overcapacity_uses_dispatch_id_for_dedup() {
    let (source, cases) = stores();
    let id = source
        .insert_dispatch(
            Some("10/03/2025 09:00:00"),
            Some(250.0),
            Some(925.0),
            Some("Diesel"),
            Some("C1"),
        )
        .unwrap();

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].source_record_id, id.to_string());

    cases.create_case(&candidates[0], pinned_now()).unwrap();
    assert!(
        detect(&source, &cases).is_empty(),
        "persisted dispatch case must suppress re-emission"
    );
}

/// Client lookup enriches candidates with name and tax id; a missing
/// client row degrades to code-only, never an error.
#[test]
fn client_enrichment_degrades_to_unknown() {
    let (source, cases) = stores();
    source
        .insert_client("C1", Some("Transportes Rivera"), Some("0992345678001"))
        .unwrap();
    source
        .insert_dispatch(Some("10/03/2025 09:00:00"), Some(250.0), None, None, Some("C1"))
        .unwrap();
    source
        .insert_dispatch(Some("10/03/2025 10:00:00"), Some(260.0), None, None, Some("C9"))
        .unwrap();

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 2);

    let known = candidates.iter().find(|c| c.client.code.as_deref() == Some("C1")).unwrap();
    assert_eq!(known.client.name.as_deref(), Some("Transportes Rivera"));
    assert_eq!(known.client.tax_id.as_deref(), Some("0992345678001"));

    let unknown = candidates.iter().find(|c| c.client.code.as_deref() == Some("C9")).unwrap();
    assert!(unknown.client.name.is_none(), "unregistered client stays name-less");
}

/// Four dispatches on one day is over the >3 threshold and groups
/// into a MEDIUM case; the group key embeds client, day and count.
#[test]
fn same_day_multiples_grouped() {
    let (source, cases) = stores();
    for hour in ["08", "10", "13", "16"] {
        source
            .insert_dispatch(
                Some(format!("10/03/2025 {hour}:00:00").as_str()),
                Some(40.0),
                Some(148.0),
                Some("Extra"),
                Some("C1"),
            )
            .unwrap();
    }

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1);
    let case = &candidates[0];
    assert_eq!(case.source_record_id, "MULTIPLE_C1_2025-03-10_4");
    assert_eq!(case.severity, Severity::Medium);
    assert_eq!(case.confidence, 90.0);
    assert_eq!(case.amount, Some(592.0));
}

/// Six dispatches on one day escalate the group to HIGH.
#[test]
fn same_day_six_dispatches_is_high() {
    let (source, cases) = stores();
    for hour in ["07", "08", "10", "12", "14", "16"] {
        source
            .insert_dispatch(
                Some(format!("11/03/2025 {hour}:30:00").as_str()),
                Some(40.0),
                Some(148.0),
                Some("Extra"),
                Some("C2"),
            )
            .unwrap();
    }

    let candidates = detect(&source, &cases);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].severity, Severity::High);
}

/// A dispatch whose date fails to parse is excluded from the day
/// grouping instead of crashing the run.
#[test]
fn malformed_dispatch_date_excluded_from_day_grouping() {
    let (source, cases) = stores();
    for hour in ["08", "10", "13"] {
        source
            .insert_dispatch(
                Some(format!("10/03/2025 {hour}:00:00").as_str()),
                Some(40.0),
                Some(148.0),
                Some("Extra"),
                Some("C1"),
            )
            .unwrap();
    }
    source
        .insert_dispatch(Some("31/2/2025 9:5:3"), Some(40.0), Some(148.0), Some("Extra"), Some("C1"))
        .unwrap();

    let candidates = detect(&source, &cases);
    assert!(
        candidates.is_empty(),
        "only three dispatches have usable dates, below the >3 threshold"
    );
}

/// Dispatches outside the 7-day window never group.
#[test]
fn same_day_window_excludes_old_dispatches() {
    let (source, cases) = stores();
    for hour in ["08", "10", "13", "16"] {
        source
            .insert_dispatch(
                Some(format!("01/03/2025 {hour}:00:00").as_str()),
                Some(40.0),
                Some(148.0),
                Some("Extra"),
                Some("C1"),
            )
            .unwrap();
    }

    let candidates = detect(&source, &cases);
    assert!(candidates.is_empty(), "March 1st is outside the 7-day window");
}

//! Case store: persistence, duplicate guard, status lifecycle, audit
//! trail, statistics.

use chrono::{NaiveDate, NaiveDateTime};
use fraudwatch_core::{
    case_store::{CaseFilter, CaseStore},
    detector::CandidateCase,
    types::{CaseStatus, ClientRef, DetectorKind, Severity},
};

fn pinned_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 12)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn store() -> CaseStore {
    let store = CaseStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

fn candidate(record_id: &str, kind: DetectorKind, severity: Severity) -> CandidateCase {
    CandidateCase {
        title: format!("Test case {record_id}"),
        description: "A case raised by a test".into(),
        kind,
        severity,
        amount: Some(1234.5),
        source_table: "invoice".into(),
        source_record_id: record_id.into(),
        client: ClientRef {
            code: Some("C1".into()),
            name: Some("Comercial Andina".into()),
            tax_id: None,
        },
        transaction_date: pinned_now().date().and_hms_opt(9, 30, 0),
        confidence: 85.0,
        detection_rule: serde_json::json!({ "rule": "test", "count": 3 }),
    }
}

/// Creating a case round-trips every field and opens it PENDING with
/// a dated case number.
#[test]
fn create_case_roundtrip() {
    let store = store();
    let created = store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap()
        .expect("first insert must persist");

    assert!(created.case_number.starts_with("CASE-20250312-"));
    assert_eq!(created.status, CaseStatus::Pending);
    assert_eq!(created.kind, DetectorKind::InvoiceAnomaly);
    assert_eq!(created.severity, Severity::Medium);
    assert_eq!(created.amount, Some(1234.5));
    assert_eq!(created.client.name.as_deref(), Some("Comercial Andina"));
    assert_eq!(created.created_by, "system");

    let fetched = store.get_case(created.id).unwrap().expect("case must exist");
    assert_eq!(fetched.case_number, created.case_number);
    assert_eq!(fetched.source_record_id, "REC-1");
}

/// The (source_table, source_record_id, detector_kind) triple is
/// unique: a second insert is a no-op that returns None.
#[test]
fn duplicate_triple_returns_none() {
    let store = store();
    let first = store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap();
    assert!(first.is_some());

    let second = store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::High),
            pinned_now(),
        )
        .unwrap();
    assert!(second.is_none(), "duplicate triple must be rejected");
    assert_eq!(store.case_count().unwrap(), 1);
}

/// The same record id under a different detector kind is a distinct
/// case.
#[test]
fn same_record_different_kind_is_distinct() {
    let store = store();
    store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap();
    let other = store
        .create_case(
            &candidate("REC-1", DetectorKind::DataManipulation, Severity::Medium),
            pinned_now(),
        )
        .unwrap();

    assert!(other.is_some());
    assert_eq!(store.case_count().unwrap(), 2);
}

/// case_exists answers the dedup pre-check.
#[test]
fn case_exists_after_create() {
    let store = store();
    assert!(!store
        .case_exists("invoice", "REC-1", DetectorKind::InvoiceAnomaly)
        .unwrap());

    store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap();

    assert!(store
        .case_exists("invoice", "REC-1", DetectorKind::InvoiceAnomaly)
        .unwrap());
    assert!(!store
        .case_exists("invoice", "REC-1", DetectorKind::FuelTheft)
        .unwrap());
}

/// Status transitions update the case and append an audit entry with
/// the actor; unknown ids report false.
#[test]
fn update_status_lifecycle_and_audit() {
    let store = store();
    let created = store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap()
        .unwrap();

    let updated = store
        .update_status(created.id, CaseStatus::Investigating, "auditor1", Some("looking into it"))
        .unwrap();
    assert!(updated);

    let case = store.get_case(created.id).unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Investigating);
    assert_eq!(case.updated_by.as_deref(), Some("auditor1"));

    let audit = store.audit_entries(created.id).unwrap();
    assert_eq!(audit.len(), 2, "create + status change");
    assert_eq!(audit[0].action, "create_case");
    assert_eq!(audit[1].action, "update_status");
    assert_eq!(audit[1].actor, "auditor1");
    assert!(audit[1].new_values.as_deref().unwrap().contains("investigating"));

    assert!(!store
        .update_status(9999, CaseStatus::Confirmed, "auditor1", None)
        .unwrap());
}

/// get_cases filters by status, kind and limit.
#[test]
fn get_cases_filters() {
    let store = store();
    for i in 0..5 {
        store
            .create_case(
                &candidate(&format!("REC-{i}"), DetectorKind::InvoiceAnomaly, Severity::Medium),
                pinned_now(),
            )
            .unwrap();
    }
    let fuel = store
        .create_case(
            &candidate("DISP-1", DetectorKind::FuelTheft, Severity::High),
            pinned_now(),
        )
        .unwrap()
        .unwrap();
    store
        .update_status(fuel.id, CaseStatus::Confirmed, "auditor1", None)
        .unwrap();

    let pending = store
        .get_cases(&CaseFilter {
            status: Some(CaseStatus::Pending),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(pending.len(), 5);

    let fuel_cases = store
        .get_cases(&CaseFilter {
            kind: Some(DetectorKind::FuelTheft),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(fuel_cases.len(), 1);
    assert_eq!(fuel_cases[0].status, CaseStatus::Confirmed);

    let limited = store
        .get_cases(&CaseFilter {
            limit: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 2);
}

/// Statistics aggregate counts by status and severity plus the
/// summed amount.
#[test]
fn statistics_aggregate() {
    let store = store();
    store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap();
    store
        .create_case(
            &candidate("REC-2", DetectorKind::InvoiceAnomaly, Severity::High),
            pinned_now(),
        )
        .unwrap();
    let confirmed = store
        .create_case(
            &candidate("DISP-1", DetectorKind::FuelTheft, Severity::High),
            pinned_now(),
        )
        .unwrap()
        .unwrap();
    store
        .update_status(confirmed.id, CaseStatus::Confirmed, "auditor1", None)
        .unwrap();

    let stats = store.get_statistics(None, None).unwrap();
    assert_eq!(stats.total_cases, 3);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.medium, 1);
    assert_eq!(stats.high, 2);
    assert!((stats.total_amount - 3703.5).abs() < 1e-6);

    // A window that excludes everything.
    let empty = store
        .get_statistics(
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap().and_hms_opt(0, 0, 0),
            None,
        )
        .unwrap();
    assert_eq!(empty.total_cases, 0);
}

/// Case numbers are unique even within the same day.
#[test]
fn case_numbers_unique() {
    let store = store();
    let a = store
        .create_case(
            &candidate("REC-1", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap()
        .unwrap();
    let b = store
        .create_case(
            &candidate("REC-2", DetectorKind::InvoiceAnomaly, Severity::Medium),
            pinned_now(),
        )
        .unwrap()
        .unwrap();

    assert_ne!(a.case_number, b.case_number);
}

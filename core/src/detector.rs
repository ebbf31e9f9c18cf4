//! Detector contract and shared detection context.
//!
//! RULE: Every detector implements FraudDetector.
//! A detector only reads the operational store and the case store; it
//! never writes. Persistence of the candidates it emits is the scan
//! runner's job.

use crate::{
    case_store::CaseStore,
    error::DetectResult,
    source::SourceDb,
    types::{ClientRef, DetectorKind, Severity},
};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a detector needs for one run, passed explicitly.
/// `now` is pinned by the caller so lookback windows are reproducible.
pub struct DetectionContext<'a> {
    pub source: &'a SourceDb,
    pub cases: &'a CaseStore,
    pub now: NaiveDateTime,
}

impl<'a> DetectionContext<'a> {
    pub fn new(source: &'a SourceDb, cases: &'a CaseStore, now: NaiveDateTime) -> Self {
        Self { source, cases, now }
    }
}

/// A detection result that has not yet been checked into the case
/// store. Candidates summarizing several rows carry a synthesized
/// group key as their source_record_id.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateCase {
    pub title: String,
    pub description: String,
    pub kind: DetectorKind,
    pub severity: Severity,
    pub amount: Option<f64>,
    pub source_table: String,
    pub source_record_id: String,
    pub client: ClientRef,
    pub transaction_date: Option<NaiveDateTime>,
    pub confidence: f64,
    pub detection_rule: serde_json::Value,
}

/// Static description of a detector, exposed for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorMetadata {
    pub kind: DetectorKind,
    pub name: &'static str,
    pub description: &'static str,
    pub enabled_by_default: bool,
    pub rules: Vec<&'static str>,
    pub thresholds: BTreeMap<&'static str, f64>,
}

/// The contract every detector must fulfill.
pub trait FraudDetector: Send {
    /// Unique stable kind tag for this detector.
    fn kind(&self) -> DetectorKind;

    /// Static metadata: name, rules, thresholds. Must not query.
    fn metadata(&self) -> DetectorMetadata;

    /// Run every heuristic and return the candidates that survived the
    /// duplicate pre-check. A single malformed record or failing
    /// sub-check degrades that heuristic to an empty contribution; an
    /// Err from here means the detector as a whole could not run.
    fn detect(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>>;
}

/// Duplicate pre-check shared by all detectors: true when the case
/// store already holds a case for this (table, record, kind) triple.
/// A store error is treated as "unknown" and logged; the UNIQUE
/// constraint in the case store remains the authoritative guard.
pub fn already_cased(ctx: &DetectionContext, table: &str, record_id: &str, kind: DetectorKind) -> bool {
    match ctx.cases.case_exists(table, record_id, kind) {
        Ok(exists) => exists,
        Err(e) => {
            log::warn!("duplicate check failed for {table}:{record_id} ({kind}): {e}");
            false
        }
    }
}

//! Scan orchestration.
//!
//! The runner is the only writer to the case store: it takes the
//! candidates a scan produced, persists the ones that are not
//! duplicates, and relays each newly opened case to the notifier.
//! One candidate's persistence failure never stops the rest.
//!
//! Periodic and on-demand triggers share one runner; the atomic
//! run-in-progress flag keeps them from scanning the same window
//! concurrently.

use crate::{
    case_store::{CaseStore, PersistedCase},
    detector::DetectionContext,
    error::{DetectError, DetectResult},
    registry::DetectorRegistry,
    source::SourceDb,
    types::DetectorKind,
};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives each case the moment it is persisted. The transport
/// behind this seam (dashboard push, mail, message bus) is not the
/// framework's concern.
pub trait CaseNotifier: Send + Sync {
    fn case_opened(&self, case: &PersistedCase);
}

/// Default notifier: an info-level log line per case.
pub struct LogNotifier;

impl CaseNotifier for LogNotifier {
    fn case_opened(&self, case: &PersistedCase) {
        log::info!(
            "case opened: {} [{}/{}] {}",
            case.case_number,
            case.kind,
            case.severity,
            case.title
        );
    }
}

/// Outcome of one scan.
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    /// Candidates emitted per detector, before persistence.
    pub detected: BTreeMap<DetectorKind, usize>,
    /// Cases newly persisted.
    pub created: usize,
    /// Candidates rejected as duplicates of existing cases.
    pub duplicates: usize,
    /// Candidates whose persistence failed.
    pub failures: usize,
}

pub struct ScanRunner {
    registry: DetectorRegistry,
    source: SourceDb,
    cases: CaseStore,
    notifier: Box<dyn CaseNotifier>,
    scan_in_progress: AtomicBool,
}

impl ScanRunner {
    pub fn new(registry: DetectorRegistry, source: SourceDb, cases: CaseStore) -> Self {
        Self::with_notifier(registry, source, cases, Box::new(LogNotifier))
    }

    pub fn with_notifier(
        registry: DetectorRegistry,
        source: SourceDb,
        cases: CaseStore,
        notifier: Box<dyn CaseNotifier>,
    ) -> Self {
        Self {
            registry,
            source,
            cases,
            notifier,
            scan_in_progress: AtomicBool::new(false),
        }
    }

    /// Run every default-enabled detector and persist the results.
    /// `now` pins the lookback windows and detection timestamps.
    pub fn run_once(&self, now: NaiveDateTime) -> DetectResult<ScanReport> {
        self.run_guarded(now, None)
    }

    /// Run a caller-specified subset of detectors.
    pub fn run_kinds(&self, now: NaiveDateTime, kinds: &[DetectorKind]) -> DetectResult<ScanReport> {
        self.run_guarded(now, Some(kinds))
    }

    pub fn cases(&self) -> &CaseStore {
        &self.cases
    }

    pub fn source(&self) -> &SourceDb {
        &self.source
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    fn run_guarded(
        &self,
        now: NaiveDateTime,
        kinds: Option<&[DetectorKind]>,
    ) -> DetectResult<ScanReport> {
        if self
            .scan_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DetectError::ScanInProgress);
        }
        let result = self.run_scan(now, kinds);
        self.scan_in_progress.store(false, Ordering::SeqCst);
        result
    }

    fn run_scan(
        &self,
        now: NaiveDateTime,
        kinds: Option<&[DetectorKind]>,
    ) -> DetectResult<ScanReport> {
        let ctx = DetectionContext::new(&self.source, &self.cases, now);
        let results = match kinds {
            None => self.registry.run_all(&ctx),
            Some(kinds) => self.registry.run_subset(&ctx, kinds),
        };

        let mut report = ScanReport::default();
        for (kind, candidates) in results {
            report.detected.insert(kind, candidates.len());
            for candidate in candidates {
                match self.cases.create_case(&candidate, now) {
                    Ok(Some(case)) => {
                        report.created += 1;
                        self.notifier.case_opened(&case);
                    }
                    Ok(None) => {
                        report.duplicates += 1;
                        log::debug!(
                            "duplicate candidate skipped: {}:{} ({kind})",
                            candidate.source_table,
                            candidate.source_record_id
                        );
                    }
                    Err(e) => {
                        report.failures += 1;
                        log::error!(
                            "failed to persist candidate {}:{} ({kind}): {e}",
                            candidate.source_table,
                            candidate.source_record_id
                        );
                    }
                }
            }
        }
        Ok(report)
    }
}

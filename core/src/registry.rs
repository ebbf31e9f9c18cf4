//! Detector registry.
//!
//! Detectors are registered statically at composition time — no
//! runtime discovery. The registry guarantees that one detector's
//! failure never prevents the others from completing: a failing
//! detector contributes an empty list, never an error.

use crate::{
    config::DetectorConfig,
    detector::{CandidateCase, DetectionContext, DetectorMetadata, FraudDetector},
    edit_detector::DataManipulationDetector,
    fuel_detector::FuelTheftDetector,
    invoice_detector::InvoiceAnomalyDetector,
    types::DetectorKind,
};
use std::collections::BTreeMap;

pub struct DetectorRegistry {
    detectors: Vec<Box<dyn FraudDetector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Registry wired with every builtin detector, in the documented
    /// execution order. Call this instead of new() + manual register()
    /// calls.
    pub fn with_builtin_detectors(config: &DetectorConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(InvoiceAnomalyDetector::new(config.invoice.clone())));
        registry.register(Box::new(FuelTheftDetector::new(config.fuel.clone())));
        registry.register(Box::new(DataManipulationDetector::new(config.edits.clone())));
        registry
    }

    /// Register a detector. A second registration for the same kind
    /// replaces the first.
    pub fn register(&mut self, detector: Box<dyn FraudDetector>) {
        let kind = detector.kind();
        if let Some(existing) = self.detectors.iter_mut().find(|d| d.kind() == kind) {
            log::warn!("detector for kind '{kind}' re-registered, replacing previous");
            *existing = detector;
        } else {
            self.detectors.push(detector);
        }
    }

    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Static metadata for every registered detector, without running
    /// anything.
    pub fn metadata(&self) -> Vec<DetectorMetadata> {
        self.detectors.iter().map(|d| d.metadata()).collect()
    }

    pub fn get(&self, kind: DetectorKind) -> Option<&dyn FraudDetector> {
        self.detectors
            .iter()
            .find(|d| d.kind() == kind)
            .map(|d| d.as_ref())
    }

    /// Run every default-enabled detector. A detector that errors is
    /// logged and mapped to an empty list so the rest still run.
    pub fn run_all(&self, ctx: &DetectionContext) -> BTreeMap<DetectorKind, Vec<CandidateCase>> {
        let mut results = BTreeMap::new();
        for detector in &self.detectors {
            if !detector.metadata().enabled_by_default {
                log::debug!("skipping disabled detector '{}'", detector.kind());
                continue;
            }
            results.insert(detector.kind(), run_isolated(detector.as_ref(), ctx));
        }
        results
    }

    /// Run a caller-specified subset. Kinds with no registered
    /// detector are skipped with a warning, not an error; the
    /// default-enabled flag is ignored because the caller asked
    /// explicitly.
    pub fn run_subset(
        &self,
        ctx: &DetectionContext,
        kinds: &[DetectorKind],
    ) -> BTreeMap<DetectorKind, Vec<CandidateCase>> {
        let mut results = BTreeMap::new();
        for &kind in kinds {
            match self.get(kind) {
                Some(detector) => {
                    results.insert(kind, run_isolated(detector, ctx));
                }
                None => log::warn!("no detector registered for kind '{kind}', skipping"),
            }
        }
        results
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn run_isolated(detector: &dyn FraudDetector, ctx: &DetectionContext) -> Vec<CandidateCase> {
    log::info!("running detector '{}'", detector.kind());
    match detector.detect(ctx) {
        Ok(candidates) => {
            log::info!(
                "detector '{}' completed: {} candidates",
                detector.kind(),
                candidates.len()
            );
            candidates
        }
        Err(e) => {
            log::error!("detector '{}' failed: {e}", detector.kind());
            Vec::new()
        }
    }
}

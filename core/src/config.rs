//! Detector tuning parameters.
//!
//! Every threshold ships with a built-in default matching the business
//! rules the detectors were calibrated against; an optional JSON file
//! can override any subset. Detectors must work with no file present.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceTuning {
    /// Rolling window scanned on each run, in days.
    pub lookback_days: i64,
    /// Totals at or below this floor are never treated as round.
    pub round_amount_floor: f64,
    /// A total is round when it is an exact multiple of this value.
    pub round_amount_multiple: f64,
    /// Round invoices per client before a case is raised.
    pub round_count_min: usize,
    /// Round-invoice count at which severity escalates to High.
    pub round_count_high: usize,
    /// Discount-to-net percentage above which an invoice is flagged.
    pub max_discount_percent: f64,
    /// Discount percentage at which severity escalates to High.
    pub high_discount_percent: f64,
    /// Business hours: invoices stamped before this hour are after-hours.
    pub business_start_hour: u32,
    /// Invoices stamped after this hour are after-hours.
    pub business_end_hour: u32,
    /// After-hours invoices per client before a case is raised.
    pub afterhours_count_min: usize,
    /// After-hours count at which severity escalates to High.
    pub afterhours_count_high: usize,
}

impl Default for InvoiceTuning {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            round_amount_floor: 500.0,
            round_amount_multiple: 100.0,
            round_count_min: 3,
            round_count_high: 5,
            max_discount_percent: 30.0,
            high_discount_percent: 50.0,
            business_start_hour: 7,
            business_end_hour: 20,
            afterhours_count_min: 2,
            afterhours_count_high: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelTuning {
    /// Pre-filter applied in the source query to bound the row set.
    pub prefilter_quantity: f64,
    /// Single-dispatch quantity above which a case is raised.
    pub excessive_quantity: f64,
    /// Quantity above which the single-dispatch case is High severity.
    pub critical_quantity: f64,
    /// Same-day dispatches per client before a case is raised
    /// (strictly greater than).
    pub same_day_count: usize,
    /// Same-day count above which severity escalates to High.
    pub same_day_count_high: usize,
    /// Rolling window for the same-day grouping, in days.
    pub lookback_days: i64,
}

impl Default for FuelTuning {
    fn default() -> Self {
        Self {
            prefilter_quantity: 150.0,
            excessive_quantity: 200.0,
            critical_quantity: 300.0,
            same_day_count: 3,
            same_day_count_high: 5,
            lookback_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditTuning {
    /// Edits by one user in one day before a case is raised
    /// (strictly greater than).
    pub massive_changes_min: i64,
    /// Edit count above which severity escalates to High.
    pub massive_changes_critical: i64,
    /// Rolling window for the edit grouping, in days.
    pub edit_lookback_days: i64,
    /// Consecutive-number gap size that counts as significant
    /// (strictly greater than).
    pub sequence_gap_min: i64,
    /// Significant gaps per document type before a case is raised.
    pub sequence_gap_count_min: usize,
    /// Total missing numbers at which severity escalates to High.
    pub sequence_gap_total_high: i64,
    /// Minimum documents of a type before gap analysis is meaningful.
    pub sequence_min_documents: usize,
    /// Rolling window for the document query, in days.
    pub document_lookback_days: i64,
}

impl Default for EditTuning {
    fn default() -> Self {
        Self {
            massive_changes_min: 20,
            massive_changes_critical: 50,
            edit_lookback_days: 7,
            sequence_gap_min: 10,
            sequence_gap_count_min: 2,
            sequence_gap_total_high: 50,
            sequence_min_documents: 10,
            document_lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub invoice: InvoiceTuning,
    pub fuel: FuelTuning,
    pub edits: EditTuning,
}

impl DetectorConfig {
    /// Load overrides from a JSON file. Missing keys keep their
    /// built-in defaults; a missing file is the caller's signal to use
    /// `DetectorConfig::default()` instead.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: DetectorConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}

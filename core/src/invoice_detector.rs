//! Invoice anomaly detector.
//!
//! Three independent heuristics over recent invoices:
//!   1. Round-amount clustering per client
//!   2. Excessive discounts per invoice
//!   3. After-hours transaction grouping per client
//!
//! Each heuristic re-queries the source on its own and degrades to an
//! empty contribution on failure; a malformed date drops a row from
//! the after-hours check only.

use crate::{
    coerce::{parse_loose_datetime, safe_div, safe_f64},
    config::InvoiceTuning,
    detector::{already_cased, CandidateCase, DetectionContext, DetectorMetadata, FraudDetector},
    error::DetectResult,
    source::{InvoiceRow, DEFAULT_FETCH_LIMIT},
    types::{ClientRef, DetectorKind, Severity},
};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use std::collections::BTreeMap;

// ── Constants ────────────────────────────────────────────────────────────────

const ROUND_AMOUNT_CONFIDENCE: f64 = 75.0;
const DISCOUNT_CONFIDENCE: f64 = 85.0;
const AFTERHOURS_CONFIDENCE: f64 = 80.0;

/// Sale and credit invoice document types.
const INVOICE_DOC_TYPES: &[&str] = &["FC", "FV"];
/// After-hours also covers delivery notes.
const AFTERHOURS_DOC_TYPES: &[&str] = &["FC", "FV", "EB"];

const SOURCE_TABLE: &str = "invoice";

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct InvoiceAnomalyDetector {
    tuning: InvoiceTuning,
}

impl InvoiceAnomalyDetector {
    pub fn new(tuning: InvoiceTuning) -> Self {
        Self { tuning }
    }

    fn window_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - Duration::days(self.tuning.lookback_days)
    }

    /// Invoice total as billed: net + tax-exempt + tax.
    fn invoice_total(row: &InvoiceRow) -> f64 {
        safe_f64(row.net_amount) + safe_f64(row.exempt_amount) + safe_f64(row.tax_amount)
    }

    /// True when the row falls inside the lookback window. Rows whose
    /// date cannot be parsed stay in: the round and discount checks
    /// are date-independent and must still see them.
    fn in_window_or_undated(&self, parsed: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
        match parsed {
            Some(d) => d >= self.window_start(now) && d <= now,
            None => true,
        }
    }

    /// Heuristic 1: clients accumulating exact-multiple invoice totals.
    fn detect_round_amounts(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let invoices = ctx.source.invoices(INVOICE_DOC_TYPES, DEFAULT_FETCH_LIMIT)?;

        let mut by_client: BTreeMap<String, Vec<(&InvoiceRow, f64, Option<NaiveDateTime>)>> =
            BTreeMap::new();
        for row in &invoices {
            let parsed = parse_loose_datetime(row.issued_at.as_deref());
            if !self.in_window_or_undated(parsed, ctx.now) {
                continue;
            }
            let total = Self::invoice_total(row);
            if total > self.tuning.round_amount_floor
                && total % self.tuning.round_amount_multiple == 0.0
            {
                let client = row.client_code.clone().unwrap_or_else(|| "UNKNOWN".into());
                by_client.entry(client).or_default().push((row, total, parsed));
            }
        }

        for (client, rounds) in by_client {
            if rounds.len() < self.tuning.round_count_min {
                continue;
            }
            let group_id = format!("ROUND_{}_{}", client, rounds.len());
            if already_cased(ctx, SOURCE_TABLE, &group_id, DetectorKind::InvoiceAnomaly) {
                continue;
            }

            let total_amount: f64 = rounds.iter().map(|(_, t, _)| t).sum();
            let first = rounds[0].0;
            let client_label = first.client_name.clone().unwrap_or_else(|| client.clone());
            let severity = if rounds.len() < self.tuning.round_count_high {
                Severity::Medium
            } else {
                Severity::High
            };

            candidates.push(CandidateCase {
                title: format!("Suspicious round amounts - client {client_label}"),
                description: format!(
                    "{} invoices with exactly round totals for client {} in the last {} days. \
                     Accumulated total: ${:.2}",
                    rounds.len(),
                    client_label,
                    self.tuning.lookback_days,
                    total_amount
                ),
                kind: DetectorKind::InvoiceAnomaly,
                severity,
                amount: Some(total_amount),
                source_table: SOURCE_TABLE.into(),
                source_record_id: group_id,
                client: ClientRef {
                    code: first.client_code.clone(),
                    name: first.client_name.clone(),
                    tax_id: first.client_tax_id.clone(),
                },
                transaction_date: rounds.last().and_then(|(_, _, d)| *d),
                confidence: ROUND_AMOUNT_CONFIDENCE,
                detection_rule: serde_json::json!({
                    "rule": "round_amounts",
                    "count": rounds.len(),
                }),
            });
        }

        Ok(candidates)
    }

    /// Heuristic 2: discount exceeding the allowed share of net.
    fn detect_excessive_discounts(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let invoices = ctx
            .source
            .discounted_invoices(INVOICE_DOC_TYPES, DEFAULT_FETCH_LIMIT)?;

        for row in &invoices {
            let parsed = parse_loose_datetime(row.issued_at.as_deref());
            if !self.in_window_or_undated(parsed, ctx.now) {
                continue;
            }
            let discount = safe_f64(row.discount_amount);
            let net = safe_f64(row.net_amount);
            if discount <= 0.0 || net <= 0.0 {
                continue;
            }

            let discount_percent = safe_div(discount, net, 0.0) * 100.0;
            if discount_percent <= self.tuning.max_discount_percent {
                continue;
            }

            let record_id = row.seq_id.to_string();
            if already_cased(ctx, SOURCE_TABLE, &record_id, DetectorKind::InvoiceAnomaly) {
                continue;
            }

            let doc_label = row.doc_number.clone().unwrap_or_else(|| "N/A".into());
            let client_label = row.client_name.clone().unwrap_or_else(|| "unknown".into());
            let severity = if discount_percent > self.tuning.high_discount_percent {
                Severity::High
            } else {
                Severity::Medium
            };

            candidates.push(CandidateCase {
                title: format!("Excessive discount - invoice {doc_label}"),
                description: format!(
                    "{discount_percent:.1}% discount on invoice {doc_label}. \
                     Client: {client_label}. Net amount: ${net:.2}, discount: ${discount:.2}",
                ),
                kind: DetectorKind::InvoiceAnomaly,
                severity,
                amount: Some(discount),
                source_table: SOURCE_TABLE.into(),
                source_record_id: record_id,
                client: ClientRef {
                    code: row.client_code.clone(),
                    name: row.client_name.clone(),
                    tax_id: row.client_tax_id.clone(),
                },
                transaction_date: parsed,
                confidence: DISCOUNT_CONFIDENCE,
                detection_rule: serde_json::json!({
                    "rule": "excessive_discount",
                    "percent": discount_percent,
                }),
            });
        }

        Ok(candidates)
    }

    /// Heuristic 3: clients transacting outside business hours. Only
    /// the timestamp matters here, so rows without a net amount stay
    /// in.
    fn detect_after_hours(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let invoices = ctx.source.dated_invoices(AFTERHOURS_DOC_TYPES, DEFAULT_FETCH_LIMIT)?;

        let mut by_client: BTreeMap<String, Vec<(&InvoiceRow, NaiveDateTime)>> = BTreeMap::new();
        for row in &invoices {
            // Date-dependent check: unparseable dates drop out here.
            let Some(date) = parse_loose_datetime(row.issued_at.as_deref()) else {
                continue;
            };
            if date < self.window_start(ctx.now) || date > ctx.now {
                continue;
            }

            let hour = date.hour();
            let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
            if hour < self.tuning.business_start_hour
                || hour > self.tuning.business_end_hour
                || weekend
            {
                let client = row.client_code.clone().unwrap_or_else(|| "UNKNOWN".into());
                by_client.entry(client).or_default().push((row, date));
            }
        }

        for (client, hits) in by_client {
            if hits.len() < self.tuning.afterhours_count_min {
                continue;
            }
            let group_id = format!("AFTERHOURS_{}_{}", client, hits.len());
            if already_cased(ctx, SOURCE_TABLE, &group_id, DetectorKind::InvoiceAnomaly) {
                continue;
            }

            let total: f64 = hits.iter().map(|(row, _)| Self::invoice_total(row)).sum();
            let first = hits[0].0;
            let client_label = first.client_name.clone().unwrap_or_else(|| client.clone());
            let severity = if hits.len() < self.tuning.afterhours_count_high {
                Severity::Medium
            } else {
                Severity::High
            };

            candidates.push(CandidateCase {
                title: format!("After-hours transactions - {client_label}"),
                description: format!(
                    "{} transactions outside business hours ({}:00-{}:00 Mon-Fri) for client {}. \
                     Total: ${:.2}",
                    hits.len(),
                    self.tuning.business_start_hour,
                    self.tuning.business_end_hour,
                    client_label,
                    total
                ),
                kind: DetectorKind::InvoiceAnomaly,
                severity,
                amount: Some(total),
                source_table: SOURCE_TABLE.into(),
                source_record_id: group_id,
                client: ClientRef {
                    code: first.client_code.clone(),
                    name: first.client_name.clone(),
                    tax_id: first.client_tax_id.clone(),
                },
                transaction_date: hits.last().map(|(_, d)| *d),
                confidence: AFTERHOURS_CONFIDENCE,
                detection_rule: serde_json::json!({
                    "rule": "after_hours",
                    "count": hits.len(),
                }),
            });
        }

        Ok(candidates)
    }
}

impl FraudDetector for InvoiceAnomalyDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::InvoiceAnomaly
    }

    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            kind: DetectorKind::InvoiceAnomaly,
            name: "Invoice anomaly detector",
            description: "Flags anomalous invoice patterns: repeated round amounts, \
                          excessive discounts, transactions outside business hours",
            enabled_by_default: true,
            rules: vec![
                "Repetitive round totals (exact multiples of 100)",
                "Discounts above 30% of net",
                "Invoices outside business hours (7am-8pm)",
                "Invoices on weekends",
                "Multiple round invoices from the same client",
            ],
            thresholds: BTreeMap::from([
                ("round_amount_floor", self.tuning.round_amount_floor),
                ("round_amount_multiple", self.tuning.round_amount_multiple),
                ("round_count_min", self.tuning.round_count_min as f64),
                ("max_discount_percent", self.tuning.max_discount_percent),
                ("business_start_hour", self.tuning.business_start_hour as f64),
                ("business_end_hour", self.tuning.business_end_hour as f64),
                ("lookback_days", self.tuning.lookback_days as f64),
            ]),
        }
    }

    fn detect(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let heuristics = [
            ("round_amounts", self.detect_round_amounts(ctx)),
            ("excessive_discounts", self.detect_excessive_discounts(ctx)),
            ("after_hours", self.detect_after_hours(ctx)),
        ];
        for (label, result) in heuristics {
            match result {
                Ok(found) => candidates.extend(found),
                Err(e) => log::warn!("invoice_anomaly/{label} found nothing after error: {e}"),
            }
        }
        Ok(candidates)
    }
}

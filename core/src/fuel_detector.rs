//! Fuel theft detector.
//!
//! Two heuristics over dispatch records:
//!   1. Single dispatches above tank-capacity quantities
//!   2. Multiple same-day dispatches per client
//!
//! Client identity comes from a secondary lookup that degrades to
//! "unknown client" when the client table is unreachable. A dispatch
//! whose date fails to parse is excluded from day-grouping only.

use crate::{
    coerce::{parse_loose_datetime, safe_f64},
    config::FuelTuning,
    detector::{already_cased, CandidateCase, DetectionContext, DetectorMetadata, FraudDetector},
    error::DetectResult,
    source::{ClientRow, DispatchRow, DEFAULT_FETCH_LIMIT},
    types::{ClientRef, DetectorKind, Severity},
};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

// ── Constants ────────────────────────────────────────────────────────────────

const EXCESSIVE_DISPATCH_CONFIDENCE: f64 = 85.0;
const SAME_DAY_CONFIDENCE: f64 = 90.0;

/// Row cap for the overcapacity query; the >150 pre-filter keeps the
/// set small upstream.
const OVERCAPACITY_FETCH_LIMIT: usize = 300;
/// Row cap for the full client-lookup table.
const CLIENT_FETCH_LIMIT: usize = 5000;

const SOURCE_TABLE: &str = "fuel_dispatch";

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct FuelTheftDetector {
    tuning: FuelTuning,
}

impl FuelTheftDetector {
    pub fn new(tuning: FuelTuning) -> Self {
        Self { tuning }
    }

    /// Client lookup map. A failed query degrades to an empty map so
    /// dispatch candidates still go out with an unknown client.
    fn client_map(&self, ctx: &DetectionContext) -> BTreeMap<String, ClientRow> {
        match ctx.source.clients(CLIENT_FETCH_LIMIT) {
            Ok(clients) => clients.into_iter().map(|c| (c.code.clone(), c)).collect(),
            Err(e) => {
                log::warn!("fuel_theft client lookup failed, degrading to unknown: {e}");
                BTreeMap::new()
            }
        }
    }

    fn client_ref(clients: &BTreeMap<String, ClientRow>, code: Option<&str>) -> ClientRef {
        match code {
            Some(code) => match clients.get(code) {
                Some(c) => ClientRef {
                    code: Some(c.code.clone()),
                    name: c.name.clone(),
                    tax_id: c.tax_id.clone(),
                },
                None => ClientRef::from_code(Some(code.to_string())),
            },
            None => ClientRef::default(),
        }
    }

    /// Heuristic 1: one dispatch larger than any plausible tank.
    fn detect_overcapacity(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let dispatches = ctx
            .source
            .dispatches_over(self.tuning.prefilter_quantity, OVERCAPACITY_FETCH_LIMIT)?;
        let clients = self.client_map(ctx);

        for d in &dispatches {
            let quantity = safe_f64(d.quantity);
            if quantity <= self.tuning.excessive_quantity {
                continue;
            }

            let record_id = d.dispatch_no.to_string();
            if already_cased(ctx, SOURCE_TABLE, &record_id, DetectorKind::FuelTheft) {
                continue;
            }

            let client = Self::client_ref(&clients, d.client_code.as_deref());
            let client_label = client
                .name
                .clone()
                .or_else(|| client.code.clone())
                .unwrap_or_else(|| "unknown".into());
            let value = safe_f64(d.total_value);
            let severity = if quantity > self.tuning.critical_quantity {
                Severity::High
            } else {
                Severity::Medium
            };

            candidates.push(CandidateCase {
                title: format!("Excessive fuel dispatch - {quantity:.1} gallons"),
                description: format!(
                    "Abnormal dispatch of {quantity:.1} gallons. Client: {client_label}. \
                     Product: {}. Value: ${value:.2}",
                    d.product_name.as_deref().unwrap_or("N/A"),
                ),
                kind: DetectorKind::FuelTheft,
                severity,
                amount: d.total_value,
                source_table: SOURCE_TABLE.into(),
                source_record_id: record_id,
                client,
                transaction_date: parse_loose_datetime(d.dispatched_at.as_deref()),
                confidence: EXCESSIVE_DISPATCH_CONFIDENCE,
                detection_rule: serde_json::json!({
                    "rule": "excessive_dispatch",
                    "quantity": quantity,
                }),
            });
        }

        Ok(candidates)
    }

    /// Heuristic 2: a client refueling repeatedly on one calendar day.
    fn detect_same_day_multiples(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let dispatches = ctx.source.dispatches_with_client(DEFAULT_FETCH_LIMIT)?;
        let clients = self.client_map(ctx);

        let cutoff = ctx.now - Duration::days(self.tuning.lookback_days);
        let mut by_client_day: BTreeMap<(String, NaiveDate), Vec<&DispatchRow>> = BTreeMap::new();
        for d in &dispatches {
            let Some(date) = parse_loose_datetime(d.dispatched_at.as_deref()) else {
                continue;
            };
            if date < cutoff || date > ctx.now {
                continue;
            }
            let Some(client) = d.client_code.clone() else {
                continue;
            };
            by_client_day.entry((client, date.date())).or_default().push(d);
        }

        for ((client_code, day), group) in by_client_day {
            if group.len() <= self.tuning.same_day_count {
                continue;
            }
            let group_id = format!("MULTIPLE_{}_{}_{}", client_code, day, group.len());
            if already_cased(ctx, SOURCE_TABLE, &group_id, DetectorKind::FuelTheft) {
                continue;
            }

            let total_gallons: f64 = group.iter().map(|d| safe_f64(d.quantity)).sum();
            let total_value: f64 = group.iter().map(|d| safe_f64(d.total_value)).sum();
            let client = Self::client_ref(&clients, Some(&client_code));
            let client_label = client
                .name
                .clone()
                .unwrap_or_else(|| client_code.clone());
            let severity = if group.len() > self.tuning.same_day_count_high {
                Severity::High
            } else {
                Severity::Medium
            };

            candidates.push(CandidateCase {
                title: format!("Multiple same-day refuels - {client_label}"),
                description: format!(
                    "Client {client_label} made {} dispatches on {day}. \
                     Total: {total_gallons:.1} gallons, ${total_value:.2}",
                    group.len(),
                ),
                kind: DetectorKind::FuelTheft,
                severity,
                amount: Some(total_value),
                source_table: SOURCE_TABLE.into(),
                source_record_id: group_id,
                client,
                transaction_date: group
                    .first()
                    .and_then(|d| parse_loose_datetime(d.dispatched_at.as_deref())),
                confidence: SAME_DAY_CONFIDENCE,
                detection_rule: serde_json::json!({
                    "rule": "same_day_multiples",
                    "count": group.len(),
                }),
            });
        }

        Ok(candidates)
    }
}

impl FraudDetector for FuelTheftDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::FuelTheft
    }

    fn metadata(&self) -> DetectorMetadata {
        DetectorMetadata {
            kind: DetectorKind::FuelTheft,
            name: "Fuel theft detector",
            description: "Flags anomalous fuel dispatch patterns: excessive single \
                          dispatches and repeated same-day refuels",
            enabled_by_default: true,
            rules: vec![
                "Dispatches above 200 gallons",
                "More than 3 dispatches by one client on the same day",
                "Dispatches exceeding tank capacity",
            ],
            thresholds: BTreeMap::from([
                ("prefilter_quantity", self.tuning.prefilter_quantity),
                ("excessive_quantity", self.tuning.excessive_quantity),
                ("critical_quantity", self.tuning.critical_quantity),
                ("same_day_count", self.tuning.same_day_count as f64),
                ("lookback_days", self.tuning.lookback_days as f64),
            ]),
        }
    }

    fn detect(&self, ctx: &DetectionContext) -> DetectResult<Vec<CandidateCase>> {
        let mut candidates = Vec::new();
        let heuristics = [
            ("overcapacity", self.detect_overcapacity(ctx)),
            ("same_day_multiples", self.detect_same_day_multiples(ctx)),
        ];
        for (label, result) in heuristics {
            match result {
                Ok(found) => candidates.extend(found),
                Err(e) => log::warn!("fuel_theft/{label} found nothing after error: {e}"),
            }
        }
        Ok(candidates)
    }
}

//! Defensive scalar coercion for operational-store values.
//!
//! The upstream ERP returns dates as free-form text in inconsistent
//! locale formats (`D/M/YYYY H:MM:SS` with single-digit segments,
//! ISO variants, date-only strings) and numerics that may be NULL.
//! Everything pulled from the source store passes through these
//! helpers; they never return an error.

use chrono::{NaiveDate, NaiveDateTime};

/// Date/datetime layouts the source system has been observed to emit,
/// tried in order. chrono's numeric specifiers accept one- and
/// two-digit segments, which covers `1/2/2025 9:5:03`-style values.
const DATETIME_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

/// Parse a raw date value from the source store.
///
/// Returns None for NULL, empty, unrecognized layouts, and impossible
/// calendar dates (`31/2/2025`). Values longer than 19 characters are
/// truncated first; the ERP pads some columns with trailing garbage.
pub fn parse_loose_datetime(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let raw = if raw.len() > 19 {
        raw.get(..19).unwrap_or(raw)
    } else {
        raw
    };

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?);
        }
    }
    None
}

/// NULL-safe numeric coercion.
pub fn safe_f64(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

/// Division that treats a zero (or non-finite) denominator as
/// "no result" rather than a fault.
pub fn safe_div(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return default;
    }
    numerator / denominator
}

/// Extract the first contiguous digit run of a document number such as
/// `FV-001234`. Returns None when no digits exist or the run overflows
/// i64.
pub fn document_sequence_number(doc_number: &str) -> Option<i64> {
    let start = doc_number.find(|c: char| c.is_ascii_digit())?;
    let rest = &doc_number[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

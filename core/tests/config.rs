//! Tuning config: built-in defaults and partial JSON overrides.

use fraudwatch_core::config::DetectorConfig;

/// The built-in defaults carry the calibrated business thresholds.
#[test]
fn defaults_match_calibrated_thresholds() {
    let config = DetectorConfig::default();

    assert_eq!(config.invoice.lookback_days, 30);
    assert_eq!(config.invoice.round_amount_floor, 500.0);
    assert_eq!(config.invoice.round_count_min, 3);
    assert_eq!(config.invoice.max_discount_percent, 30.0);
    assert_eq!(config.invoice.business_start_hour, 7);
    assert_eq!(config.invoice.business_end_hour, 20);

    assert_eq!(config.fuel.excessive_quantity, 200.0);
    assert_eq!(config.fuel.critical_quantity, 300.0);
    assert_eq!(config.fuel.same_day_count, 3);
    assert_eq!(config.fuel.lookback_days, 7);

    assert_eq!(config.edits.massive_changes_min, 20);
    assert_eq!(config.edits.sequence_gap_min, 10);
    assert_eq!(config.edits.sequence_gap_count_min, 2);
}

/// A partial override file changes only the keys it names; the rest
/// keep their defaults.
#[test]
fn partial_override_keeps_defaults() {
    let config: DetectorConfig = serde_json::from_str(
        r#"{ "invoice": { "max_discount_percent": 45.0 }, "fuel": { "excessive_quantity": 180.0 } }"#,
    )
    .unwrap();

    assert_eq!(config.invoice.max_discount_percent, 45.0);
    assert_eq!(config.invoice.round_amount_floor, 500.0, "untouched key keeps default");
    assert_eq!(config.fuel.excessive_quantity, 180.0);
    assert_eq!(config.edits.massive_changes_min, 20);
}

/// An empty document is a fully default config.
#[test]
fn empty_document_is_default() {
    let config: DetectorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.invoice.lookback_days, 30);
    assert_eq!(config.fuel.same_day_count_high, 5);
}

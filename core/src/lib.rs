//! fraudwatch-core — rule-based fraud detection over operational data.
//!
//! The pipeline: detectors query the operational mirror (`source`),
//! apply their heuristics, pre-check candidates against the case store
//! (`case_store`), and the scan runner (`runner`) persists whatever
//! survives and notifies subscribers. The registry (`registry`) is the
//! only place detectors are wired together.

pub mod case_store;
pub mod coerce;
pub mod config;
pub mod detector;
pub mod edit_detector;
pub mod error;
pub mod fuel_detector;
pub mod invoice_detector;
pub mod registry;
pub mod runner;
pub mod source;
pub mod types;

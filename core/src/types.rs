//! Shared primitive types used across the detection pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fraud category a detector is responsible for.
///
/// `QuotaAbuse` and `LiquidationFraud` are declared extension points:
/// no builtin detector registers them, so requesting either from the
/// registry takes the unknown-kind path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    InvoiceAnomaly,
    FuelTheft,
    DataManipulation,
    QuotaAbuse,
    LiquidationFraud,
}

impl DetectorKind {
    /// Stable string tag used for the detector_kind column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoiceAnomaly => "invoice_anomaly",
            Self::FuelTheft => "fuel_theft",
            Self::DataManipulation => "data_manipulation",
            Self::QuotaAbuse => "quota_abuse",
            Self::LiquidationFraud => "liquidation_fraud",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoice_anomaly" => Ok(Self::InvoiceAnomaly),
            "fuel_theft" => Ok(Self::FuelTheft),
            "data_manipulation" => Ok(Self::DataManipulation),
            "quota_abuse" => Ok(Self::QuotaAbuse),
            "liquidation_fraud" => Ok(Self::LiquidationFraud),
            other => Err(format!("unknown detector kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Lifecycle of a persisted case. Detectors only ever produce
/// `Pending`; every other state is reached through an explicit
/// `update_status` call by an investigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Investigating,
    Confirmed,
    Rejected,
    Resolved,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Investigating => "investigating",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "investigating" => Ok(Self::Investigating),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown case status: {other}")),
        }
    }
}

/// Client identity attached to a candidate when the source row (or an
/// enrichment lookup) can supply it. All fields degrade to None.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRef {
    pub code: Option<String>,
    pub name: Option<String>,
    pub tax_id: Option<String>,
}

impl ClientRef {
    pub fn from_code(code: Option<String>) -> Self {
        Self {
            code,
            name: None,
            tax_id: None,
        }
    }
}

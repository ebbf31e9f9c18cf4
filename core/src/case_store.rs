//! SQLite persistence for the case-management store.
//!
//! RULE: Only this module talks SQL to the case database.
//! Detectors use the duplicate pre-check; the scan runner persists
//! candidates; investigators move statuses. Every mutation leaves an
//! audit row.

use crate::{
    detector::CandidateCase,
    error::DetectResult,
    types::{CaseStatus, ClientRef, DetectorKind, Severity},
};
use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection};
use std::str::FromStr;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A durably stored, uniquely numbered fraud case.
#[derive(Debug, Clone)]
pub struct PersistedCase {
    pub id: i64,
    pub case_number: String,
    pub kind: DetectorKind,
    pub severity: Severity,
    pub status: CaseStatus,
    pub title: String,
    pub description: String,
    pub amount: Option<f64>,
    pub source_table: String,
    pub source_record_id: String,
    pub transaction_date: Option<NaiveDateTime>,
    pub client: ClientRef,
    pub detected_at: NaiveDateTime,
    pub detection_rule: String,
    pub confidence: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub created_by: String,
    pub updated_by: Option<String>,
}

/// Filters for `get_cases`. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub kind: Option<DetectorKind>,
    pub detected_from: Option<NaiveDateTime>,
    pub detected_to: Option<NaiveDateTime>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub case_id: i64,
    pub action: String,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub actor: String,
    pub recorded_at: NaiveDateTime,
}

/// Aggregate counts and amounts over a detection-date range.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CaseStatistics {
    pub total_cases: i64,
    pub pending: i64,
    pub investigating: i64,
    pub confirmed: i64,
    pub rejected: i64,
    pub resolved: i64,
    pub total_amount: f64,
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub critical: i64,
}

pub struct CaseStore {
    conn: Connection,
}

impl CaseStore {
    pub fn open(path: &str) -> DetectResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (used in tests).
    pub fn in_memory() -> DetectResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DetectResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_fraud_cases.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_case_audit.sql"))?;
        Ok(())
    }

    // ── Duplicate guard ────────────────────────────────────────

    /// True when a case already exists for this (table, record, kind)
    /// triple. Cheap advisory check; the UNIQUE constraint backs it.
    pub fn case_exists(
        &self,
        source_table: &str,
        source_record_id: &str,
        kind: DetectorKind,
    ) -> DetectResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM fraud_case
             WHERE source_table = ?1 AND source_record_id = ?2 AND detector_kind = ?3",
            params![source_table, source_record_id, kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ── Case lifecycle ─────────────────────────────────────────

    /// Persist a candidate. Returns None when the dedup triple is
    /// already taken — the INSERT is a no-op in that case, so two
    /// concurrent scans can never create twin cases.
    pub fn create_case(
        &self,
        candidate: &CandidateCase,
        now: NaiveDateTime,
    ) -> DetectResult<Option<PersistedCase>> {
        let case_number = new_case_number(now);
        let now_str = now.format(TS_FORMAT).to_string();
        let rule_json = serde_json::to_string(&candidate.detection_rule)?;

        let inserted = self.conn.execute(
            "INSERT INTO fraud_case (
                case_number, detector_kind, severity, status,
                title, description, amount,
                source_table, source_record_id, transaction_date,
                client_code, client_name, client_tax_id,
                detected_at, detection_rule, confidence,
                created_at, updated_at, created_by
             ) VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?8, ?9,
                       ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16, 'system')
             ON CONFLICT (source_table, source_record_id, detector_kind) DO NOTHING",
            params![
                case_number,
                candidate.kind.as_str(),
                candidate.severity.as_str(),
                candidate.title,
                candidate.description,
                candidate.amount,
                candidate.source_table,
                candidate.source_record_id,
                candidate
                    .transaction_date
                    .map(|d| d.format(TS_FORMAT).to_string()),
                candidate.client.code,
                candidate.client.name,
                candidate.client.tax_id,
                now_str,
                rule_json,
                candidate.confidence,
                now_str,
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }

        let case_id = self.conn.last_insert_rowid();
        self.append_audit(
            case_id,
            "create_case",
            None,
            Some(&serde_json::to_string(candidate)?),
            "system",
            now,
        )?;

        let case = self.get_case(case_id)?.ok_or_else(|| {
            anyhow::anyhow!("case {case_id} vanished immediately after insert")
        })?;
        Ok(Some(case))
    }

    pub fn get_case(&self, case_id: i64) -> DetectResult<Option<PersistedCase>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CASE_SELECT} WHERE id = ?1"
        ))?;
        let case = stmt
            .query_row(params![case_id], case_row_mapper)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(case)
    }

    /// Cases matching the filter, most recently detected first.
    pub fn get_cases(&self, filter: &CaseFilter) -> DetectResult<Vec<PersistedCase>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(status.as_str().to_string());
        }
        if let Some(kind) = filter.kind {
            conditions.push("detector_kind = ?");
            values.push(kind.as_str().to_string());
        }
        if let Some(from) = filter.detected_from {
            conditions.push("detected_at >= ?");
            values.push(from.format(TS_FORMAT).to_string());
        }
        if let Some(to) = filter.detected_to {
            conditions.push("detected_at <= ?");
            values.push(to.format(TS_FORMAT).to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(100);
        let sql = format!(
            "{CASE_SELECT} {where_clause} ORDER BY detected_at DESC, id DESC LIMIT {limit}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), case_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Move a case through its status lifecycle. Returns false when
    /// the case does not exist. The transition is recorded in the
    /// audit trail with the acting user and optional notes.
    pub fn update_status(
        &self,
        case_id: i64,
        new_status: CaseStatus,
        actor: &str,
        notes: Option<&str>,
    ) -> DetectResult<bool> {
        let old_status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM fraud_case WHERE id = ?1",
                params![case_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(old_status) = old_status else {
            return Ok(false);
        };

        let now = chrono::Local::now().naive_local();
        self.conn.execute(
            "UPDATE fraud_case SET status = ?1, updated_by = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                new_status.as_str(),
                actor,
                now.format(TS_FORMAT).to_string(),
                case_id
            ],
        )?;

        self.append_audit(
            case_id,
            "update_status",
            Some(&serde_json::json!({ "status": old_status }).to_string()),
            Some(
                &serde_json::json!({ "status": new_status.as_str(), "notes": notes }).to_string(),
            ),
            actor,
            now,
        )?;
        Ok(true)
    }

    // ── Audit trail ────────────────────────────────────────────

    pub fn append_audit(
        &self,
        case_id: i64,
        action: &str,
        old_values: Option<&str>,
        new_values: Option<&str>,
        actor: &str,
        now: NaiveDateTime,
    ) -> DetectResult<()> {
        self.conn.execute(
            "INSERT INTO case_audit (case_id, action, old_values, new_values, actor, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                case_id,
                action,
                old_values,
                new_values,
                actor,
                now.format(TS_FORMAT).to_string()
            ],
        )?;
        Ok(())
    }

    pub fn audit_entries(&self, case_id: i64) -> DetectResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, action, old_values, new_values, actor, recorded_at
             FROM case_audit WHERE case_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![case_id], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                case_id: row.get(1)?,
                action: row.get(2)?,
                old_values: row.get(3)?,
                new_values: row.get(4)?,
                actor: row.get(5)?,
                recorded_at: parse_ts_col(row.get::<_, String>(6)?, 6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Statistics ─────────────────────────────────────────────

    /// Aggregate counts and amount over a detection-date range.
    /// Open-ended bounds are allowed on either side.
    pub fn get_statistics(
        &self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> DetectResult<CaseStatistics> {
        let from_str = from
            .map(|d| d.format(TS_FORMAT).to_string())
            .unwrap_or_else(|| "0000-01-01 00:00:00".to_string());
        let to_str = to
            .map(|d| d.format(TS_FORMAT).to_string())
            .unwrap_or_else(|| "9999-12-31 23:59:59".to_string());

        let mut stats = CaseStatistics::default();

        let (total, amount): (i64, f64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0.0)
             FROM fraud_case WHERE detected_at >= ?1 AND detected_at <= ?2",
            params![from_str, to_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total_cases = total;
        stats.total_amount = amount;

        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM fraud_case
             WHERE detected_at >= ?1 AND detected_at <= ?2
             GROUP BY status",
        )?;
        let status_counts = stmt
            .query_map(params![from_str, to_str], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (status, count) in status_counts {
            match CaseStatus::from_str(&status) {
                Ok(CaseStatus::Pending) => stats.pending = count,
                Ok(CaseStatus::Investigating) => stats.investigating = count,
                Ok(CaseStatus::Confirmed) => stats.confirmed = count,
                Ok(CaseStatus::Rejected) => stats.rejected = count,
                Ok(CaseStatus::Resolved) => stats.resolved = count,
                Err(e) => log::warn!("statistics skipped unknown status: {e}"),
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT severity, COUNT(*) FROM fraud_case
             WHERE detected_at >= ?1 AND detected_at <= ?2
             GROUP BY severity",
        )?;
        let severity_counts = stmt
            .query_map(params![from_str, to_str], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (severity, count) in severity_counts {
            match Severity::from_str(&severity) {
                Ok(Severity::Low) => stats.low = count,
                Ok(Severity::Medium) => stats.medium = count,
                Ok(Severity::High) => stats.high = count,
                Ok(Severity::Critical) => stats.critical = count,
                Err(e) => log::warn!("statistics skipped unknown severity: {e}"),
            }
        }

        Ok(stats)
    }

    // ── Test / summary helpers ─────────────────────────────────

    pub fn case_count(&self) -> DetectResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM fraud_case", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn case_count_for_kind(&self, kind: DetectorKind) -> DetectResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM fraud_case WHERE detector_kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

const CASE_SELECT: &str = "SELECT id, case_number, detector_kind, severity, status,
        title, description, amount,
        source_table, source_record_id, transaction_date,
        client_code, client_name, client_tax_id,
        detected_at, detection_rule, confidence,
        created_at, updated_at, created_by, updated_by
 FROM fraud_case";

fn case_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedCase> {
    Ok(PersistedCase {
        id: row.get(0)?,
        case_number: row.get(1)?,
        kind: parse_enum_col(row.get::<_, String>(2)?, 2)?,
        severity: parse_enum_col(row.get::<_, String>(3)?, 3)?,
        status: parse_enum_col(row.get::<_, String>(4)?, 4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        amount: row.get(7)?,
        source_table: row.get(8)?,
        source_record_id: row.get(9)?,
        transaction_date: row
            .get::<_, Option<String>>(10)?
            .map(|s| parse_ts_col(s, 10))
            .transpose()?,
        client: ClientRef {
            code: row.get(11)?,
            name: row.get(12)?,
            tax_id: row.get(13)?,
        },
        detected_at: parse_ts_col(row.get::<_, String>(14)?, 14)?,
        detection_rule: row.get(15)?,
        confidence: row.get(16)?,
        created_at: parse_ts_col(row.get::<_, String>(17)?, 17)?,
        updated_at: parse_ts_col(row.get::<_, String>(18)?, 18)?,
        created_by: row.get(19)?,
        updated_by: row.get(20)?,
    })
}

fn parse_enum_col<T: FromStr<Err = String>>(value: String, idx: usize) -> rusqlite::Result<T> {
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn parse_ts_col(value: String, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&value, TS_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

/// `CASE-YYYYMMDD-XXXXXXXX`: detection date plus a random fragment.
fn new_case_number(now: NaiveDateTime) -> String {
    let fragment = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "CASE-{}-{}",
        now.format("%Y%m%d"),
        fragment[..8].to_uppercase()
    )
}

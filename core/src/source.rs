//! Read-only access to the operational transaction mirror.
//!
//! RULE: Only this module talks SQL to the operational store.
//! Detectors call the typed query methods and never see a connection.
//!
//! The mirror keeps the ERP's loose typing: dates are TEXT in whatever
//! format the upstream system wrote them, numerics are nullable. All
//! date filtering therefore happens in the detectors, after the rows
//! have passed through the coercion helpers. Every query takes a row
//! cap so a misbehaving table cannot balloon a scan.

use crate::error::DetectResult;
use rusqlite::{params, params_from_iter, Connection};

/// Default row cap, matching the fetch window the upstream driver used.
pub const DEFAULT_FETCH_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct InvoiceRow {
    pub seq_id: i64,
    pub doc_type: String,
    pub doc_number: Option<String>,
    pub issued_at: Option<String>,
    pub client_code: Option<String>,
    pub client_name: Option<String>,
    pub client_tax_id: Option<String>,
    pub net_amount: Option<f64>,
    pub exempt_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub discount_amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DispatchRow {
    pub dispatch_no: i64,
    pub dispatched_at: Option<String>,
    pub quantity: Option<f64>,
    pub total_value: Option<f64>,
    pub product_name: Option<String>,
    pub client_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientRow {
    pub code: String,
    pub name: Option<String>,
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EditLogRow {
    pub user_code: Option<String>,
    pub edited_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub doc_type: String,
    pub doc_number: Option<String>,
    pub issued_at: Option<String>,
}

pub struct SourceDb {
    conn: Connection,
}

impl SourceDb {
    pub fn open(path: &str) -> DetectResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory mirror (used in tests and demo seeding).
    pub fn in_memory() -> DetectResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn })
    }

    /// Create the mirror tables. The loader tool calls this before
    /// pulling a fresh extract; queries work against whatever is there.
    pub fn ensure_schema(&self) -> DetectResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS invoice (
                seq_id          INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_type        TEXT NOT NULL,
                doc_number      TEXT,
                issued_at       TEXT,
                client_code     TEXT,
                net_amount      REAL,
                exempt_amount   REAL,
                tax_amount      REAL,
                discount_amount REAL
            );
            CREATE TABLE IF NOT EXISTS fuel_dispatch (
                dispatch_no   INTEGER PRIMARY KEY AUTOINCREMENT,
                dispatched_at TEXT,
                quantity      REAL,
                total_value   REAL,
                product_name  TEXT,
                client_code   TEXT
            );
            CREATE TABLE IF NOT EXISTS client (
                code   TEXT PRIMARY KEY,
                name   TEXT,
                tax_id TEXT
            );
            CREATE TABLE IF NOT EXISTS edit_log (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_code TEXT,
                edited_at TEXT
            );",
        )?;
        Ok(())
    }

    // ── Invoices ───────────────────────────────────────────────

    /// Invoices of the given document types, newest rows last, joined
    /// with the client table for identity enrichment. Rows without a
    /// net amount are excluded (they are header stubs upstream).
    pub fn invoices(&self, doc_types: &[&str], limit: usize) -> DetectResult<Vec<InvoiceRow>> {
        let placeholders = vec!["?"; doc_types.len()].join(",");
        let sql = format!(
            "SELECT i.seq_id, i.doc_type, i.doc_number, i.issued_at,
                    i.client_code, c.name, c.tax_id,
                    i.net_amount, i.exempt_amount, i.tax_amount, i.discount_amount
             FROM invoice i
             LEFT JOIN client c ON i.client_code = c.code
             WHERE i.doc_type IN ({placeholders})
               AND i.net_amount IS NOT NULL
             ORDER BY i.seq_id ASC
             LIMIT {limit}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(doc_types.iter()), invoice_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Invoices carrying a positive discount against a positive net
    /// amount. The positivity filter lives in SQL to bound the row set.
    pub fn discounted_invoices(
        &self,
        doc_types: &[&str],
        limit: usize,
    ) -> DetectResult<Vec<InvoiceRow>> {
        let placeholders = vec!["?"; doc_types.len()].join(",");
        let sql = format!(
            "SELECT i.seq_id, i.doc_type, i.doc_number, i.issued_at,
                    i.client_code, c.name, c.tax_id,
                    i.net_amount, i.exempt_amount, i.tax_amount, i.discount_amount
             FROM invoice i
             LEFT JOIN client c ON i.client_code = c.code
             WHERE i.doc_type IN ({placeholders})
               AND i.discount_amount IS NOT NULL AND i.discount_amount > 0
               AND i.net_amount IS NOT NULL AND i.net_amount > 0
             ORDER BY i.seq_id ASC
             LIMIT {limit}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(doc_types.iter()), invoice_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Invoices that carry a date stamp, regardless of amounts. The
    /// after-hours check only needs the timestamp, so a NULL net must
    /// not exclude a row here.
    pub fn dated_invoices(&self, doc_types: &[&str], limit: usize) -> DetectResult<Vec<InvoiceRow>> {
        let placeholders = vec!["?"; doc_types.len()].join(",");
        let sql = format!(
            "SELECT i.seq_id, i.doc_type, i.doc_number, i.issued_at,
                    i.client_code, c.name, c.tax_id,
                    i.net_amount, i.exempt_amount, i.tax_amount, i.discount_amount
             FROM invoice i
             LEFT JOIN client c ON i.client_code = c.code
             WHERE i.doc_type IN ({placeholders})
               AND i.issued_at IS NOT NULL
             ORDER BY i.seq_id ASC
             LIMIT {limit}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(doc_types.iter()), invoice_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Documents of the given types that carry a document number, for
    /// sequence analysis. Date scoping happens in the detector.
    pub fn documents(&self, doc_types: &[&str], limit: usize) -> DetectResult<Vec<DocumentRow>> {
        let placeholders = vec!["?"; doc_types.len()].join(",");
        let sql = format!(
            "SELECT doc_type, doc_number, issued_at
             FROM invoice
             WHERE doc_type IN ({placeholders}) AND doc_number IS NOT NULL
             ORDER BY doc_type, doc_number
             LIMIT {limit}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(doc_types.iter()), |row| {
            Ok(DocumentRow {
                doc_type: row.get(0)?,
                doc_number: row.get(1)?,
                issued_at: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Fuel dispatches ────────────────────────────────────────

    /// Dispatches above a quantity pre-filter. The threshold check
    /// proper happens in the detector; this bounds the query.
    pub fn dispatches_over(&self, min_quantity: f64, limit: usize) -> DetectResult<Vec<DispatchRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT dispatch_no, dispatched_at, quantity, total_value, product_name, client_code
             FROM fuel_dispatch
             WHERE quantity > ?1
             ORDER BY dispatch_no ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![min_quantity, limit as i64], dispatch_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All dispatches attributed to a client, for day-level grouping.
    pub fn dispatches_with_client(&self, limit: usize) -> DetectResult<Vec<DispatchRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT dispatch_no, dispatched_at, quantity, total_value, product_name, client_code
             FROM fuel_dispatch
             WHERE client_code IS NOT NULL
             ORDER BY dispatch_no ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], dispatch_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Clients ────────────────────────────────────────────────

    pub fn clients(&self, limit: usize) -> DetectResult<Vec<ClientRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, tax_id FROM client ORDER BY code LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ClientRow {
                code: row.get(0)?,
                name: row.get(1)?,
                tax_id: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Edit log ───────────────────────────────────────────────

    pub fn edit_log_entries(&self, limit: usize) -> DetectResult<Vec<EditLogRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_code, edited_at
             FROM edit_log
             WHERE edited_at IS NOT NULL
             ORDER BY id ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(EditLogRow {
                user_code: row.get(0)?,
                edited_at: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Loaders (seed tool and tests) ──────────────────────────

    pub fn insert_client(&self, code: &str, name: Option<&str>, tax_id: Option<&str>) -> DetectResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO client (code, name, tax_id) VALUES (?1, ?2, ?3)",
            params![code, name, tax_id],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_invoice(
        &self,
        doc_type: &str,
        doc_number: Option<&str>,
        issued_at: Option<&str>,
        client_code: Option<&str>,
        net_amount: Option<f64>,
        exempt_amount: Option<f64>,
        tax_amount: Option<f64>,
        discount_amount: Option<f64>,
    ) -> DetectResult<i64> {
        self.conn.execute(
            "INSERT INTO invoice (
                doc_type, doc_number, issued_at, client_code,
                net_amount, exempt_amount, tax_amount, discount_amount
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc_type,
                doc_number,
                issued_at,
                client_code,
                net_amount,
                exempt_amount,
                tax_amount,
                discount_amount
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_dispatch(
        &self,
        dispatched_at: Option<&str>,
        quantity: Option<f64>,
        total_value: Option<f64>,
        product_name: Option<&str>,
        client_code: Option<&str>,
    ) -> DetectResult<i64> {
        self.conn.execute(
            "INSERT INTO fuel_dispatch (dispatched_at, quantity, total_value, product_name, client_code)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![dispatched_at, quantity, total_value, product_name, client_code],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_edit(&self, user_code: Option<&str>, edited_at: Option<&str>) -> DetectResult<()> {
        self.conn.execute(
            "INSERT INTO edit_log (user_code, edited_at) VALUES (?1, ?2)",
            params![user_code, edited_at],
        )?;
        Ok(())
    }
}

fn invoice_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok(InvoiceRow {
        seq_id: row.get(0)?,
        doc_type: row.get(1)?,
        doc_number: row.get(2)?,
        issued_at: row.get(3)?,
        client_code: row.get(4)?,
        client_name: row.get(5)?,
        client_tax_id: row.get(6)?,
        net_amount: row.get(7)?,
        exempt_amount: row.get(8)?,
        tax_amount: row.get(9)?,
        discount_amount: row.get(10)?,
    })
}

fn dispatch_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<DispatchRow> {
    Ok(DispatchRow {
        dispatch_no: row.get(0)?,
        dispatched_at: row.get(1)?,
        quantity: row.get(2)?,
        total_value: row.get(3)?,
        product_name: row.get(4)?,
        client_code: row.get(5)?,
    })
}

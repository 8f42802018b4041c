//! SQLite persistence for documents, company profiles and financial metrics.
//!
//! Every write is an upsert on a business identity key:
//!
//! | Table               | Identity key                                          |
//! |---------------------|-------------------------------------------------------|
//! | `documents`         | `sha256`                                              |
//! | `company_profiles`  | `(document_id, name)`                                 |
//! | `financial_metrics` | `(company_profile_id, metric_name, column_label, value_kind)` |
//!
//! Each upsert runs inside an `IMMEDIATE` transaction, so the lookup and the
//! write happen under SQLite's write lock. The keys are also `UNIQUE` in the
//! schema; two writers racing on one key can never produce a duplicate row.
//!
//! Errors are returned as [`rusqlite::Error`] without retry. The orchestrator
//! attaches the step and key before surfacing them.

use crate::types::{PeriodKind, ValueKind};
use chrono::{NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Records ──────────────────────────────────────────────────────────────

/// A document to register, identified by its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub content_hash: String,
    pub filename: String,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub content_hash: String,
    pub filename: String,
    pub page_count: usize,
    pub created_at: String,
}

/// Company profile fields, keyed by `(document_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompanyProfile {
    pub document_id: String,
    pub name: String,
    pub description: Option<String>,
    pub geography: Option<String>,
    pub fund_role: Option<String>,
    pub first_investment_date: Option<NaiveDate>,
    pub investment_type: Option<String>,
    pub source_page: Option<u32>,
    pub source_quote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCompanyProfile {
    pub id: String,
    #[serde(flatten)]
    pub profile: NewCompanyProfile,
}

/// A fully resolved metric. `value` is not optional: unresolved records
/// cannot be expressed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFinancialMetric {
    pub company_profile_id: String,
    pub metric_name: String,
    pub source_label: String,
    pub column_label: String,
    pub value_kind: ValueKind,
    pub value: f64,
    pub currency: Option<String>,
    pub unit: Option<String>,
    pub fiscal_year: Option<i32>,
    pub period_kind: Option<PeriodKind>,
    pub period_label: Option<String>,
    pub source_page: Option<u32>,
    pub source_quote: Option<String>,
}

impl NewFinancialMetric {
    /// Human-readable identity key, used in error context.
    pub fn identity_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.company_profile_id, self.metric_name, self.column_label, self.value_kind
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetric {
    pub id: String,
    #[serde(flatten)]
    pub metric: NewFinancialMetric,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub documents: usize,
    pub company_profiles: usize,
    pub financial_metrics: usize,
}

// ── Column mapping ───────────────────────────────────────────────────────

impl ToSql for ValueKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ValueKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ValueKind::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown value kind '{s}'").into()))
    }
}

impl ToSql for PeriodKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PeriodKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        PeriodKind::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown period kind '{s}'").into()))
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Handle to the extraction database.
///
/// The connection sits behind a mutex; every method takes the lock for the
/// duration of one statement or transaction and never across an `.await`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        // WAL for crash recovery and concurrent readers.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    /// A private in-memory database, mostly for tests.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        setup_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a document; an existing row with the same hash is returned
    /// unmodified.
    pub fn upsert_document(&self, doc: &NewDocument) -> rusqlite::Result<String> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM documents WHERE sha256 = ?1",
                params![doc.content_hash],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                debug!("Document {} already registered as {}", doc.content_hash, id);
                id
            }
            None => {
                let id = new_id();
                tx.execute(
                    "INSERT INTO documents (id, filename, sha256, page_count, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id,
                        doc.filename,
                        doc.content_hash,
                        doc.page_count as i64,
                        now()
                    ],
                )?;
                id
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Insert or overwrite a company profile keyed by `(document_id, name)`.
    pub fn upsert_company_profile(&self, p: &NewCompanyProfile) -> rusqlite::Result<String> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM company_profiles WHERE document_id = ?1 AND name = ?2",
                params![p.document_id, p.name],
                |row| row.get(0),
            )
            .optional()?;

        let date = p
            .first_investment_date
            .map(|d| d.format(DATE_FORMAT).to_string());

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE company_profiles SET
                        description = ?2, geography = ?3, fund_role = ?4,
                        first_investment_date = ?5, investment_type = ?6,
                        source_page = ?7, source_quote = ?8, updated_at = ?9
                     WHERE id = ?1",
                    params![
                        id,
                        p.description,
                        p.geography,
                        p.fund_role,
                        date,
                        p.investment_type,
                        p.source_page,
                        p.source_quote,
                        now()
                    ],
                )?;
                id
            }
            None => {
                let id = new_id();
                let ts = now();
                tx.execute(
                    "INSERT INTO company_profiles (
                        id, document_id, name, description, geography, fund_role,
                        first_investment_date, investment_type, source_page, source_quote,
                        created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        id,
                        p.document_id,
                        p.name,
                        p.description,
                        p.geography,
                        p.fund_role,
                        date,
                        p.investment_type,
                        p.source_page,
                        p.source_quote,
                        ts,
                        ts
                    ],
                )?;
                id
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Insert or overwrite a metric keyed by
    /// `(company_profile_id, metric_name, column_label, value_kind)`.
    pub fn upsert_financial_metric(&self, m: &NewFinancialMetric) -> rusqlite::Result<String> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM financial_metrics
                 WHERE company_profile_id = ?1 AND metric_name = ?2
                   AND column_label = ?3 AND value_kind = ?4",
                params![m.company_profile_id, m.metric_name, m.column_label, m.value_kind],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE financial_metrics SET
                        source_label = ?2, value = ?3, currency = ?4, unit = ?5,
                        fiscal_year = ?6, period_kind = ?7, period_label = ?8,
                        source_page = ?9, source_quote = ?10, updated_at = ?11
                     WHERE id = ?1",
                    params![
                        id,
                        m.source_label,
                        m.value,
                        m.currency,
                        m.unit,
                        m.fiscal_year,
                        m.period_kind,
                        m.period_label,
                        m.source_page,
                        m.source_quote,
                        now()
                    ],
                )?;
                id
            }
            None => {
                let id = new_id();
                let ts = now();
                tx.execute(
                    "INSERT INTO financial_metrics (
                        id, company_profile_id, metric_name, source_label, column_label,
                        value_kind, value, currency, unit, fiscal_year, period_kind,
                        period_label, source_page, source_quote, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    params![
                        id,
                        m.company_profile_id,
                        m.metric_name,
                        m.source_label,
                        m.column_label,
                        m.value_kind,
                        m.value,
                        m.currency,
                        m.unit,
                        m.fiscal_year,
                        m.period_kind,
                        m.period_label,
                        m.source_page,
                        m.source_quote,
                        ts,
                        ts
                    ],
                )?;
                id
            }
        };

        tx.commit()?;
        Ok(id)
    }

    pub fn document_by_hash(&self, content_hash: &str) -> rusqlite::Result<Option<StoredDocument>> {
        self.lock()
            .query_row(
                "SELECT id, sha256, filename, page_count, created_at
                 FROM documents WHERE sha256 = ?1",
                params![content_hash],
                |row| {
                    Ok(StoredDocument {
                        id: row.get(0)?,
                        content_hash: row.get(1)?,
                        filename: row.get(2)?,
                        page_count: row.get::<_, i64>(3)? as usize,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
    }

    pub fn company_profile(&self, id: &str) -> rusqlite::Result<Option<StoredCompanyProfile>> {
        self.lock()
            .query_row(
                "SELECT id, document_id, name, description, geography, fund_role,
                        first_investment_date, investment_type, source_page, source_quote
                 FROM company_profiles WHERE id = ?1",
                params![id],
                profile_from_row,
            )
            .optional()
    }

    /// All metrics of a profile, ordered by metric name then column label.
    pub fn metrics_for_profile(&self, company_profile_id: &str) -> rusqlite::Result<Vec<StoredMetric>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, company_profile_id, metric_name, source_label, column_label,
                    value_kind, value, currency, unit, fiscal_year, period_kind,
                    period_label, source_page, source_quote
             FROM financial_metrics
             WHERE company_profile_id = ?1
             ORDER BY metric_name, column_label, value_kind",
        )?;
        let rows = stmt.query_map(params![company_profile_id], metric_from_row)?;
        rows.collect()
    }

    pub fn counts(&self) -> rusqlite::Result<TableCounts> {
        let conn = self.lock();
        let count = |table: &str| -> rusqlite::Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(TableCounts {
            documents: count("documents")?,
            company_profiles: count("company_profiles")?,
            financial_metrics: count("financial_metrics")?,
        })
    }

    /// Delete a document together with its profiles and metrics.
    /// Returns `false` when no such document exists. Test-only: the pipeline
    /// never deletes; this exercises the `ON DELETE CASCADE` ownership.
    #[cfg(test)]
    fn delete_document(&self, id: &str) -> rusqlite::Result<bool> {
        let n = self
            .lock()
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }
}

fn setup_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            sha256 TEXT NOT NULL UNIQUE,
            page_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS company_profiles (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            geography TEXT,
            fund_role TEXT,
            first_investment_date TEXT,
            investment_type TEXT,
            source_page INTEGER,
            source_quote TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (document_id, name)
        );

        CREATE TABLE IF NOT EXISTS financial_metrics (
            id TEXT PRIMARY KEY,
            company_profile_id TEXT NOT NULL REFERENCES company_profiles(id) ON DELETE CASCADE,
            metric_name TEXT NOT NULL,
            source_label TEXT NOT NULL,
            column_label TEXT NOT NULL,
            value_kind TEXT NOT NULL DEFAULT 'actual',
            value REAL NOT NULL,
            currency TEXT,
            unit TEXT,
            fiscal_year INTEGER,
            period_kind TEXT,
            period_label TEXT,
            source_page INTEGER,
            source_quote TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (company_profile_id, metric_name, column_label, value_kind)
        );

        CREATE INDEX IF NOT EXISTS idx_profiles_document ON company_profiles(document_id);
        CREATE INDEX IF NOT EXISTS idx_metrics_profile ON financial_metrics(company_profile_id);",
    )
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<StoredCompanyProfile> {
    let date: Option<String> = row.get(6)?;
    Ok(StoredCompanyProfile {
        id: row.get(0)?,
        profile: NewCompanyProfile {
            document_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            geography: row.get(4)?,
            fund_role: row.get(5)?,
            first_investment_date: date.and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
            investment_type: row.get(7)?,
            source_page: row.get(8)?,
            source_quote: row.get(9)?,
        },
    })
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMetric> {
    Ok(StoredMetric {
        id: row.get(0)?,
        metric: NewFinancialMetric {
            company_profile_id: row.get(1)?,
            metric_name: row.get(2)?,
            source_label: row.get(3)?,
            column_label: row.get(4)?,
            value_kind: row.get(5)?,
            value: row.get(6)?,
            currency: row.get(7)?,
            unit: row.get(8)?,
            fiscal_year: row.get(9)?,
            period_kind: row.get(10)?,
            period_label: row.get(11)?,
            source_page: row.get(12)?,
            source_quote: row.get(13)?,
        },
    })
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

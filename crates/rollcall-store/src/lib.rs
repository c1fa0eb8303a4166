//! rollcall-store: SQLite persistence for employees and attendance.
//!
//! Attendance rows carry no uniqueness constraint; deduplication is the
//! recognition pipeline's job. Each call opens its own connection so the
//! store can be shared freely between the loop thread and request handlers.

use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::{AttendanceStore, Employee, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp layout used in the `attendance.timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE,
    department TEXT,
    position TEXT
);
CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id INTEGER,
    timestamp DATETIME,
    FOREIGN KEY(employee_id) REFERENCES employees(id)
);
";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("employee already exists: {0}")]
    DuplicateEmployee(String),
}

/// One attendance row joined with its employee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub name: String,
    pub department: Option<String>,
    pub timestamp: String,
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { path };
        store.connect()?.execute_batch(SCHEMA)?;
        tracing::info!(path = %store.path.display(), "attendance database ready");
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, DbError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn add_employee(
        &self,
        name: &str,
        department: Option<&str>,
        position: Option<&str>,
    ) -> Result<i64, DbError> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT INTO employees (name, department, position) VALUES (?1, ?2, ?3)",
            params![name, department, position],
        );

        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(DbError::DuplicateEmployee(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn employee_by_name(&self, name: &str) -> Result<Option<Employee>, DbError> {
        let conn = self.connect()?;
        let employee = conn
            .query_row(
                "SELECT id, name, department, position FROM employees WHERE name = ?1",
                params![name],
                row_to_employee,
            )
            .optional()?;
        Ok(employee)
    }

    pub fn list_employees(&self) -> Result<Vec<Employee>, DbError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, name, department, position FROM employees ORDER BY name")?;
        let rows = stmt.query_map([], row_to_employee)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn record_attendance(&self, employee_id: i64, timestamp: NaiveDateTime) -> Result<(), DbError> {
        self.connect()?.execute(
            "INSERT INTO attendance (employee_id, timestamp) VALUES (?1, ?2)",
            params![employee_id, timestamp.format(TIMESTAMP_FORMAT).to_string()],
        )?;
        Ok(())
    }

    /// Attendance rows, newest first, optionally limited to one day.
    pub fn attendance_records(&self, date: Option<NaiveDate>) -> Result<Vec<AttendanceRecord>, DbError> {
        let conn = self.connect()?;
        let base = "SELECT a.id, e.name, e.department, a.timestamp
                    FROM attendance a
                    JOIN employees e ON a.employee_id = e.id";

        let map = |row: &rusqlite::Row<'_>| {
            Ok(AttendanceRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                department: row.get(2)?,
                timestamp: row.get(3)?,
            })
        };

        let records = match date {
            Some(date) => {
                let sql = format!("{base} WHERE DATE(a.timestamp) = ?1 ORDER BY a.timestamp DESC, a.id DESC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![date.format(DATE_FORMAT).to_string()], map)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("{base} ORDER BY a.timestamp DESC, a.id DESC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], map)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    /// Number of attendance rows on `day`.
    pub fn count_on(&self, day: NaiveDate) -> Result<u32, DbError> {
        let count: i64 = self.connect()?.query_row(
            "SELECT COUNT(*) FROM attendance WHERE DATE(timestamp) = ?1",
            params![day.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Number of attendance rows today, local time.
    pub fn today_count(&self) -> Result<u32, DbError> {
        self.count_on(chrono::Local::now().date_naive())
    }

    /// Number of distinct employees with at least one attendance row.
    pub fn distinct_identity_count(&self) -> Result<u32, DbError> {
        let count: i64 = self.connect()?.query_row(
            "SELECT COUNT(DISTINCT employee_id) FROM attendance",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }
}

fn row_to_employee(row: &rusqlite::Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        name: row.get(1)?,
        department: row.get(2)?,
        position: row.get(3)?,
    })
}

impl AttendanceStore for SqliteStore {
    fn lookup_identity(&self, name: &str) -> Result<Option<Employee>, StoreError> {
        self.employee_by_name(name).map_err(StoreError::backend)
    }

    fn persist_attendance(&self, employee_id: i64, timestamp: NaiveDateTime) -> Result<(), StoreError> {
        self.record_attendance(employee_id, timestamp).map_err(StoreError::backend)
    }
}

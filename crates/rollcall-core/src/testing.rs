//! In-memory fakes shared by the unit tests of this crate.

use crate::store::{AttendanceStore, StoreError};
use crate::types::Employee;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Timestamp on a fixed day.
pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .and_then(|d| d.and_hms_opt(h, m, s))
        .expect("valid test time")
}

#[derive(Default)]
pub struct MemoryStore {
    employees: Vec<Employee>,
    rows: Mutex<Vec<(i64, NaiveDateTime)>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_employees(names: &[&str]) -> Self {
        let employees = names
            .iter()
            .enumerate()
            .map(|(i, name)| Employee {
                id: i as i64 + 1,
                name: name.to_string(),
                department: None,
                position: None,
            })
            .collect();
        Self { employees, ..Default::default() }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn persisted(&self) -> Vec<(i64, NaiveDateTime)> {
        self.rows.lock().clone()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("simulated write failure")]
struct WriteFailure;

impl AttendanceStore for MemoryStore {
    fn lookup_identity(&self, name: &str) -> Result<Option<Employee>, StoreError> {
        Ok(self.employees.iter().find(|e| e.name == name).cloned())
    }

    fn persist_attendance(&self, employee_id: i64, timestamp: NaiveDateTime) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend(WriteFailure));
        }
        self.rows.lock().push((employee_id, timestamp));
        Ok(())
    }
}

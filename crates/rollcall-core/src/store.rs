//! Storage collaborator seam used by the deduplicator.

use crate::types::Employee;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Enrollment lookup and durable attendance append.
pub trait AttendanceStore: Send + Sync {
    /// Enrollment record for a gallery label, if that person is enrolled.
    fn lookup_identity(&self, name: &str) -> Result<Option<Employee>, StoreError>;

    /// Append one attendance row. No uniqueness is enforced here.
    fn persist_attendance(&self, employee_id: i64, timestamp: NaiveDateTime) -> Result<(), StoreError>;
}

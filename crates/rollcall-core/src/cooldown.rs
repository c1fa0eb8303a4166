//! Attendance deduplication.
//!
//! An identity is recorded at most once per cooldown window. The window is
//! tracked in memory only, per deduplicator instance; a fresh instance
//! (e.g. after a daemon restart) starts with no history.

use crate::store::AttendanceStore;
use crate::types::AttendanceEvent;
use chrono::{Local, NaiveDateTime, TimeDelta};
use std::collections::HashMap;
use std::sync::Arc;

/// Default minimum interval between two records of the same identity.
pub const DEFAULT_COOLDOWN: TimeDelta = TimeDelta::minutes(5);

/// Source of "now" for attendance timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time, matching how attendance rows are stored.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// What [`AttendanceDeduplicator::record`] decided.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// New attendance event; the store was asked to persist it.
    Recorded(AttendanceEvent),
    /// Same identity was recorded within the cooldown window.
    Suppressed { last: NaiveDateTime },
    /// The gallery label has no enrollment row.
    Unenrolled,
    /// The enrollment lookup itself failed.
    LookupFailed,
}

impl RecordOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }
}

/// Cooldown-gated attendance recorder.
///
/// Owned by a single pipeline; needs no internal locking.
pub struct AttendanceDeduplicator {
    store: Arc<dyn AttendanceStore>,
    window: TimeDelta,
    last_accepted: HashMap<String, NaiveDateTime>,
}

impl AttendanceDeduplicator {
    pub fn new(store: Arc<dyn AttendanceStore>, window: TimeDelta) -> Self {
        Self {
            store,
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Last accepted timestamp for `identity`, if any.
    pub fn last_accepted(&self, identity: &str) -> Option<NaiveDateTime> {
        self.last_accepted.get(identity).copied()
    }

    /// Record a sighting of `identity` at `now`.
    ///
    /// Accepts when the identity is enrolled and either has no previous
    /// record or its previous record is strictly older than the window.
    /// Persistence failures are logged; the decision stands.
    pub fn record(&mut self, identity: &str, now: NaiveDateTime) -> RecordOutcome {
        let employee = match self.store.lookup_identity(identity) {
            Ok(Some(employee)) => employee,
            Ok(None) => {
                tracing::debug!(identity, "matched label is not enrolled");
                return RecordOutcome::Unenrolled;
            }
            Err(err) => {
                tracing::warn!(identity, error = %err, "enrollment lookup failed");
                return RecordOutcome::LookupFailed;
            }
        };

        if let Some(&last) = self.last_accepted.get(identity) {
            if now - last <= self.window {
                tracing::debug!(identity, %last, "within cooldown, not recording");
                return RecordOutcome::Suppressed { last };
            }
        }

        if let Err(err) = self.store.persist_attendance(employee.id, now) {
            tracing::warn!(identity, error = %err, "failed to persist attendance; event dropped");
        } else {
            tracing::info!(identity, employee_id = employee.id, timestamp = %now, "attendance recorded");
        }

        self.last_accepted.insert(identity.to_string(), now);

        RecordOutcome::Recorded(AttendanceEvent {
            employee_id: employee.id,
            identity: identity.to_string(),
            timestamp: now,
        })
    }
}

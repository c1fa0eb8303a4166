use crate::engine::Engine;
use chrono::NaiveDate;
use rollcall_store::{DbError, SqliteStore};
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: Engine,
    store: SqliteStore,
}

impl AttendanceService {
    pub fn new(engine: Engine, store: SqliteStore) -> Self {
        Self { engine, store }
    }
}

/// Run a storage call off the async executor.
async fn with_store<T, F>(store: &SqliteStore, f: F) -> zbus::fdo::Result<T>
where
    F: FnOnce(&SqliteStore) -> Result<T, DbError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| zbus::fdo::Error::Failed(format!("storage task failed: {e}")))?
        .map_err(|e| {
            tracing::error!(error = %e, "storage request failed");
            zbus::fdo::Error::Failed(e.to_string())
        })
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Start the recognition loop.
    async fn start(&self) -> zbus::fdo::Result<String> {
        tracing::info!("start requested");
        match self.engine.start().await {
            Ok(outcome) => Ok(outcome.message().into()),
            Err(e) => Err(zbus::fdo::Error::Failed(e.to_string())),
        }
    }

    /// Ask the recognition loop to stop.
    async fn stop(&self) -> zbus::fdo::Result<String> {
        Ok(self.engine.stop().message().into())
    }

    /// Latest annotated JPEG and its metadata as JSON. Empty bytes when no
    /// frame has been published.
    #[zbus(out_args("jpeg", "annotations"))]
    async fn current_frame(&self) -> zbus::fdo::Result<(Vec<u8>, String)> {
        let frame = self.engine.frames().read();
        let meta = to_json(&frame.as_deref())?;
        let jpeg = frame.map(|f| f.jpeg.clone()).unwrap_or_default();
        Ok((jpeg, meta))
    }

    async fn today_count(&self) -> zbus::fdo::Result<u32> {
        with_store(&self.store, |s| s.today_count()).await
    }

    async fn distinct_identity_count(&self) -> zbus::fdo::Result<u32> {
        with_store(&self.store, |s| s.distinct_identity_count()).await
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "state": self.engine.state(),
            "models_loaded": true,
            "device": self.engine.device(),
        })
        .to_string())
    }

    /// Dashboard summary. `total_employees` counts people who have attended
    /// at least once, not everyone enrolled.
    async fn stats(&self) -> zbus::fdo::Result<String> {
        let (attended, today) = with_store(&self.store, |s| {
            Ok((s.distinct_identity_count()?, s.today_count()?))
        })
        .await?;
        let status = if self.engine.state().is_active() { "Active" } else { "Inactive" };
        Ok(serde_json::json!({
            "total_employees": attended,
            "today_attendance": today,
            "status": status,
        })
        .to_string())
    }

    /// Attendance rows as JSON, newest first. An empty `date` means all days.
    async fn attendance_records(&self, date: &str) -> zbus::fdo::Result<String> {
        let date = match non_empty(date) {
            Some(d) => Some(NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|e| {
                zbus::fdo::Error::InvalidArgs(format!("bad date {d:?}: {e}"))
            })?),
            None => None,
        };
        let records = with_store(&self.store, move |s| s.attendance_records(date)).await?;
        to_json(&records)
    }

    async fn list_employees(&self) -> zbus::fdo::Result<String> {
        let employees = with_store(&self.store, |s| s.list_employees()).await?;
        to_json(&employees)
    }

    /// Register an employee. Department and position may be empty.
    async fn add_employee(
        &self,
        name: &str,
        department: &str,
        position: &str,
    ) -> zbus::fdo::Result<i64> {
        let Some(name) = non_empty(name) else {
            return Err(zbus::fdo::Error::InvalidArgs("name must not be empty".into()));
        };
        tracing::info!(name = %name, "add_employee requested");

        let department = non_empty(department);
        let position = non_empty(position);
        with_store(&self.store, move |s| {
            s.add_employee(&name, department.as_deref(), position.as_deref())
        })
        .await
    }
}

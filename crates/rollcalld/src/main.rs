use anyhow::{Context, Result};
use rollcall_core::{AttendanceDeduplicator, FaceNetMatcher, FramePipeline, ScrfdLocalizer, SystemClock};
use rollcall_hw::V4lOpener;
use rollcall_store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
#[cfg(test)]
mod testing;

use config::{BusKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};
use engine::{Engine, EngineSettings, LoopState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        device = %config.camera_device,
        model_dir = %config.model_dir.display(),
        db = %config.db_path.display(),
        "rollcalld starting"
    );

    // Models and storage are required; failing here ends the process.
    let localizer = ScrfdLocalizer::load(&config.scrfd_model_path()).context("loading face detector")?;
    let matcher = FaceNetMatcher::load(&config.facenet_model_path(), &config.classifier_path())
        .context("loading identity matcher")?;
    let store = SqliteStore::open(&config.db_path).context("opening attendance database")?;

    let window = chrono::TimeDelta::from_std(config.cooldown).context("cooldown out of range")?;
    let deduplicator = AttendanceDeduplicator::new(Arc::new(store.clone()), window);
    let pipeline = FramePipeline::new(
        Box::new(localizer),
        Box::new(matcher),
        deduplicator,
        config.confidence_threshold,
    )
    .with_jpeg_quality(config.jpeg_quality);

    let opener = V4lOpener {
        device_path: config.camera_device.clone(),
        width: config.camera_width,
        height: config.camera_height,
    };
    let engine = Engine::new(
        Arc::new(opener),
        pipeline,
        Arc::new(SystemClock),
        EngineSettings {
            open_timeout: config.camera_open_timeout,
            frame_interval: config.frame_interval,
        },
    );

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, AttendanceService::new(engine.clone(), store))?
        .build()
        .await
        .context("registering D-Bus service")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    if engine.stop() == engine::StopOutcome::Stopping
        && !engine.wait_for_state(LoopState::Stopped, Duration::from_secs(5)).await
    {
        tracing::warn!("recognition loop did not stop in time");
    }

    Ok(())
}

use parking_lot::Mutex;
use rollcall_core::{Clock, FramePipeline, FramePublisher, FrameReader};
use rollcall_hw::{CameraError, CameraOpener, FrameSource};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("camera did not open within {0:?}")]
    OpenTimedOut(Duration),
    #[error("camera open task failed: {0}")]
    OpenTask(#[from] tokio::task::JoinError),
    #[error("failed to spawn recognition thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Lifecycle of the recognition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl LoopState {
    pub fn is_active(self) -> bool {
        self != LoopState::Stopped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A loop is already starting, running or winding down.
    AlreadyActive,
    /// Stop arrived while the device was still opening.
    Cancelled,
}

impl StartOutcome {
    pub fn message(self) -> &'static str {
        match self {
            StartOutcome::Started => "camera started",
            StartOutcome::AlreadyActive => "camera already running",
            StartOutcome::Cancelled => "camera start cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopping,
    NotRunning,
}

impl StopOutcome {
    pub fn message(self) -> &'static str {
        match self {
            StopOutcome::Stopping => "camera stopped",
            StopOutcome::NotRunning => "camera not running",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub open_timeout: Duration,
    pub frame_interval: Duration,
}

/// Clone-safe handle to the recognition loop.
///
/// At most one loop runs per engine. The frame pipeline, including its
/// attendance cooldown history, belongs to the engine and carries over
/// from one run to the next.
#[derive(Clone)]
pub struct Engine {
    opener: Arc<dyn CameraOpener>,
    pipeline: Arc<Mutex<FramePipeline>>,
    publisher: Arc<FramePublisher>,
    state: Arc<watch::Sender<LoopState>>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        opener: Arc<dyn CameraOpener>,
        pipeline: FramePipeline,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Stopped);
        Self {
            opener,
            pipeline: Arc::new(Mutex::new(pipeline)),
            publisher: Arc::new(FramePublisher::new()),
            state: Arc::new(state),
            clock,
            settings,
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn device(&self) -> String {
        self.opener.describe()
    }

    /// Read-only access to the latest published frame.
    pub fn frames(&self) -> FrameReader {
        self.publisher.reader()
    }

    /// Open the camera and launch the loop thread.
    ///
    /// Calling this while a loop is active changes nothing. If the device
    /// cannot be opened within the configured timeout the engine stays
    /// stopped and the error is returned; nothing retries automatically.
    pub async fn start(&self) -> Result<StartOutcome, EngineError> {
        let claimed = self.state.send_if_modified(|s| {
            if *s == LoopState::Stopped {
                *s = LoopState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            tracing::debug!(state = ?self.state(), "start ignored, loop already active");
            return Ok(StartOutcome::AlreadyActive);
        }

        let source = match self.open_source().await {
            Ok(source) => source,
            Err(err) => {
                tracing::error!(device = %self.device(), error = %err, "camera failed to open");
                self.state.send_replace(LoopState::Stopped);
                return Err(err);
            }
        };

        let promoted = self.state.send_if_modified(|s| {
            if *s == LoopState::Starting {
                *s = LoopState::Running;
                true
            } else {
                false
            }
        });
        if !promoted {
            drop(source);
            self.state.send_replace(LoopState::Stopped);
            tracing::info!("start cancelled by stop request");
            return Ok(StartOutcome::Cancelled);
        }

        let run = RunContext {
            pipeline: self.pipeline.clone(),
            publisher: self.publisher.clone(),
            state: self.state.clone(),
            clock: self.clock.clone(),
            interval: self.settings.frame_interval,
        };

        let spawned = std::thread::Builder::new()
            .name("rollcall-loop".into())
            .spawn(move || run.run(source));
        if let Err(err) = spawned {
            self.state.send_replace(LoopState::Stopped);
            return Err(EngineError::Spawn(err));
        }

        tracing::info!(device = %self.device(), "recognition loop started");
        Ok(StartOutcome::Started)
    }

    /// Ask the loop to stop at its next iteration boundary.
    pub fn stop(&self) -> StopOutcome {
        let signalled = self.state.send_if_modified(|s| match s {
            LoopState::Starting | LoopState::Running => {
                *s = LoopState::Stopping;
                true
            }
            LoopState::Stopped | LoopState::Stopping => false,
        });

        if signalled {
            tracing::info!("stop requested");
            StopOutcome::Stopping
        } else {
            StopOutcome::NotRunning
        }
    }

    /// Wait until the loop reaches `target`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, target: LoopState, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await;
        matches!(reached, Ok(Ok(_)))
    }

    async fn open_source(&self) -> Result<Box<dyn FrameSource>, EngineError> {
        let opener = self.opener.clone();
        let open = tokio::task::spawn_blocking(move || opener.open());

        match tokio::time::timeout(self.settings.open_timeout, open).await {
            Ok(joined) => Ok(joined??),
            // The blocking open keeps going; its handle is dropped when it returns.
            Err(_) => Err(EngineError::OpenTimedOut(self.settings.open_timeout)),
        }
    }
}

/// Everything the loop thread owns for the duration of one run.
struct RunContext {
    pipeline: Arc<Mutex<FramePipeline>>,
    publisher: Arc<FramePublisher>,
    state: Arc<watch::Sender<LoopState>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl RunContext {
    fn run(self, mut source: Box<dyn FrameSource>) {
        let mut pipeline = self.pipeline.lock();
        let mut sequence = 0u64;

        loop {
            if *self.state.borrow() != LoopState::Running {
                break;
            }

            let frame = match source.capture() {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(error = %err, "frame acquisition failed, ending run");
                    self.state.send_replace(LoopState::Stopping);
                    break;
                }
            };

            sequence += 1;
            let now = self.clock.now();
            match pipeline.render(frame.image, sequence, now) {
                Ok(published) => self.publisher.publish(published),
                Err(err) => tracing::warn!(error = %err, sequence, "frame not published"),
            }

            std::thread::sleep(self.interval);
        }

        drop(source);
        drop(pipeline);
        self.publisher.clear();
        self.state.send_replace(LoopState::Stopped);
        tracing::info!(frames = sequence, "recognition loop stopped");
    }
}

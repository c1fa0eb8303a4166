//! Test doubles for the daemon: scripted camera, fixed recognizer, stepping clock.

use crate::engine::{Engine, EngineSettings};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use image::RgbImage;
use parking_lot::Mutex;
use rollcall_core::detector::DetectorError;
use rollcall_core::matcher::MatcherError;
use rollcall_core::{
    AttendanceDeduplicator, Clock, Detection, FaceLocalizer, FramePipeline, IdentityMatcher, MatchResult,
};
use rollcall_hw::{CameraError, CameraOpener, Frame, FrameSource};
use rollcall_store::SqliteStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// Yields `remaining` blank frames, then reports end of stream.
/// `None` never runs dry.
pub(crate) struct BlankSource {
    remaining: Option<usize>,
}

impl FrameSource for BlankSource {
    fn capture(&mut self) -> Result<Frame, CameraError> {
        if let Some(n) = self.remaining.as_mut() {
            if *n == 0 {
                return Err(CameraError::EndOfStream);
            }
            *n -= 1;
        }
        Ok(Frame {
            image: RgbImage::new(64, 48),
            timestamp: std::time::Instant::now(),
            sequence: 0,
        })
    }
}

pub(crate) struct FakeOpener {
    pub(crate) frames_per_run: Option<usize>,
    pub(crate) delay: Duration,
    pub(crate) fail: bool,
    pub(crate) opens: AtomicUsize,
}

impl FakeOpener {
    pub(crate) fn new(frames_per_run: Option<usize>) -> Self {
        Self { frames_per_run, delay: Duration::ZERO, fail: false, opens: AtomicUsize::new(0) }
    }
}

impl CameraOpener for FakeOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(CameraError::DeviceNotFound("/dev/fake".into()));
        }
        Ok(Box::new(BlankSource { remaining: self.frames_per_run }))
    }

    fn describe(&self) -> String {
        "/dev/fake".into()
    }
}

pub(crate) struct OneFace;

impl FaceLocalizer for OneFace {
    fn locate(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        Ok(vec![Detection { x: 8.0, y: 8.0, width: 24.0, height: 24.0, score: 0.9 }])
    }
}

pub(crate) struct AlwaysAlice;

impl IdentityMatcher for AlwaysAlice {
    fn identify(&mut self, _crop: &RgbImage) -> Result<MatchResult, MatcherError> {
        Ok(MatchResult { identity: "alice".into(), confidence: 1.5 })
    }
}

/// Starts at 09:00 and advances by `step` on every reading.
pub(crate) struct StepClock {
    next: Mutex<NaiveDateTime>,
    step: TimeDelta,
}

impl StepClock {
    fn new(step: TimeDelta) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(9, 0, 0).unwrap();
        Self { next: Mutex::new(start), step }
    }
}

impl Clock for StepClock {
    fn now(&self) -> NaiveDateTime {
        let mut next = self.next.lock();
        let now = *next;
        *next += self.step;
        now
    }
}

pub(crate) struct Harness {
    pub(crate) _dir: TempDir,
    pub(crate) store: SqliteStore,
    pub(crate) opener: Arc<FakeOpener>,
    pub(crate) engine: Engine,
}

pub(crate) fn harness(opener: FakeOpener, step: TimeDelta, open_timeout: Duration) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("attendance.db")).unwrap();
    store.add_employee("alice", None, None).unwrap();

    let dedup = AttendanceDeduplicator::new(Arc::new(store.clone()), TimeDelta::minutes(5));
    let pipeline = FramePipeline::new(Box::new(OneFace), Box::new(AlwaysAlice), dedup, 1.0);

    let opener = Arc::new(opener);
    let engine = Engine::new(
        opener.clone(),
        pipeline,
        Arc::new(StepClock::new(step)),
        EngineSettings { open_timeout, frame_interval: Duration::from_millis(2) },
    );
    Harness { _dir: dir, store, opener, engine }
}

pub(crate) fn default_harness(frames_per_run: Option<usize>) -> Harness {
    harness(FakeOpener::new(frames_per_run), TimeDelta::minutes(2), WAIT)
}

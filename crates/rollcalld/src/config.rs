use std::path::PathBuf;
use std::time::Duration;

/// Which message bus the service registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Upper bound on how long Start waits for the device to open.
    pub camera_open_timeout: Duration,
    /// Directory containing the detector, embedding and classifier artifacts.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Decision score a match must exceed to count as recognized.
    pub confidence_threshold: f32,
    /// Minimum interval between two attendance records of one person.
    pub cooldown: Duration,
    /// Pause between loop iterations.
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let bus = match std::env::var("ROLLCALL_BUS").as_deref() {
            Ok("system") => BusKind::System,
            _ => BusKind::Session,
        };

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            camera_width: env_parse("ROLLCALL_CAMERA_WIDTH", 640),
            camera_height: env_parse("ROLLCALL_CAMERA_HEIGHT", 480),
            camera_open_timeout: Duration::from_secs(env_parse("ROLLCALL_CAMERA_OPEN_TIMEOUT_SECS", 10)),
            model_dir,
            db_path,
            confidence_threshold: finite_threshold(env_parse(
                "ROLLCALL_CONFIDENCE_THRESHOLD",
                rollcall_core::pipeline::DEFAULT_CONFIDENCE_THRESHOLD,
            )),
            cooldown: Duration::from_secs(env_parse("ROLLCALL_COOLDOWN_SECS", 300)),
            frame_interval: Duration::from_millis(env_parse("ROLLCALL_FRAME_INTERVAL_MS", 50)),
            jpeg_quality: env_parse("ROLLCALL_JPEG_QUALITY", rollcall_core::pipeline::DEFAULT_JPEG_QUALITY),
            bus,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_path("det_10g.onnx")
    }

    /// Path to the FaceNet embedding model.
    pub fn facenet_model_path(&self) -> String {
        self.model_path("facenet512.onnx")
    }

    /// Path to the gallery classifier artifact.
    pub fn classifier_path(&self) -> String {
        self.model_path("gallery_svm.json")
    }

    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn finite_threshold(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        let fallback = rollcall_core::pipeline::DEFAULT_CONFIDENCE_THRESHOLD;
        tracing::warn!(value, fallback, "ignoring non-finite confidence threshold");
        fallback
    }
}

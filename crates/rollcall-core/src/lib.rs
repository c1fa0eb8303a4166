//! rollcall-core: Face recognition and attendance deduplication.
//!
//! SCRFD localizes faces, FaceNet embeds them and a linear SVM names them,
//! all on CPU via ONNX Runtime. Recognized identities are recorded at most
//! once per cooldown window.

pub mod classifier;
pub mod cooldown;
pub mod detector;
pub mod embedder;
pub mod matcher;
pub mod pipeline;
pub mod publisher;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use classifier::GalleryClassifier;
pub use cooldown::{AttendanceDeduplicator, Clock, RecordOutcome, SystemClock};
pub use detector::{FaceLocalizer, ScrfdLocalizer};
pub use matcher::{FaceNetMatcher, IdentityMatcher};
pub use pipeline::FramePipeline;
pub use publisher::{FramePublisher, FrameReader, PublishedFrame};
pub use store::{AttendanceStore, StoreError};
pub use types::{Annotation, AttendanceEvent, Detection, Employee, MatchResult};

/// Model directory used when `ROLLCALL_MODEL_DIR` is not set.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/rollcall/models")
}

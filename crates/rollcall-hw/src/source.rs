//! Frame source seam between the recognition loop and the camera.

use crate::camera::{Camera, CameraError, CameraStream};
use crate::frame::Frame;

/// Produces frames on demand. Owned by exactly one consumer at a time.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    ///
    /// An error means the stream is over for this run.
    fn capture(&mut self) -> Result<Frame, CameraError>;
}

/// Opens a fresh [`FrameSource`] for each recognition run.
pub trait CameraOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;

    /// Human-readable device identifier for status output.
    fn describe(&self) -> String;
}

impl FrameSource for CameraStream {
    fn capture(&mut self) -> Result<Frame, CameraError> {
        self.next_frame()
    }
}

/// Opens a V4L2 device by path at a requested resolution.
#[derive(Debug, Clone)]
pub struct V4lOpener {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
}

impl CameraOpener for V4lOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let stream = Camera::open(&self.device_path, self.width, self.height)?.stream()?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}

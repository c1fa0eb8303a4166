//! rollcall-hw: Camera capture for the recognition loop.
//!
//! Provides V4L2-based capture that hands out RGB frames regardless of the
//! pixel format the driver negotiated.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, CameraStream, PixelFormat};
pub use frame::Frame;
pub use source::{CameraOpener, FrameSource, V4lOpener};

//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    CaptureNotSupported,
    #[error("end of stream")]
    EndOfStream,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, converted to RGB per pixel pair.
    Yuyv,
    /// Motion-JPEG, decoded per frame.
    Mjpg,
    /// 8-bit grayscale, replicated into three channels.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

/// V4L2 camera device handle. Dropping it releases the device.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera (e.g. "/dev/video0") and negotiate `width` x `height`.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::CaptureNotSupported);
        }

        // Ask for YUYV; webcams that only stream compressed video answer with MJPG.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG or GREY)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Start streaming. The returned stream owns the camera and keeps the
    /// device streaming until it is dropped.
    pub fn stream(self) -> Result<CameraStream, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        tracing::debug!(device = %self.device_path, "mmap stream ready");
        Ok(CameraStream { stream, camera: self })
    }
}

/// Undecodable buffers tolerated in a row before a capture fails. UVC
/// devices can hand out a partial MJPG frame right after STREAMON.
const MAX_DECODE_ATTEMPTS: usize = 5;

/// An open capture stream. Field order matters: the stream is torn down
/// before the device handle is released.
pub struct CameraStream {
    stream: MmapStream<'static>,
    camera: Camera,
}

impl CameraStream {
    /// Dequeue buffers until one decodes to an RGB frame.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let camera = &self.camera;
        let stream = &mut self.stream;

        next_decodable(MAX_DECODE_ATTEMPTS, || {
            let (buf, meta) = stream
                .next()
                .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

            if buf.is_empty() {
                return Err(CameraError::EndOfStream);
            }

            let decoded = decode_buffer(camera.pixel_format, buf, meta.bytesused, camera.width, camera.height);
            Ok(decoded.map(|image| Frame {
                image,
                timestamp: std::time::Instant::now(),
                sequence: meta.sequence,
            }))
        })
    }
}

/// Convert one raw buffer in `format` to RGB.
fn decode_buffer(
    format: PixelFormat,
    buf: &[u8],
    bytesused: u32,
    width: u32,
    height: u32,
) -> Result<RgbImage, FrameError> {
    match format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
        PixelFormat::Mjpg => {
            let used = (bytesused as usize).min(buf.len());
            frame::mjpg_to_rgb(&buf[..used], width, height)
        }
        PixelFormat::Grey => frame::grey_to_rgb(buf, width, height),
    }
}

/// Pull from `next` until it yields a decoded frame. Device errors end the
/// capture at once; decode errors are skipped up to `max_attempts` times.
fn next_decodable<F>(max_attempts: usize, mut next: F) -> Result<Frame, CameraError>
where
    F: FnMut() -> Result<Result<Frame, FrameError>, CameraError>,
{
    let mut last_error = None;
    for attempt in 1..=max_attempts {
        match next()? {
            Ok(frame) => return Ok(frame),
            Err(err) => {
                tracing::debug!(attempt, error = %err, "skipping undecodable buffer");
                last_error = Some(err);
            }
        }
    }

    Err(CameraError::CaptureFailed(match last_error {
        Some(err) => format!("{max_attempts} undecodable buffers in a row, last: {err}"),
        None => "no capture attempted".to_string(),
    }))
}

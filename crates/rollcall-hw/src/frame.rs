//! Frame type and pixel-format conversion to RGB.

use image::RgbImage;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("decoded frame is {actual:?}, negotiated {expected:?}")]
    SizeMismatch { expected: (u32, u32), actual: (u32, u32) },
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range coefficients.
///
/// Each 4-byte group [Y0, U, Y1, V] yields two pixels sharing U and V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength { expected, actual: yuyv.len() });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    let actual = rgb.len();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected: (width * height * 3) as usize,
        actual,
    })
}

/// Expand 8-bit grayscale to RGB by replicating the luma channel.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength { expected: pixels, actual: grey.len() });
    }
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let v = grey[(y * width + x) as usize];
        image::Rgb([v, v, v])
    }))
}

/// Decode a motion-JPEG buffer, checking it matches the negotiated size.
pub fn mjpg_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?.to_rgb8();
    if decoded.dimensions() != (width, height) {
        return Err(FrameError::SizeMismatch {
            expected: (width, height),
            actual: decoded.dimensions(),
        });
    }
    Ok(decoded)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1: Y0=16 (black), Y1=235 (white), neutral chroma
        let img = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // Strong V (Cr) pushes red up and green down.
        let img = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        let [r, g, b] = img.get_pixel(0, 0).0;
        assert!(r > 200, "r = {r}");
        assert!(g < 50, "g = {g}");
        assert!(b < 50, "b = {b}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_grey_to_rgb() {
        let img = grey_to_rgb(&[0, 50, 100, 200], 2, 2).unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [200, 200, 200]);
        assert_eq!(img.get_pixel(1, 0).0, [50, 50, 50]);
    }

    #[test]
    fn test_mjpg_size_mismatch() {
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .encode_image(&RgbImage::new(8, 8))
            .unwrap();

        assert!(mjpg_to_rgb(&jpeg, 8, 8).is_ok());
        assert!(matches!(mjpg_to_rgb(&jpeg, 16, 8), Err(FrameError::SizeMismatch { .. })));
    }
}

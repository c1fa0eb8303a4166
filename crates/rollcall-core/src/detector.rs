//! SCRFD face localizer via ONNX Runtime.
//!
//! Letterboxes an RGB frame into the 640x640 SCRFD input, decodes the
//! three stride levels anchor-free and applies the detector's own NMS.
//! No further overlap suppression happens downstream.

use crate::types::Detection;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_SCORE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds face regions in a frame.
pub trait FaceLocalizer: Send {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Metadata for mapping letterboxed coordinates back to the source frame.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face localizer.
pub struct ScrfdLocalizer {
    session: Session,
    stride_indices: [StrideOutputIndices; 3],
}

impl ScrfdLocalizer {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        // 6 outputs = score/bbox per stride; 9 adds keypoints, which we ignore.
        if output_names.len() < 6 {
            return Err(DetectorError::UnsupportedModel(format!(
                "SCRFD needs at least 6 outputs (3 strides x score/bbox), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self { session, stride_indices })
    }

    fn preprocess(frame: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
        let (width, height) = frame.dimensions();
        let scale = (SCRFD_INPUT_SIZE as f32 / width as f32).min(SCRFD_INPUT_SIZE as f32 / height as f32);

        let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
        // Whole-pixel padding; decode subtracts the same offsets.
        let off_x = (SCRFD_INPUT_SIZE - new_w as usize) / 2;
        let off_y = (SCRFD_INPUT_SIZE - new_h as usize) / 2;

        let resized = imageops::resize(frame, new_w, new_h, FilterType::Triangle);

        // Padding stays at 0.0, which is SCRFD_MEAN after normalization.
        let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let tx = off_x + x as usize;
            let ty = off_y + y as usize;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        let letterbox = LetterboxInfo { scale, pad_x: off_x as f32, pad_y: off_y as f32 };
        (tensor, letterbox)
    }
}

impl FaceLocalizer for ScrfdLocalizer {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = Self::preprocess(frame);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, bboxes, stride, &letterbox, SCRFD_SCORE_THRESHOLD));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Map output tensors to stride slots.
///
/// Exports either name their outputs `score_8`, `bbox_16`, ... or use
/// generic numeric names, in which case the standard order applies:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => [found[0], found[1], found[2]],
        None => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Detection> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let Some(offsets) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * step;
        let anchor_y = (cell / grid) as f32 * step;

        let x1 = (anchor_x - offsets[0] * step - letterbox.pad_x) / letterbox.scale;
        let y1 = (anchor_y - offsets[1] * step - letterbox.pad_y) / letterbox.scale;
        let x2 = (anchor_x + offsets[2] * step - letterbox.pad_x) / letterbox.scale;
        let y2 = (anchor_y + offsets[3] * step - letterbox.pad_y) / letterbox.scale;

        detections.push(Detection {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            score,
        });
    }

    detections
}

/// Greedy non-maximum suppression; output is sorted by descending score.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 { inter / union } else { 0.0 }
}

//! FaceNet embedding model via ONNX Runtime.
//!
//! Turns a 160x160 RGB face crop into a 512-dimensional, L2-normalized
//! embedding. Input layout is NHWC, matching the Keras export.

use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const FACENET_INPUT_SIZE: u32 = 160;
pub const FACENET_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("crop must be 160x160, got {0}x{1}")]
    BadCropSize(u32, u32),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FaceNet-based embedding extractor.
pub struct FaceNetEmbedder {
    session: Session,
}

impl FaceNetEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Compute the embedding of a crop already resized to 160x160.
    pub fn embed(&mut self, crop: &RgbImage) -> Result<Embedding, EmbedderError> {
        if crop.dimensions() != (FACENET_INPUT_SIZE, FACENET_INPUT_SIZE) {
            return Err(EmbedderError::BadCropSize(crop.width(), crop.height()));
        }

        let input = Self::preprocess(crop);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != FACENET_EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {FACENET_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding { values: l2_normalize(raw) })
    }

    /// Per-image standardization into a `[1, 160, 160, 3]` tensor.
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE as usize;
        let raw = crop.as_raw();
        let n = raw.len() as f32;

        let mean = raw.iter().map(|&p| p as f32).sum::<f32>() / n;
        let variance = raw.iter().map(|&p| (p as f32 - mean).powi(2)).sum::<f32>() / n;
        // Floor keeps flat crops from dividing by ~0.
        let std = variance.sqrt().max(1.0 / n.sqrt());

        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in crop.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = (pixel[c] as f32 - mean) / std;
            }
        }
        tensor
    }
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

//! Identity matching: face crop → embedding → gallery decision.

use crate::classifier::{ClassifierError, GalleryClassifier};
use crate::embedder::{EmbedderError, FaceNetEmbedder, FACENET_EMBEDDING_DIM, FACENET_INPUT_SIZE};
use crate::types::MatchResult;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Strategy for naming the person in a face crop.
pub trait IdentityMatcher: Send {
    /// Classify an arbitrary-size crop. Implementations resize as needed.
    fn identify(&mut self, crop: &RgbImage) -> Result<MatchResult, MatcherError>;
}

/// FaceNet embeddings classified by a pretrained linear SVM.
pub struct FaceNetMatcher {
    embedder: FaceNetEmbedder,
    classifier: GalleryClassifier,
}

impl FaceNetMatcher {
    /// Pair an embedder with a classifier fitted on its embeddings.
    ///
    /// A classifier of the wrong width can never produce a decision, so it
    /// is rejected here rather than on the first frame.
    pub fn new(embedder: FaceNetEmbedder, classifier: GalleryClassifier) -> Result<Self, MatcherError> {
        if classifier.dim() != FACENET_EMBEDDING_DIM {
            return Err(ClassifierError::DimensionMismatch {
                expected: FACENET_EMBEDDING_DIM,
                actual: classifier.dim(),
            }
            .into());
        }
        Ok(Self { embedder, classifier })
    }

    /// Load both artifacts from disk.
    pub fn load(facenet_path: &str, classifier_path: &str) -> Result<Self, MatcherError> {
        let embedder = FaceNetEmbedder::load(facenet_path)?;
        let classifier = GalleryClassifier::load(classifier_path)?;
        Self::new(embedder, classifier)
    }
}

impl IdentityMatcher for FaceNetMatcher {
    fn identify(&mut self, crop: &RgbImage) -> Result<MatchResult, MatcherError> {
        let input = resize_for_embedding(crop);
        let embedding = self.embedder.embed(&input)?;
        Ok(self.classifier.classify(&embedding.values)?)
    }
}

/// Bilinear resize to the square FaceNet input.
pub fn resize_for_embedding(crop: &RgbImage) -> RgbImage {
    if crop.dimensions() == (FACENET_INPUT_SIZE, FACENET_INPUT_SIZE) {
        return crop.clone();
    }
    imageops::resize(crop, FACENET_INPUT_SIZE, FACENET_INPUT_SIZE, FilterType::Triangle)
}

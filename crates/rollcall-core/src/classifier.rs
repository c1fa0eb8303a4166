//! Linear SVM gallery classifier.
//!
//! The artifact is exported offline as JSON alongside the embedding model.
//! Two decision-function shapes are supported:
//!
//! - `one_vs_rest`: one hyperplane per label, score = w·x + b.
//! - `one_vs_one`: one hyperplane per label pair (i < j, row-major). Each
//!   pair votes for i when its value is non-negative and for j otherwise;
//!   the per-class vote count is then offset by the summed pair values
//!   squashed into (-1/3, 1/3) so ties break by margin.

use crate::types::MatchResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier file not found: {0}")]
    NotFound(String),
    #[error("failed to read classifier: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed classifier: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid classifier: {0}")]
    Invalid(String),
    #[error("embedding has {actual} dimensions, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    OneVsRest,
    OneVsOne,
}

/// Fitted gallery classifier: labels plus linear decision rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryClassifier {
    labels: Vec<String>,
    scheme: Scheme,
    coef: Vec<Vec<f32>>,
    intercept: Vec<f32>,
}

impl GalleryClassifier {
    /// Load and validate a classifier artifact from disk.
    pub fn load(path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(path).exists() {
            return Err(ClassifierError::NotFound(path.to_string()));
        }
        let classifier = Self::from_json(&std::fs::read_to_string(path)?)?;

        tracing::info!(
            path,
            classes = classifier.labels.len(),
            scheme = ?classifier.scheme,
            dim = classifier.dim(),
            "loaded gallery classifier"
        );

        Ok(classifier)
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let classifier: Self = serde_json::from_str(json)?;
        classifier.validate()?;
        Ok(classifier)
    }

    pub fn new(
        labels: Vec<String>,
        scheme: Scheme,
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    ) -> Result<Self, ClassifierError> {
        let classifier = Self { labels, scheme, coef, intercept };
        classifier.validate()?;
        Ok(classifier)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        let n = self.labels.len();
        let expected_rows = match self.scheme {
            Scheme::OneVsRest if n >= 1 => n,
            Scheme::OneVsOne if n >= 2 => n * (n - 1) / 2,
            _ => {
                return Err(ClassifierError::Invalid(format!(
                    "{:?} needs more labels, got {n}",
                    self.scheme
                )))
            }
        };

        if self.coef.len() != expected_rows || self.intercept.len() != expected_rows {
            return Err(ClassifierError::Invalid(format!(
                "{n} labels need {expected_rows} rows, got {} coef / {} intercept",
                self.coef.len(),
                self.intercept.len()
            )));
        }

        let dim = self.dim();
        if dim == 0 || self.coef.iter().any(|row| row.len() != dim) {
            return Err(ClassifierError::Invalid("coefficient rows must share a non-zero width".into()));
        }

        Ok(())
    }

    /// Embedding width this classifier was fitted on.
    pub fn dim(&self) -> usize {
        self.coef.first().map_or(0, Vec::len)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Per-class decision scores, indexed like [`labels`](Self::labels).
    pub fn decision_function(&self, x: &[f32]) -> Result<Vec<f32>, ClassifierError> {
        if x.len() != self.dim() {
            return Err(ClassifierError::DimensionMismatch { expected: self.dim(), actual: x.len() });
        }

        let rows = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| w.iter().zip(x).map(|(w, x)| w * x).sum::<f32>() + b);

        match self.scheme {
            Scheme::OneVsRest => Ok(rows.collect()),
            Scheme::OneVsOne => Ok(aggregate_pairwise(rows, self.labels.len())),
        }
    }

    /// Highest-scoring label and its score.
    pub fn classify(&self, x: &[f32]) -> Result<MatchResult, ClassifierError> {
        let scores = self.decision_function(x)?;
        let (best, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, s)| if s > acc.1 { (i, s) } else { acc });

        Ok(MatchResult {
            identity: self.labels[best].clone(),
            confidence,
        })
    }
}

fn aggregate_pairwise(pair_values: impl Iterator<Item = f32>, n: usize) -> Vec<f32> {
    let mut votes = vec![0.0f32; n];
    let mut margins = vec![0.0f32; n];

    let pairs = (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j)));
    for ((i, j), d) in pairs.zip(pair_values) {
        if d >= 0.0 {
            votes[i] += 1.0;
        } else {
            votes[j] += 1.0;
        }
        margins[i] += d;
        margins[j] -= d;
    }

    votes
        .iter()
        .zip(&margins)
        .map(|(v, m)| v + m / (3.0 * (m.abs() + 1.0)))
        .collect()
}

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when two vectors cannot be compared.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("degenerate vector: cosine similarity is undefined for a zero-norm embedding")]
    DegenerateVector,
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Bounding box for a detected face, in source image pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (typically 512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Cosine similarity between two embeddings, in [-1, 1]. Higher = more similar.
    ///
    /// Fails when either vector has zero norm or the dimensions differ.
    pub fn similarity(&self, other: &Embedding) -> Result<f32, MatchError> {
        if self.values.len() != other.values.len() {
            return Err(MatchError::DimensionMismatch {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            Ok(dot / denom)
        } else {
            Err(MatchError::DegenerateVector)
        }
    }

    /// Element-wise mean of a non-empty set of equal-length embeddings.
    ///
    /// Returns `None` for an empty slice or mixed dimensions.
    pub fn mean(samples: &[Embedding]) -> Option<Embedding> {
        let first = samples.first()?;
        let dim = first.dim();
        if samples.iter().any(|s| s.dim() != dim) {
            return None;
        }

        let mut acc = vec![0.0f64; dim];
        for sample in samples {
            for (slot, v) in acc.iter_mut().zip(sample.values.iter()) {
                *slot += f64::from(*v);
            }
        }
        let n = samples.len() as f64;
        Some(Embedding::new(acc.into_iter().map(|v| (v / n) as f32).collect()))
    }
}

/// An 8-bit grayscale face crop, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceCrop {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FaceCrop {
    /// View the crop as an `image` buffer. `None` if the pixel count is wrong.
    pub fn to_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// Non-empty, with exactly `width * height` pixels.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && u64::from(self.width) * u64::from(self.height) == self.pixels.len() as u64
    }

    /// Pixel area, computed without overflow.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn from_image(img: &GrayImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            pixels: img.as_raw().clone(),
        }
    }
}

/// What the external detector produced for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceData {
    Embedding(Embedding),
    Crop(FaceCrop),
}

/// One face reported by the external detector/embedding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub bbox: BoundingBox,
    pub face: FaceData,
    pub detection_score: f32,
}

impl Detection {
    pub fn embedding(&self) -> Option<&Embedding> {
        match &self.face {
            FaceData::Embedding(e) => Some(e),
            FaceData::Crop(_) => None,
        }
    }

    pub fn crop(&self) -> Option<&FaceCrop> {
        match &self.face {
            FaceData::Crop(c) => Some(c),
            FaceData::Embedding(_) => None,
        }
    }
}

/// Pick the detection with the highest score. Ties keep the earliest.
pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best: Option<&Detection>, d| match best {
        Some(b) if b.detection_score >= d.detection_score => Some(b),
        _ => Some(d),
    })
}

/// Which pipeline produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Embedding,
    Classifier,
    Correlation,
    Lenient,
}

/// Result of matching a probe against the enrolled identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Matched identity, `None` when nothing cleared the threshold.
    pub identity_id: Option<String>,
    /// Best score seen, reported even on a non-match.
    pub confidence: f32,
    pub strategy: MatchStrategy,
}

impl MatchResult {
    pub fn no_match(confidence: f32, strategy: MatchStrategy) -> Self {
        Self {
            identity_id: None,
            confidence,
            strategy,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity_id.is_some()
    }
}

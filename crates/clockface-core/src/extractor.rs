//! Face embedding extraction pipeline.
//!
//! Detection → largest-face selection → minimum-size gate → padded crop →
//! embedding model → L2 normalization. The detector and the embedding model
//! are injected collaborators; this module owns pre/post-processing and the
//! failure policy, never the model internals.

use crate::types::{BoundingBox, DetectionMode, Embedding};
use image::GrayImage;
use thiserror::Error;

// --- Named constants ---
const DEFAULT_MIN_FACE_PIXELS: u32 = 64;
const DEFAULT_PADDING_RATIO: f32 = 0.30;
const DEFAULT_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face too small: shorter side {side}px, minimum {min}px")]
    FaceTooSmall { side: u32, min: u32 },
    #[error("embedding model produced a zero vector")]
    InvalidEmbedding,
    #[error("embedding size mismatch: expected {expected} dims, got {actual}")]
    EmbeddingSizeMismatch { expected: usize, actual: usize },
    #[error("detector backend: {0}")]
    Detector(String),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    /// Camera or sensor hardware is absent. Fatal, never retried.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    /// Transient capture failure; safe to retry.
    #[error("capture failed: {0}")]
    Failed(String),
}

/// Produces a raw image for a capture moment (kiosk camera, or a file in
/// dry runs).
pub trait ImageSource {
    fn capture(&self) -> Result<GrayImage, CaptureError>;
}

/// Face detection collaborator. Returns every face found in the image;
/// an empty list means no face, not an error.
pub trait FaceDetector {
    fn detect(&self, image: &GrayImage, mode: DetectionMode)
        -> Result<Vec<BoundingBox>, ExtractError>;
}

/// Embedding model collaborator. Deterministic: the same crop always yields
/// the same raw vector. Output dimension is validated by the extractor.
pub trait EmbeddingModel {
    fn embed(&self, crop: &GrayImage) -> Vec<f32>;
}

// Boxed collaborators flow through the generic extractor unchanged.
impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(
        &self,
        image: &GrayImage,
        mode: DetectionMode,
    ) -> Result<Vec<BoundingBox>, ExtractError> {
        (**self).detect(image, mode)
    }
}

impl<T: EmbeddingModel + ?Sized> EmbeddingModel for Box<T> {
    fn embed(&self, crop: &GrayImage) -> Vec<f32> {
        (**self).embed(crop)
    }
}

/// Extraction pipeline parameters.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Reject faces whose shorter bounding-box side is below this.
    pub min_face_pixels: u32,
    /// Padding added around the box, as a fraction of box width.
    pub padding_ratio: f32,
    /// Expected embedding dimension D.
    pub embedding_dim: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_face_pixels: DEFAULT_MIN_FACE_PIXELS,
            padding_ratio: DEFAULT_PADDING_RATIO,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

/// A successful extraction: a unit-normalized embedding plus the crop it
/// came from and the detector's confidence for the selected face.
#[derive(Debug)]
pub struct Extraction {
    pub embedding: Embedding,
    pub confidence: f32,
    pub crop: GrayImage,
}

/// Image → normalized embedding, or a named failure. Never yields a
/// partially-formed vector.
pub struct FaceEmbeddingExtractor<D, M> {
    detector: D,
    model: M,
    config: ExtractorConfig,
}

impl<D: FaceDetector, M: EmbeddingModel> FaceEmbeddingExtractor<D, M> {
    pub fn new(detector: D, model: M, config: ExtractorConfig) -> Self {
        Self { detector, model, config }
    }

    pub fn extract(
        &self,
        image: &GrayImage,
        mode: DetectionMode,
    ) -> Result<Extraction, ExtractError> {
        let faces = self.detector.detect(image, mode)?;
        if faces.is_empty() {
            return Err(ExtractError::NoFaceDetected);
        }

        let face = select_largest(&faces);
        tracing::debug!(
            candidates = faces.len(),
            confidence = face.confidence,
            area = face.area(),
            "selected face"
        );

        let side = face.width.min(face.height).floor() as u32;
        if side < self.config.min_face_pixels {
            return Err(ExtractError::FaceTooSmall {
                side,
                min: self.config.min_face_pixels,
            });
        }

        let crop = crop_padded(image, face, self.config.padding_ratio);

        let raw = self.model.embed(&crop);
        if raw.len() != self.config.embedding_dim {
            return Err(ExtractError::EmbeddingSizeMismatch {
                expected: self.config.embedding_dim,
                actual: raw.len(),
            });
        }

        let embedding = Embedding { values: raw }
            .l2_normalized()
            .ok_or(ExtractError::InvalidEmbedding)?;

        Ok(Extraction {
            embedding,
            confidence: face.confidence,
            crop,
        })
    }
}

/// Pick the face with the largest bounding-box area. Strict `>` keeps the
/// first face encountered on an exact area tie.
fn select_largest(faces: &[BoundingBox]) -> &BoundingBox {
    let mut best = &faces[0];
    for face in &faces[1..] {
        if face.area() > best.area() {
            best = face;
        }
    }
    best
}

/// Expand the box by `padding_ratio` of its width on every side, clamp to
/// image bounds, and crop.
fn crop_padded(image: &GrayImage, face: &BoundingBox, padding_ratio: f32) -> GrayImage {
    let pad = face.width * padding_ratio;

    let x0 = (face.x - pad).max(0.0).floor() as u32;
    let y0 = (face.y - pad).max(0.0).floor() as u32;
    let x1 = (face.x + face.width + pad).ceil().min(image.width() as f32) as u32;
    let y1 = (face.y + face.height + pad).ceil().min(image.height() as f32) as u32;

    let w = x1.saturating_sub(x0).max(1);
    let h = y1.saturating_sub(y0).max(1);

    image::imageops::crop_imm(image, x0, y0, w, h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf }
    }

    /// Detector fake returning a canned face list.
    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn detect(
            &self,
            _image: &GrayImage,
            _mode: DetectionMode,
        ) -> Result<Vec<BoundingBox>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    /// Model fake returning a fixed raw vector regardless of crop.
    struct FixedModel(Vec<f32>);

    impl EmbeddingModel for FixedModel {
        fn embed(&self, _crop: &GrayImage) -> Vec<f32> {
            self.0.clone()
        }
    }

    fn blank_image(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, image::Luma([128u8]))
    }

    fn extractor(
        faces: Vec<BoundingBox>,
        raw: Vec<f32>,
        dim: usize,
    ) -> FaceEmbeddingExtractor<FixedDetector, FixedModel> {
        FaceEmbeddingExtractor::new(
            FixedDetector(faces),
            FixedModel(raw),
            ExtractorConfig { min_face_pixels: 64, padding_ratio: 0.30, embedding_dim: dim },
        )
    }

    #[test]
    fn test_zero_faces_is_no_face_detected() {
        let ex = extractor(vec![], vec![1.0, 0.0], 2);
        let err = ex.extract(&blank_image(320, 240), DetectionMode::Accurate).unwrap_err();
        assert!(matches!(err, ExtractError::NoFaceDetected));
    }

    #[test]
    fn test_selects_largest_face() {
        let faces = vec![
            make_box(0.0, 0.0, 80.0, 80.0, 0.9),
            make_box(100.0, 100.0, 120.0, 120.0, 0.7),
        ];
        assert!((select_largest(&faces).width - 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_equal_area_tie_keeps_first() {
        let faces = vec![
            make_box(0.0, 0.0, 100.0, 100.0, 0.5),
            make_box(200.0, 0.0, 100.0, 100.0, 0.99),
        ];
        let chosen = select_largest(&faces);
        assert!((chosen.x - 0.0).abs() < 1e-6, "first face should win the tie");
    }

    #[test]
    fn test_face_too_small_rejected() {
        let ex = extractor(vec![make_box(10.0, 10.0, 40.0, 40.0, 0.9)], vec![1.0, 0.0], 2);
        let err = ex.extract(&blank_image(320, 240), DetectionMode::Accurate).unwrap_err();
        assert!(matches!(err, ExtractError::FaceTooSmall { side: 40, min: 64 }));
    }

    #[test]
    fn test_embedding_is_unit_normalized() {
        let ex = extractor(vec![make_box(10.0, 10.0, 100.0, 100.0, 0.9)], vec![3.0, 4.0], 2);
        let out = ex.extract(&blank_image(320, 240), DetectionMode::Accurate).unwrap();
        assert!((out.embedding.norm() - 1.0).abs() < 1e-6);
        assert!((out.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_invalid_embedding() {
        let ex = extractor(vec![make_box(10.0, 10.0, 100.0, 100.0, 0.9)], vec![0.0, 0.0], 2);
        let err = ex.extract(&blank_image(320, 240), DetectionMode::Accurate).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidEmbedding));
    }

    #[test]
    fn test_size_mismatch() {
        let ex = extractor(vec![make_box(10.0, 10.0, 100.0, 100.0, 0.9)], vec![1.0, 0.0, 0.0], 2);
        let err = ex.extract(&blank_image(320, 240), DetectionMode::Accurate).unwrap_err();
        assert!(matches!(err, ExtractError::EmbeddingSizeMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_crop_padding_and_clamp() {
        let img = blank_image(320, 240);
        // 100-wide box at (10, 10): pad = 30, so x0 clamps to 0, y0 to 0.
        let face = make_box(10.0, 10.0, 100.0, 100.0, 0.9);
        let crop = crop_padded(&img, &face, 0.30);
        // x1 = 10 + 100 + 30 = 140, y1 = 140; origin clamped to (0, 0).
        assert_eq!(crop.width(), 140);
        assert_eq!(crop.height(), 140);
    }

    #[test]
    fn test_crop_clamps_to_image_edge() {
        let img = blank_image(200, 200);
        let face = make_box(120.0, 120.0, 100.0, 100.0, 0.9);
        let crop = crop_padded(&img, &face, 0.30);
        // Right/bottom edges clamp at 200: width = 200 - (120 - 30) = 110.
        assert_eq!(crop.width(), 110);
        assert_eq!(crop.height(), 110);
    }

    #[test]
    fn test_extraction_deterministic() {
        let img = blank_image(320, 240);
        let faces = vec![make_box(20.0, 20.0, 100.0, 100.0, 0.8)];
        let ex1 = extractor(faces.clone(), vec![1.0, 2.0], 2);
        let ex2 = extractor(faces, vec![1.0, 2.0], 2);
        let a = ex1.extract(&img, DetectionMode::Accurate).unwrap();
        let b = ex2.extract(&img, DetectionMode::Accurate).unwrap();
        assert_eq!(a.embedding.values, b.embedding.values);
        assert_eq!(a.crop.dimensions(), b.crop.dimensions());
    }
}

//! Bring-up stand-ins for hardware-backed collaborators.
//!
//! Production deployments plug the platform camera and detector in behind
//! `ImageSource` and `FaceDetector`. Until those land on a given device,
//! these stubs let the daemon and CLI run end to end against still images.

use clockface_core::{BoundingBox, CaptureError, DetectionMode, ExtractError, FaceDetector, ImageSource};
use image::GrayImage;
use std::path::PathBuf;

/// Treats the entire frame as one face.
///
/// Only sensible with pre-cropped reference photos or a camera that is
/// physically aimed at a head-height window.
pub struct FullFrameDetector;

impl FaceDetector for FullFrameDetector {
    fn detect(
        &self,
        image: &GrayImage,
        _mode: DetectionMode,
    ) -> Result<Vec<BoundingBox>, ExtractError> {
        Ok(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: image.width() as f32,
            height: image.height() as f32,
            confidence: 1.0,
        }])
    }
}

/// Source for deployments without a camera. Registration still works (it
/// extracts from directory photos); any capture attempt reports the
/// hardware as absent.
pub struct OfflineSource;

impl ImageSource for OfflineSource {
    fn capture(&self) -> Result<GrayImage, CaptureError> {
        Err(CaptureError::SensorUnavailable("no camera configured".into()))
    }
}

/// Serves a fixed image file in place of a live camera.
pub struct StaticImageSource {
    path: PathBuf,
}

impl StaticImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for StaticImageSource {
    fn capture(&self) -> Result<GrayImage, CaptureError> {
        match image::open(&self.path) {
            Ok(img) => Ok(img.to_luma8()),
            Err(err) => Err(CaptureError::Failed(format!(
                "{}: {err}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame_detector_covers_image() {
        let img = GrayImage::new(120, 80);
        let boxes = FullFrameDetector.detect(&img, DetectionMode::Fast).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].width, 120.0);
        assert_eq!(boxes[0].height, 80.0);
    }

    #[test]
    fn test_static_source_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("frame.png");
        GrayImage::from_pixel(16, 16, image::Luma([42u8])).save(&path).unwrap();

        let source = StaticImageSource::new(&path);
        assert_eq!(source.capture().unwrap().dimensions(), (16, 16));
    }

    #[test]
    fn test_static_source_missing_file_is_capture_failure() {
        let source = StaticImageSource::new("/nonexistent/frame.png");
        assert!(matches!(source.capture(), Err(CaptureError::Failed(_))));
    }
}

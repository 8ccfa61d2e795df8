//! Face encoding: detection plus one embedding per detected face.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Detection;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("encoder backend: {0}")]
    Backend(String),
}

/// Pluggable face detection + embedding backend.
pub trait FaceEncoder {
    /// Detect every face in `image` and compute one embedding per face.
    ///
    /// Detections come back in the detector's order (highest confidence first).
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncoderError>;
}

/// SCRFD detection followed by ArcFace embedding, both on ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both models from disk.
    pub fn load(scrfd_path: &Path, arcface_path: &Path) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncoderError> {
        let faces = self.detector.detect(image)?;
        let mut detections = Vec::with_capacity(faces.len());

        for bbox in faces {
            match self.recognizer.extract(image, &bbox) {
                Ok(embedding) => detections.push(Detection { bbox, embedding }),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::debug!(confidence = bbox.confidence, "skipping face without landmarks");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(detections)
    }
}

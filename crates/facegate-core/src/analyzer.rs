//! Face-analysis capability used by the index and the matcher.
//!
//! The recognition loop only needs three primitives: locate faces in a
//! frame, compute embeddings for the faces in an image, and compare a probe
//! embedding against a list of known ones. [`OnnxAnalyzer`] provides them
//! with SCRFD + ArcFace; tests substitute scripted fakes.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::GrayImage;
use thiserror::Error;

/// Default cosine similarity a probe must reach to count as the same face.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.40;

/// Hard failure of the face-analysis backend.
///
/// "No face in this image" is never an error; it is an empty result.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("analysis failed: {0}")]
    Backend(String),
}

pub trait FaceAnalyzer {
    /// Locate every face in `image`. An empty vector means none were found.
    fn locate_faces(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, RecognitionError>;

    /// Embeddings for the faces found in `image`, in detector order.
    fn encode_faces(&mut self, image: &GrayImage) -> Result<Vec<Embedding>, RecognitionError>;

    /// One verdict per entry of `known`, using the backend's default tolerance.
    fn compare_faces(&self, known: &[&Embedding], probe: &Embedding) -> Vec<bool>;
}

/// SCRFD detection + ArcFace embedding via ONNX Runtime.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    threshold: f32,
}

impl OnnxAnalyzer {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(
        scrfd_path: &str,
        arcface_path: &str,
        threshold: f32,
    ) -> Result<Self, RecognitionError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        tracing::info!(threshold, "face analyzer ready");
        Ok(Self {
            detector,
            recognizer,
            threshold,
        })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn locate_faces(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, RecognitionError> {
        let detections = self.detector.detect(image)?;
        Ok(detections.into_iter().map(|d| d.bbox).collect())
    }

    fn encode_faces(&mut self, image: &GrayImage) -> Result<Vec<Embedding>, RecognitionError> {
        let detections = self.detector.detect(image)?;
        let mut embeddings = Vec::with_capacity(detections.len());

        for detection in &detections {
            let Some((x, y, w, h)) = detection.bbox.clamp_to(image.width(), image.height()) else {
                continue;
            };
            let crop = image::imageops::crop_imm(image, x, y, w, h).to_image();
            embeddings.push(self.recognizer.extract(&crop)?);
        }

        tracing::debug!(
            faces = detections.len(),
            embeddings = embeddings.len(),
            "encoded faces"
        );
        Ok(embeddings)
    }

    fn compare_faces(&self, known: &[&Embedding], probe: &Embedding) -> Vec<bool> {
        known
            .iter()
            .map(|k| k.similarity(probe) >= self.threshold)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted analyzer shared by the index and matcher tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};

    /// Analyzer whose results are keyed by the first pixel of the image.
    ///
    /// Comparison is exact equality of embedding values.
    #[derive(Default)]
    pub struct ScriptedAnalyzer {
        pub faces: HashMap<u8, Vec<BoundingBox>>,
        pub embeddings: HashMap<u8, Vec<Embedding>>,
        pub failures: VecDeque<u8>,
        pub encode_calls: usize,
    }

    impl ScriptedAnalyzer {
        pub fn with_embedding(mut self, marker: u8, values: Vec<f32>) -> Self {
            self.embeddings
                .entry(marker)
                .or_default()
                .push(Embedding::new(values));
            self
        }

        pub fn failing_on(mut self, marker: u8) -> Self {
            self.failures.push_back(marker);
            self
        }
    }

    pub fn marked_image(marker: u8, width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([marker]))
    }

    fn marker_of(image: &GrayImage) -> u8 {
        image.get_pixel(0, 0).0[0]
    }

    impl FaceAnalyzer for ScriptedAnalyzer {
        fn locate_faces(
            &mut self,
            image: &GrayImage,
        ) -> Result<Vec<BoundingBox>, RecognitionError> {
            Ok(self.faces.get(&marker_of(image)).cloned().unwrap_or_default())
        }

        fn encode_faces(&mut self, image: &GrayImage) -> Result<Vec<Embedding>, RecognitionError> {
            self.encode_calls += 1;
            let marker = marker_of(image);
            if self.failures.contains(&marker) {
                return Err(RecognitionError::Backend(format!("scripted failure {marker}")));
            }
            Ok(self.embeddings.get(&marker).cloned().unwrap_or_default())
        }

        fn compare_faces(&self, known: &[&Embedding], probe: &Embedding) -> Vec<bool> {
            known.iter().map(|k| k.values == probe.values).collect()
        }
    }
}

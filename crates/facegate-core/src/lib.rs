//! facegate-core: the recognition decision pipeline.
//!
//! Candidate selection picks one face per frame, the matcher compares it
//! against the identity index, and the [`FaceAnalyzer`] capability supplies
//! detection, embeddings, and comparison (SCRFD + ArcFace via ONNX Runtime
//! in production).

pub mod analyzer;
pub mod detector;
pub mod index;
pub mod matcher;
pub mod recognizer;
pub mod selector;
pub mod types;

pub use analyzer::{FaceAnalyzer, OnnxAnalyzer, RecognitionError, DEFAULT_SIMILARITY_THRESHOLD};
pub use index::{EnrollmentError, IdentityIndex, IndexLoadError, LabeledImage};
pub use matcher::{identify, recognize};
pub use selector::select_candidate;
pub use types::{AccessDecision, BoundingBox, Embedding, FaceRecord};

/// Default directory for ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/facegate/models")
}

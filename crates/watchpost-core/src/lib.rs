//! watchpost-core: face encoding and gallery matching.
//!
//! SCRFD face detection and ArcFace embeddings run on ONNX Runtime; the
//! gallery compares probes against known identities by embedding distance.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod recognizer;
pub mod types;

pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use gallery::Gallery;
pub use types::{
    BoundingBox, CosineMatcher, Detection, Embedding, EuclideanMatcher, Identity, MatchResult,
    Matcher, Verdict,
};

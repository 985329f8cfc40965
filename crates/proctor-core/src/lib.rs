//! proctor-core — Per-frame cheating-signal analysis and session violation policy.
//!
//! Face count, identity embedding, head pose and gaze come from a SCRFD detector
//! plus a 468-point face mesh; prohibited items from a YOLO object detector.
//! Both run via ONNX Runtime on CPU. Classification and policy are pure.

pub mod classifier;
pub mod config;
pub mod detector;
pub mod face;
pub mod face_mesh;
pub mod frame;
pub mod gaze;
pub mod identity;
pub mod models;
pub mod objects;
pub mod policy;
pub mod pose;
pub mod preprocess;
pub mod session;
pub mod types;

use std::path::PathBuf;

pub use classifier::classify;
pub use config::Thresholds;
pub use face::FaceAnalyzer;
pub use frame::{Frame, FrameError};
pub use gaze::GazeEstimator;
pub use identity::{cosine_similarity, IdentityVerifier};
pub use models::{InferenceError, LandmarkModel, ObjectModel, OnnxFaceLandmarker, OnnxObjectDetector};
pub use objects::{classify_detections, classify_labels};
pub use policy::{PolicyDecision, PolicyEngine};
pub use session::{SessionState, SessionStatus, ViolationEvent, ViolationKind};
pub use types::{
    BoundingBox, Embedding, FaceDetection, FaceMesh, FaceObservation, FaceScan, GazeDirection,
    HeadPose, Landmark, ObjectDetection, ObjectObservation,
};

/// Default ONNX model directory: `$XDG_DATA_HOME/proctor/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("proctor/models")
}

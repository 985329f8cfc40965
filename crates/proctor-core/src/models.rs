//! Model capabilities consumed by the pipeline, and their ONNX implementations.
//!
//! Both traits take `&mut self`: ONNX sessions are not shared across threads, so
//! callers serialize access to one instance.

use crate::detector::{DetectorError, FaceDetector};
use crate::face_mesh::{FaceMeshError, FaceMeshModel};
use crate::frame::Frame;
use crate::objects::{ObjectDetector, ObjectDetectorError};
use crate::types::{FaceScan, ObjectDetection};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("face detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("face mesh: {0}")]
    FaceMesh(#[from] FaceMeshError),
    #[error("object detector: {0}")]
    Objects(#[from] ObjectDetectorError),
    #[error("{0}")]
    Other(String),
}

/// Face-landmark capability: face count plus the mesh of the primary face.
pub trait LandmarkModel: Send {
    fn scan(&mut self, frame: &Frame) -> Result<FaceScan, InferenceError>;
}

/// Generic object detection capability.
pub trait ObjectModel: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, InferenceError>;
}

/// SCRFD boxes + face mesh on the highest-confidence face.
pub struct OnnxFaceLandmarker {
    detector: FaceDetector,
    mesh: FaceMeshModel,
}

impl OnnxFaceLandmarker {
    pub fn load(detector_path: &Path, mesh_path: &Path) -> Result<Self, InferenceError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            mesh: FaceMeshModel::load(mesh_path)?,
        })
    }
}

impl LandmarkModel for OnnxFaceLandmarker {
    fn scan(&mut self, frame: &Frame) -> Result<FaceScan, InferenceError> {
        let faces = self.detector.detect(frame)?;
        let mesh = match faces.first() {
            Some(primary) => Some(self.mesh.infer(frame, primary)?),
            None => None,
        };
        tracing::trace!(faces = faces.len(), "face scan complete");
        Ok(FaceScan { faces, mesh })
    }
}

/// YOLO object detector.
pub struct OnnxObjectDetector {
    detector: ObjectDetector,
}

impl OnnxObjectDetector {
    pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
        Ok(Self {
            detector: ObjectDetector::load(model_path)?,
        })
    }
}

impl ObjectModel for OnnxObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, InferenceError> {
        Ok(self.detector.detect(frame)?)
    }
}

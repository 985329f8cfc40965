//! Dense face mesh (468 landmarks, MediaPipe topology) via ONNX Runtime.
//!
//! Runs on a square crop around a detected face and maps the landmarks back to
//! frame pixel coordinates.

use crate::frame::Frame;
use crate::preprocess::{crop_nchw, face_crop_region};
use crate::types::{BoundingBox, FaceDetection, FaceMesh, Landmark};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACE_MESH_INPUT_SIZE: usize = 192;
const FACE_MESH_POINTS: usize = 468;
/// Crop side = face box side × (1 + margin).
const FACE_MESH_CROP_MARGIN: f32 = 0.5;
const FACE_MESH_MODEL_VERSION: &str = "face_landmark_468";

/// Mesh indices used by pose and gaze estimation.
pub const NOSE_TIP: usize = 1;
pub const LEFT_EYE: usize = 33;
pub const RIGHT_EYE: usize = 263;
pub const CHIN: usize = 152;

#[derive(Error, Debug)]
pub enum FaceMeshError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face mesh landmark regressor.
pub struct FaceMeshModel {
    session: Session,
    num_outputs: usize,
}

impl FaceMeshModel {
    /// Load the face landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, FaceMeshError> {
        if !model_path.exists() {
            return Err(FaceMeshError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded face mesh model"
        );

        Ok(Self {
            session,
            num_outputs: output_names.len(),
        })
    }

    /// Regress the mesh for one detected face.
    pub fn infer(&mut self, frame: &Frame, face: &FaceDetection) -> Result<FaceMesh, FaceMeshError> {
        let region = face_crop_region(frame, &face.bbox, FACE_MESH_CROP_MARGIN);
        let input = crop_nchw(frame, &region, FACE_MESH_INPUT_SIZE, |p| p / 255.0);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // The landmark tensor is the first output large enough to hold the mesh;
        // the remaining output is the face-presence score.
        let mut raw: Option<Vec<f32>> = None;
        for idx in 0..self.num_outputs {
            let (_, data) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| FaceMeshError::InferenceFailed(format!("landmarks: {e}")))?;
            if data.len() >= FACE_MESH_POINTS * 3 {
                raw = Some(data.to_vec());
                break;
            }
        }
        let raw = raw.ok_or_else(|| {
            FaceMeshError::InferenceFailed(format!(
                "no output with {} landmark values",
                FACE_MESH_POINTS * 3
            ))
        })?;

        Ok(FaceMesh {
            points: map_to_frame(&raw, &region, FACE_MESH_INPUT_SIZE),
            model_version: FACE_MESH_MODEL_VERSION.to_string(),
        })
    }
}

/// Map crop-space (x, y, z) triples back to frame coordinates.
fn map_to_frame(raw: &[f32], region: &BoundingBox, input_size: usize) -> Vec<Landmark> {
    let sx = region.width / input_size as f32;
    let sy = region.height / input_size as f32;
    raw.chunks_exact(3)
        .take(FACE_MESH_POINTS)
        .map(|p| Landmark {
            x: region.x + p[0] * sx,
            y: region.y + p[1] * sy,
            z: p[2] * sx,
        })
        .collect()
}

//! Face analysis: face count, identity embedding and head pose for one frame.

use crate::pose::mesh_head_pose;
use crate::types::{Embedding, FaceMesh, FaceObservation, FaceScan};

/// Derives a [`FaceObservation`] from a landmark scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaceAnalyzer;

impl FaceAnalyzer {
    /// Embedding and pose are only computed when exactly one face is present.
    pub fn observe(&self, scan: &FaceScan) -> FaceObservation {
        let face_count = scan.face_count();
        if face_count != 1 {
            return FaceObservation {
                face_count,
                embedding: None,
                head_pose: None,
            };
        }

        let Some(mesh) = scan.mesh.as_ref() else {
            tracing::debug!("single face without mesh; skipping embedding");
            return FaceObservation {
                face_count,
                embedding: None,
                head_pose: None,
            };
        };

        FaceObservation {
            face_count,
            embedding: mesh_embedding(mesh),
            head_pose: mesh_head_pose(mesh),
        }
    }
}

/// Flattened (x, y, z) landmark vector in mesh order, L2-normalized.
pub fn mesh_embedding(mesh: &FaceMesh) -> Option<Embedding> {
    if mesh.points.is_empty() {
        return None;
    }
    let raw: Vec<f32> = mesh.points.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
    Some(Embedding::normalized(raw, Some(mesh.model_version.clone())))
}

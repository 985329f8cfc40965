//! Coarse gaze direction from the face mesh.

use crate::config::DEFAULT_GAZE_LIMIT;
use crate::pose::mesh_head_pose;
use crate::types::{FaceScan, GazeDirection};

/// Classifies gaze as center/away using the same landmark ratios as head pose,
/// with a tighter angular limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeEstimator {
    pub limit_degrees: f32,
}

impl Default for GazeEstimator {
    fn default() -> Self {
        Self {
            limit_degrees: DEFAULT_GAZE_LIMIT,
        }
    }
}

impl GazeEstimator {
    pub fn new(limit_degrees: f32) -> Self {
        Self { limit_degrees }
    }

    /// Only a single-face frame can look away. No face, several faces or no
    /// usable mesh is `Center`: those frames are reported by the face signal.
    pub fn estimate(&self, scan: &FaceScan) -> GazeDirection {
        if scan.face_count() != 1 {
            return GazeDirection::Center;
        }
        let Some(pose) = scan.mesh.as_ref().and_then(mesh_head_pose) else {
            return GazeDirection::Center;
        };
        if pose.exceeds(self.limit_degrees) {
            GazeDirection::Away
        } else {
            GazeDirection::Center
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::tests::pose_mesh;
    use crate::types::{BoundingBox, FaceDetection};

    fn scan(nose: (f32, f32)) -> FaceScan {
        FaceScan {
            faces: vec![FaceDetection {
                bbox: BoundingBox { x: 0.0, y: 0.0, width: 80.0, height: 80.0 },
                confidence: 0.9,
                keypoints: None,
            }],
            mesh: Some(pose_mesh(nose, (90.0, 100.0), (130.0, 100.0), (110.0, 220.0))),
        }
    }

    #[test]
    fn test_no_face_is_center() {
        assert_eq!(GazeEstimator::default().estimate(&FaceScan::default()), GazeDirection::Center);
    }

    #[test]
    fn test_centered_nose_is_center() {
        // yaw 0; pitch = 6/120 rad-equivalent ≈ 2.9°
        assert_eq!(GazeEstimator::default().estimate(&scan((110.0, 106.0))), GazeDirection::Center);
    }

    #[test]
    fn test_turned_head_is_away() {
        // yaw = 12/40 → ≈ 17.2°
        assert_eq!(GazeEstimator::default().estimate(&scan((122.0, 106.0))), GazeDirection::Away);
    }

    #[test]
    fn test_several_faces_are_center() {
        let mut crowded = scan((122.0, 106.0));
        crowded.faces.push(crowded.faces[0].clone());
        assert_eq!(GazeEstimator::default().estimate(&crowded), GazeDirection::Center);
    }

    #[test]
    fn test_limit_is_configurable() {
        assert_eq!(GazeEstimator::new(20.0).estimate(&scan((122.0, 106.0))), GazeDirection::Center);
    }
}

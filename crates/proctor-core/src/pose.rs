//! Coarse head-pose proxy from four mesh landmarks.
//!
//! This is not a calibrated 3-D pose. The ratios below are kept exactly as-is so
//! thresholds tuned against them stay meaningful.

use crate::face_mesh::{CHIN, LEFT_EYE, NOSE_TIP, RIGHT_EYE};
use crate::types::{FaceMesh, HeadPose, Landmark};

const RAD_TO_DEG: f32 = 180.0 / std::f32::consts::PI;

/// Yaw/pitch from nose tip, left-eye, right-eye and chin landmarks.
///
/// Returns `None` when the geometry is degenerate (non-finite result).
pub fn head_pose(nose: Landmark, left_eye: Landmark, right_eye: Landmark, chin: Landmark) -> Option<HeadPose> {
    let eye_center_x = (left_eye.x + right_eye.x) / 2.0;
    let eye_center_y = (left_eye.y + right_eye.y) / 2.0;

    let yaw = (nose.x - eye_center_x) / (right_eye.x - left_eye.x) * RAD_TO_DEG;
    let pitch = (nose.y - eye_center_y) / (chin.y - eye_center_y) * RAD_TO_DEG;

    (yaw.is_finite() && pitch.is_finite()).then_some(HeadPose { yaw, pitch })
}

/// Head pose for a mesh in the standard 468-point order.
pub fn mesh_head_pose(mesh: &FaceMesh) -> Option<HeadPose> {
    head_pose(
        mesh.point(NOSE_TIP)?,
        mesh.point(LEFT_EYE)?,
        mesh.point(RIGHT_EYE)?,
        mesh.point(CHIN)?,
    )
}

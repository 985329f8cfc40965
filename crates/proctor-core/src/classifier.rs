//! Fuses per-frame analyzer outputs into an ordered list of violations.

use crate::config::Thresholds;
use crate::identity::IdentityVerifier;
use crate::session::{SessionState, ViolationKind};
use crate::types::{FaceObservation, GazeDirection, ObjectObservation};

/// Pure classification of one frame.
///
/// A `None` input means that analyzer produced no signal for the frame. Output order
/// is face-derived kinds, then gaze, then object/person kinds; no kind repeats.
pub fn classify(
    face: Option<&FaceObservation>,
    gaze: Option<GazeDirection>,
    objects: Option<&ObjectObservation>,
    session: &SessionState,
    thresholds: &Thresholds,
) -> Vec<ViolationKind> {
    let mut violations = Vec::new();

    if let Some(face) = face {
        match face.face_count {
            0 => violations.push(ViolationKind::NoFaceDetected),
            1 => {
                if face_mismatch(face, session, thresholds) {
                    violations.push(ViolationKind::FaceMismatch);
                }
                if face
                    .head_pose
                    .is_some_and(|pose| pose.exceeds(thresholds.head_pose_degrees))
                {
                    violations.push(ViolationKind::HeadPoseAway);
                }
            }
            _ => violations.push(ViolationKind::MultipleFacesDetected),
        }
    }

    if gaze == Some(GazeDirection::Away) {
        violations.push(ViolationKind::GazeAway);
    }

    if let Some(objects) = objects {
        if !objects.objects.is_empty() {
            violations.push(ViolationKind::ObjectDetected);
        }
        if objects.person_count >= 2 {
            violations.push(ViolationKind::MultiplePersonsDetected);
        }
    }

    violations
}

/// One-shot mismatch: only while the session has not already recorded one.
fn face_mismatch(face: &FaceObservation, session: &SessionState, thresholds: &Thresholds) -> bool {
    if session.face_mismatch_detected {
        return false;
    }
    let Some(reference) = session.reference_embedding.as_ref() else {
        return false;
    };
    let verifier = IdentityVerifier::new(thresholds.similarity);
    !verifier.is_match(face.embedding.as_ref(), Some(reference))
}

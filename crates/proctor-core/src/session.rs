//! Session state and violation vocabulary shared by the classifier and the policy engine.

use crate::types::Embedding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Discrete proctoring-integrity signal attached to one frame.
///
/// Variant order is the order the classifier emits them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFaceDetected,
    MultipleFacesDetected,
    FaceMismatch,
    HeadPoseAway,
    GazeAway,
    ObjectDetected,
    MultiplePersonsDetected,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 7] = [
        ViolationKind::NoFaceDetected,
        ViolationKind::MultipleFacesDetected,
        ViolationKind::FaceMismatch,
        ViolationKind::HeadPoseAway,
        ViolationKind::GazeAway,
        ViolationKind::ObjectDetected,
        ViolationKind::MultiplePersonsDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoFaceDetected => "no_face_detected",
            ViolationKind::MultipleFacesDetected => "multiple_faces_detected",
            ViolationKind::FaceMismatch => "face_mismatch",
            ViolationKind::HeadPoseAway => "head_pose_away",
            ViolationKind::GazeAway => "gaze_away",
            ViolationKind::ObjectDetected => "object_detected",
            ViolationKind::MultiplePersonsDetected => "multiple_persons_detected",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A violation stamped with the time the frame was processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Terminated,
    Completed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Completed => "completed",
        })
    }
}

/// Per-attempt proctoring state, owned by the external session store.
///
/// Counters only move through [`PolicyEngine::apply`](crate::policy::PolicyEngine::apply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub reference_embedding: Option<Embedding>,
    #[serde(default)]
    pub violation_counts: BTreeMap<ViolationKind, u32>,
    #[serde(default)]
    pub total_violations: u32,
    #[serde(default)]
    pub face_mismatch_detected: bool,
    #[serde(default)]
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Fresh in-progress session with zeroed counters.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            reference_embedding: None,
            violation_counts: BTreeMap::new(),
            total_violations: 0,
            face_mismatch_detected: false,
            status: SessionStatus::InProgress,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn count(&self, kind: ViolationKind) -> u32 {
        self.violation_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    /// Store the enrollment embedding. Returns false if a reference already exists.
    pub fn set_reference(&mut self, embedding: Embedding) -> bool {
        if self.reference_embedding.is_some() {
            return false;
        }
        self.reference_embedding = Some(embedding);
        true
    }

    /// External submit / time-expiry. Returns false when the session was already terminal.
    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.ended_at = Some(Utc::now());
        true
    }
}

//! Session policy: counts violations and decides termination.

use crate::config::DEFAULT_MAX_VIOLATIONS;
use crate::session::{SessionState, SessionStatus, ViolationKind};
use chrono::Utc;
use serde::Serialize;

/// Outcome of applying one frame's violations to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    /// True whenever the session is (or just became) terminal.
    pub end_exam: bool,
    pub status: SessionStatus,
    /// Violations that were actually counted, after one-shot dedupe.
    pub recorded: Vec<ViolationKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEngine {
    /// Terminate once `total_violations` strictly exceeds this value.
    pub max_violations: u32,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self {
            max_violations: DEFAULT_MAX_VIOLATIONS,
        }
    }
}

impl PolicyEngine {
    pub fn new(max_violations: u32) -> Self {
        Self { max_violations }
    }

    /// Record `violations` against `state` and evaluate termination.
    ///
    /// Terminal sessions are left untouched. Callers must serialize `apply` per session.
    pub fn apply(&self, state: &mut SessionState, violations: &[ViolationKind]) -> PolicyDecision {
        if state.status.is_terminal() {
            if !violations.is_empty() {
                tracing::debug!(
                    session_id = %state.session_id,
                    status = %state.status,
                    dropped = violations.len(),
                    "session closed; violations dropped"
                );
            }
            return PolicyDecision {
                end_exam: true,
                status: state.status,
                recorded: Vec::new(),
            };
        }

        let mut recorded = Vec::with_capacity(violations.len());
        for &kind in violations {
            if kind == ViolationKind::FaceMismatch {
                if state.face_mismatch_detected {
                    continue;
                }
                state.face_mismatch_detected = true;
            }
            let count = state.violation_counts.entry(kind).or_insert(0);
            *count = count.saturating_add(1);
            state.total_violations = state.total_violations.saturating_add(1);
            recorded.push(kind);
        }

        let end_exam = state.total_violations > self.max_violations;
        if end_exam {
            state.status = SessionStatus::Terminated;
            state.ended_at = Some(Utc::now());
            tracing::info!(
                session_id = %state.session_id,
                total = state.total_violations,
                limit = self.max_violations,
                "violation limit exceeded; session terminated"
            );
        }

        PolicyDecision {
            end_exam,
            status: state.status,
            recorded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ViolationKind::*;

    #[test]
    fn test_counts_each_event() {
        let mut state = SessionState::new("s");
        let decision = PolicyEngine::default().apply(&mut state, &[NoFaceDetected]);
        assert!(!decision.end_exam);
        assert_eq!(decision.recorded, vec![NoFaceDetected]);
        assert_eq!(state.count(NoFaceDetected), 1);
        assert_eq!(state.total_violations, 1);

        PolicyEngine::default().apply(&mut state, &[NoFaceDetected, GazeAway]);
        assert_eq!(state.count(NoFaceDetected), 2);
        assert_eq!(state.count(GazeAway), 1);
        assert_eq!(state.total_violations, 3);
    }

    #[test]
    fn test_face_mismatch_one_shot() {
        let engine = PolicyEngine::new(100);
        let mut state = SessionState::new("s");

        let first = engine.apply(&mut state, &[FaceMismatch]);
        assert_eq!(first.recorded, vec![FaceMismatch]);
        assert!(state.face_mismatch_detected);

        let second = engine.apply(&mut state, &[FaceMismatch, GazeAway]);
        assert_eq!(second.recorded, vec![GazeAway]);
        assert_eq!(state.count(FaceMismatch), 1);
        assert_eq!(state.total_violations, 2);
    }

    #[test]
    fn test_boundary_equal_does_not_terminate() {
        let engine = PolicyEngine::new(5);
        let mut state = SessionState::new("s");
        let d = engine.apply(&mut state, &[NoFaceDetected; 5]);
        assert_eq!(state.total_violations, 5);
        assert!(!d.end_exam);
        assert_eq!(d.status, SessionStatus::InProgress);

        let d = engine.apply(&mut state, &[GazeAway]);
        assert_eq!(state.total_violations, 6);
        assert!(d.end_exam);
        assert_eq!(d.status, SessionStatus::Terminated);
        assert!(state.ended_at.is_some());
    }

    #[test]
    fn test_terminated_session_drops_violations() {
        let engine = PolicyEngine::new(5);
        let mut state = SessionState::new("s");
        state.total_violations = 5;
        state.violation_counts.insert(GazeAway, 5);

        let d = engine.apply(&mut state, &[ObjectDetected]);
        assert!(d.end_exam);
        assert_eq!(state.status, SessionStatus::Terminated);

        let snapshot = state.clone();
        let d = engine.apply(&mut state, &[NoFaceDetected, MultiplePersonsDetected]);
        assert!(d.end_exam);
        assert_eq!(d.status, SessionStatus::Terminated);
        assert!(d.recorded.is_empty());
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_completed_session_is_noop() {
        let mut state = SessionState::new("s");
        state.complete();
        let snapshot = state.clone();
        let d = PolicyEngine::new(0).apply(&mut state, &[NoFaceDetected]);
        assert_eq!(d.status, SessionStatus::Completed);
        assert!(d.end_exam);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_counters_monotonic() {
        let engine = PolicyEngine::new(1000);
        let mut state = SessionState::new("s");
        let frames: [&[ViolationKind]; 4] = [&[GazeAway], &[], &[FaceMismatch, ObjectDetected], &[FaceMismatch]];
        let mut prev_total = 0;
        let mut prev_counts = state.violation_counts.clone();
        for frame in frames {
            engine.apply(&mut state, frame);
            assert!(state.total_violations >= prev_total);
            for (kind, count) in &prev_counts {
                assert!(state.count(*kind) >= *count);
            }
            prev_total = state.total_violations;
            prev_counts = state.violation_counts.clone();
        }
        assert_eq!(state.total_violations, 3);
    }

    #[test]
    fn test_empty_frame_no_change() {
        let mut state = SessionState::new("s");
        let d = PolicyEngine::default().apply(&mut state, &[]);
        assert!(!d.end_exam);
        assert_eq!(state.total_violations, 0);
    }
}

//! Per-frame pipeline: analyze, classify, apply policy, persist.
//!
//! Face, gaze and object analysis run concurrently for each frame; face and gaze
//! share a single landmark scan. Frames of one session are applied strictly one
//! at a time so no counter update is lost.

use crate::config::{Config, ScannerConfig};
use crate::queue::{InferenceQueue, QueueError};
use crate::registry::{ModelLoadError, ModelRegistry};
use crate::scanner::{LocalObjectScanner, ObjectScanner, RemoteObjectScanner, ScanError};
use crate::store::{SessionStore, StoreError};
use chrono::Utc;
use proctor_core::{
    classify, FaceAnalyzer, FaceScan, Frame, FrameError, GazeDirection, GazeEstimator, HeadPose,
    LandmarkModel, PolicyEngine, SessionState, SessionStatus, Thresholds, ViolationEvent,
    ViolationKind,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OnceCell, OwnedMutexGuard};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("landmark inference failed: {0}")]
    Inference(String),
    #[error("frame decode task failed: {0}")]
    DecodeTask(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("session already exists: {0}")]
    SessionExists(String),
    #[error("reference capture needs exactly one face, found {face_count}")]
    NoFaceDetected { face_count: usize },
    #[error("session {0} already has a reference face")]
    ReferenceAlreadySet(String),
    #[error("session {session_id} is {status}")]
    SessionClosed {
        session_id: String,
        status: SessionStatus,
    },
}

/// A frame as delivered by the web layer.
#[derive(Debug, Clone)]
pub struct FrameSubmission {
    pub session_id: String,
    /// Encoded image bytes (JPEG, PNG, ...).
    pub image: Vec<u8>,
    /// Enrollment capture instead of a proctored frame.
    pub is_reference_capture: bool,
}

/// Result of one proctored frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub session_id: String,
    /// Violations counted for this frame, in emission order.
    pub violations: Vec<ViolationKind>,
    /// `None` when the landmark model produced no signal.
    pub face_count: Option<usize>,
    pub gaze: Option<GazeDirection>,
    pub detected_objects: Vec<String>,
    pub person_count: usize,
    pub head_pose: Option<HeadPose>,
    /// The exam must stop: the session is terminated or completed.
    pub end_exam: bool,
    pub status: SessionStatus,
    pub events: Vec<ViolationEvent>,
    /// The image could not be decoded and was not analyzed.
    pub skipped: bool,
}

impl FrameReport {
    fn unanalyzed(state: &SessionState, skipped: bool) -> Self {
        Self {
            session_id: state.session_id.clone(),
            violations: Vec::new(),
            face_count: None,
            gaze: None,
            detected_objects: Vec::new(),
            person_count: 0,
            head_pose: None,
            end_exam: state.status.is_terminal(),
            status: state.status,
            events: Vec::new(),
            skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub session_id: String,
    pub dimensions: usize,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    Enrolled(Enrollment),
    Frame(FrameReport),
}

/// One landmark scan per frame, shared by the face and gaze branches.
///
/// Inference errors are logged once and read as "no signal" by both branches.
struct FrameScan {
    frame: Arc<Frame>,
    model: InferenceQueue<dyn LandmarkModel>,
    cell: OnceCell<Option<Arc<FaceScan>>>,
}

impl FrameScan {
    fn new(frame: Arc<Frame>, model: InferenceQueue<dyn LandmarkModel>) -> Self {
        Self {
            frame,
            model,
            cell: OnceCell::new(),
        }
    }

    async fn get(&self) -> Option<Arc<FaceScan>> {
        self.cell
            .get_or_init(|| async {
                let frame = Arc::clone(&self.frame);
                match self.model.run(move |m| m.scan(&frame)).await {
                    Ok(Ok(scan)) => Some(Arc::new(scan)),
                    Ok(Err(error)) => {
                        tracing::warn!(%error, "landmark scan failed; no face signal");
                        None
                    }
                    Err(error) => {
                        tracing::warn!(%error, "landmark queue failed; no face signal");
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

/// Per-session async locks. An entry lives only while some caller holds or
/// waits on it.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> SessionGuard<'_> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        SessionGuard {
            locks: self,
            session_id: session_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn release_if_idle(&self, session_id: &str) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the duration of one session operation. Dropping it, on success,
/// error or cancellation, unlocks the session and prunes the idle entry.
struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release_if_idle(&self.session_id);
    }
}

/// Decode and bound an uploaded image on the blocking pool.
async fn decode_frame(image: &[u8]) -> Result<Result<Frame, FrameError>, PipelineError> {
    let bytes = image.to_vec();
    tokio::task::spawn_blocking(move || Frame::decode(&bytes).map(Frame::bounded_default))
        .await
        .map_err(|e| PipelineError::DecodeTask(e.to_string()))
}

pub struct Proctor {
    registry: Arc<ModelRegistry>,
    scanner: Arc<dyn ObjectScanner>,
    store: Arc<dyn SessionStore>,
    thresholds: Thresholds,
    policy: PolicyEngine,
    face: FaceAnalyzer,
    gaze: GazeEstimator,
    locks: SessionLocks,
}

impl Proctor {
    pub fn new(
        registry: Arc<ModelRegistry>,
        scanner: Arc<dyn ObjectScanner>,
        store: Arc<dyn SessionStore>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            registry,
            scanner,
            store,
            policy: PolicyEngine::new(thresholds.max_violations),
            face: FaceAnalyzer,
            gaze: GazeEstimator::new(thresholds.gaze_degrees),
            thresholds,
            locks: SessionLocks::default(),
        }
    }

    /// Wire registry and scanner backend from `config`.
    pub fn from_config(config: &Config, store: Arc<dyn SessionStore>) -> Self {
        let registry = Arc::new(ModelRegistry::from_config(config));
        let scanner: Arc<dyn ObjectScanner> = match &config.scanner {
            ScannerConfig::Local => Arc::new(LocalObjectScanner::new(
                Arc::clone(&registry),
                config.thresholds.clone(),
            )),
            ScannerConfig::Remote { url, timeout_secs } => Arc::new(RemoteObjectScanner::new(
                url.clone(),
                Duration::from_secs(*timeout_secs),
                config.thresholds.clone(),
            )),
        };
        tracing::info!(scanner = scanner.name(), model_dir = %config.model_dir.display(), "proctor configured");
        Self::new(registry, scanner, store, config.thresholds.clone())
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Analyze one frame against `state` and apply the resulting violations.
    ///
    /// Terminal sessions are not analyzed. The caller is responsible for
    /// serializing calls on the same state.
    pub async fn evaluate(
        &self,
        frame: &Frame,
        state: &mut SessionState,
    ) -> Result<FrameReport, PipelineError> {
        if state.status.is_terminal() {
            tracing::debug!(session_id = %state.session_id, status = %state.status, "session closed; frame ignored");
            return Ok(FrameReport::unanalyzed(state, false));
        }

        let landmarks = self.registry.face_mesh().await?;
        let frame = Arc::new(frame.clone().bounded_default());
        let scan = FrameScan::new(Arc::clone(&frame), landmarks);

        let (face, gaze, objects) = tokio::join!(
            async { scan.get().await.map(|s| self.face.observe(&s)) },
            async { scan.get().await.map(|s| self.gaze.estimate(&s)) },
            self.scanner.scan(Arc::clone(&frame)),
        );

        let objects = match objects {
            Ok(observation) => Some(observation),
            Err(ScanError::ModelLoad(e)) => return Err(e.into()),
            Err(error) => {
                tracing::warn!(
                    session_id = %state.session_id,
                    scanner = self.scanner.name(),
                    %error,
                    "object scan failed; no object signal"
                );
                None
            }
        };

        let violations = classify(
            face.as_ref(),
            gaze,
            objects.as_ref(),
            state,
            &self.thresholds,
        );
        let decision = self.policy.apply(state, &violations);

        let at = Utc::now();
        let events = decision
            .recorded
            .iter()
            .map(|&kind| ViolationEvent { kind, at })
            .collect();

        tracing::debug!(
            session_id = %state.session_id,
            face_count = ?face.as_ref().map(|f| f.face_count),
            violations = ?decision.recorded,
            total = state.total_violations,
            end_exam = decision.end_exam,
            "frame processed"
        );

        let objects = objects.unwrap_or_default();
        Ok(FrameReport {
            session_id: state.session_id.clone(),
            violations: decision.recorded,
            face_count: face.as_ref().map(|f| f.face_count),
            gaze,
            detected_objects: objects.objects,
            person_count: objects.person_count,
            head_pose: face.and_then(|f| f.head_pose),
            end_exam: decision.end_exam,
            status: decision.status,
            events,
            skipped: false,
        })
    }

    /// Store-backed frame processing. Undecodable images are skipped, not errors.
    pub async fn process_frame(
        &self,
        session_id: &str,
        image: &[u8],
    ) -> Result<FrameReport, PipelineError> {
        let decoded = decode_frame(image).await?;

        let _guard = self.locks.acquire(session_id).await;
        let mut state = self.load(session_id).await?;

        let frame = match decoded {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(session_id, %error, "undecodable frame skipped");
                return Ok(FrameReport::unanalyzed(&state, true));
            }
        };

        let report = self.evaluate(&frame, &mut state).await?;
        self.store.put(session_id, state).await?;
        Ok(report)
    }

    /// Store the reference embedding from a capture with exactly one face.
    pub async fn enroll(&self, session_id: &str, image: &[u8]) -> Result<Enrollment, PipelineError> {
        let frame = Arc::new(decode_frame(image).await??);

        let _guard = self.locks.acquire(session_id).await;
        let mut state = self.load(session_id).await?;
        if state.status.is_terminal() {
            return Err(PipelineError::SessionClosed {
                session_id: session_id.to_string(),
                status: state.status,
            });
        }
        if state.reference_embedding.is_some() {
            return Err(PipelineError::ReferenceAlreadySet(session_id.to_string()));
        }

        let landmarks = self.registry.face_mesh().await?;
        let scan = landmarks
            .run(move |m| m.scan(&frame))
            .await?
            .map_err(|e| PipelineError::Inference(e.to_string()))?;
        let observation = self.face.observe(&scan);

        let embedding = match observation.embedding {
            Some(embedding) if observation.face_count == 1 && !embedding.is_empty() => embedding,
            _ => {
                return Err(PipelineError::NoFaceDetected {
                    face_count: observation.face_count,
                })
            }
        };

        let enrollment = Enrollment {
            session_id: session_id.to_string(),
            dimensions: embedding.values.len(),
            model_version: embedding.model_version.clone(),
        };
        state.set_reference(embedding);
        self.store.put(session_id, state).await?;

        tracing::info!(session_id, dimensions = enrollment.dimensions, "reference face enrolled");
        Ok(enrollment)
    }

    /// Route a submission to enrollment or frame processing.
    pub async fn submit(&self, submission: FrameSubmission) -> Result<Submission, PipelineError> {
        if submission.is_reference_capture {
            self.enroll(&submission.session_id, &submission.image)
                .await
                .map(Submission::Enrolled)
        } else {
            self.process_frame(&submission.session_id, &submission.image)
                .await
                .map(Submission::Frame)
        }
    }

    pub async fn start_session(&self, session_id: &str) -> Result<SessionState, PipelineError> {
        let _guard = self.locks.acquire(session_id).await;
        if self.store.get(session_id).await?.is_some() {
            return Err(PipelineError::SessionExists(session_id.to_string()));
        }
        let state = SessionState::new(session_id);
        self.store.put(session_id, state.clone()).await?;
        tracing::info!(session_id, "session started");
        Ok(state)
    }

    /// External submit or time expiry. Already-terminal sessions are returned unchanged.
    pub async fn complete_session(&self, session_id: &str) -> Result<SessionState, PipelineError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut state = self.load(session_id).await?;
        if state.complete() {
            self.store.put(session_id, state.clone()).await?;
            tracing::info!(session_id, total = state.total_violations, "session completed");
        } else {
            tracing::debug!(session_id, status = %state.status, "session already closed");
        }
        Ok(state)
    }

    async fn load(&self, session_id: &str) -> Result<SessionState, PipelineError> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;
    use crate::testing::{
        blank_frame, blank_jpeg, crowd, detection, frontal, looking, mesh, no_face, FakeLoader,
        CANDIDATE,
    };
    use proctor_core::ViolationKind::*;

    struct Harness {
        proctor: Arc<Proctor>,
        loader: Arc<FakeLoader>,
        store: Arc<InMemorySessionStore>,
    }

    fn harness_with(thresholds: Thresholds) -> Harness {
        let loader = Arc::new(FakeLoader::new());
        let store = Arc::new(InMemorySessionStore::new());
        let registry = Arc::new(ModelRegistry::new(loader.clone(), 4));
        let scanner = Arc::new(LocalObjectScanner::new(Arc::clone(&registry), thresholds.clone()));
        let proctor = Arc::new(Proctor::new(registry, scanner, store.clone(), thresholds));
        Harness { proctor, loader, store }
    }

    fn harness() -> Harness {
        harness_with(Thresholds::default())
    }

    async fn enrolled(h: &Harness, id: &str) {
        h.proctor.start_session(id).await.unwrap();
        h.loader.set_scan(frontal(CANDIDATE));
        h.proctor.enroll(id, &blank_jpeg()).await.unwrap();
    }

    async fn frame(h: &Harness, id: &str) -> FrameReport {
        h.proctor.process_frame(id, &blank_jpeg()).await.unwrap()
    }

    #[tokio::test]
    async fn test_no_face_counts() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();
        h.loader.set_scan(no_face());

        let report = frame(&h, "s").await;
        assert_eq!(report.violations, vec![NoFaceDetected]);
        assert_eq!(report.face_count, Some(0));
        assert_eq!(report.gaze, Some(GazeDirection::Center));
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].kind, NoFaceDetected);

        let state = h.store.get("s").await.unwrap().unwrap();
        assert_eq!(state.count(NoFaceDetected), 1);
        assert_eq!(state.total_violations, 1);
    }

    #[tokio::test]
    async fn test_two_faces() {
        let h = harness();
        enrolled(&h, "s").await;
        h.loader.set_scan(crowd(2));
        let report = frame(&h, "s").await;
        assert_eq!(report.violations, vec![MultipleFacesDetected]);
        assert_eq!(report.head_pose, None);
    }

    #[tokio::test]
    async fn test_several_faces_suppress_face_signals() {
        let h = harness();
        enrolled(&h, "s").await;

        // primary face turned well past both limits and unlike the candidate
        let mut scan = crowd(2);
        scan.mesh = Some(mesh(0.2, (150.0, 106.0)));
        h.loader.set_scan(scan);

        let report = frame(&h, "s").await;
        assert_eq!(report.violations, vec![MultipleFacesDetected]);
        assert_eq!(report.gaze, Some(GazeDirection::Center));
        assert_eq!(report.head_pose, None);

        let state = h.store.get("s").await.unwrap().unwrap();
        assert!(!state.face_mismatch_detected);
        assert_eq!(state.total_violations, 1);
    }

    #[tokio::test]
    async fn test_face_mismatch_recorded_once() {
        let h = harness();
        enrolled(&h, "s").await;

        h.loader.set_scan(frontal(0.9));
        assert!(frame(&h, "s").await.violations.is_empty());

        h.loader.set_scan(frontal(0.3));
        assert_eq!(frame(&h, "s").await.violations, vec![FaceMismatch]);
        assert!(h.store.get("s").await.unwrap().unwrap().face_mismatch_detected);

        h.loader.set_scan(frontal(0.2));
        assert!(frame(&h, "s").await.violations.is_empty());

        let state = h.store.get("s").await.unwrap().unwrap();
        assert_eq!(state.count(FaceMismatch), 1);
        assert_eq!(state.total_violations, 1);
    }

    #[tokio::test]
    async fn test_limit_terminates_then_freezes() {
        let h = harness();
        let mut state = SessionState::new("s");
        state.total_violations = 5;
        state.violation_counts.insert(GazeAway, 5);
        h.store.put("s", state).await.unwrap();

        h.loader.set_scan(no_face());
        let report = frame(&h, "s").await;
        assert!(report.end_exam);
        assert_eq!(report.status, SessionStatus::Terminated);
        assert_eq!(report.violations, vec![NoFaceDetected]);

        let terminated = h.store.get("s").await.unwrap().unwrap();
        assert_eq!(terminated.total_violations, 6);

        h.loader.set_detections(vec![detection("cell phone", 0.9)]);
        let scans_before = h.loader.scan_calls();
        let report = frame(&h, "s").await;
        assert!(report.end_exam);
        assert!(report.violations.is_empty());
        assert_eq!(h.loader.scan_calls(), scans_before);
        assert_eq!(h.store.get("s").await.unwrap().unwrap(), terminated);
    }

    #[tokio::test]
    async fn test_head_pose_and_gaze() {
        let h = harness();
        enrolled(&h, "s").await;

        // yaw ≈ 17°: gaze away, head pose within limit
        h.loader.set_scan(looking(CANDIDATE, (122.0, 106.0)));
        let report = frame(&h, "s").await;
        assert_eq!(report.violations, vec![GazeAway]);
        assert_eq!(report.gaze, Some(GazeDirection::Away));

        // yaw ≈ 57°: both
        h.loader.set_scan(looking(CANDIDATE, (150.0, 106.0)));
        let report = frame(&h, "s").await;
        assert_eq!(report.violations, vec![HeadPoseAway, GazeAway]);
        assert!(report.head_pose.unwrap().yaw > 45.0);
    }

    #[tokio::test]
    async fn test_objects_and_persons() {
        let h = harness();
        enrolled(&h, "s").await;
        h.loader.set_detections(vec![
            detection("person", 0.9),
            detection("person", 0.85),
            detection("cell phone", 0.7),
            detection("book", 0.6),
        ]);
        let report = frame(&h, "s").await;
        assert_eq!(report.violations, vec![ObjectDetected, MultiplePersonsDetected]);
        assert_eq!(report.detected_objects, vec!["cell phone", "book"]);
        assert_eq!(report.person_count, 2);
    }

    #[tokio::test]
    async fn test_face_and_gaze_share_one_scan() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();
        h.loader.set_scan(frontal(CANDIDATE));
        frame(&h, "s").await;
        frame(&h, "s").await;
        assert_eq!(h.loader.scan_calls(), 2);
    }

    #[tokio::test]
    async fn test_object_failure_is_no_signal() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();
        h.loader.set_scan(no_face());
        h.loader.fail_detections("corrupt output");
        let report = frame(&h, "s").await;
        assert_eq!(report.violations, vec![NoFaceDetected]);
        assert_eq!(report.person_count, 0);
    }

    #[tokio::test]
    async fn test_model_load_failure_is_fatal() {
        let loader = Arc::new(FakeLoader::new().failing_loads(1));
        let store = Arc::new(InMemorySessionStore::with_session(SessionState::new("s")));
        let registry = Arc::new(ModelRegistry::new(loader.clone(), 2));
        let scanner = Arc::new(LocalObjectScanner::new(Arc::clone(&registry), Thresholds::default()));
        let proctor = Proctor::new(registry, scanner, store.clone(), Thresholds::default());

        let err = proctor.process_frame("s", &blank_jpeg()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ModelLoad(_)));
        assert_eq!(store.get("s").await.unwrap().unwrap().total_violations, 0);

        // the failure was not cached
        proctor.process_frame("s", &blank_jpeg()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_image_skipped() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();
        let report = h.proctor.process_frame("s", b"not an image").await.unwrap();
        assert!(report.skipped);
        assert!(report.violations.is_empty());
        assert_eq!(h.loader.scan_calls(), 0);
        assert_eq!(h.store.get("s").await.unwrap().unwrap().total_violations, 0);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let h = harness();
        let err = h.proctor.process_frame("ghost", &blank_jpeg()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownSession(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_enrollment_errors() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();

        h.loader.set_scan(no_face());
        let err = h.proctor.enroll("s", &blank_jpeg()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected { face_count: 0 }));

        h.loader.set_scan(crowd(2));
        let err = h.proctor.enroll("s", &blank_jpeg()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoFaceDetected { face_count: 2 }));

        let err = h.proctor.enroll("s", b"garbage").await.unwrap_err();
        assert!(matches!(err, PipelineError::Frame(FrameError::InvalidImage(_))));

        h.loader.set_scan(frontal(CANDIDATE));
        let enrollment = h.proctor.enroll("s", &blank_jpeg()).await.unwrap();
        assert_eq!(enrollment.dimensions, 468 * 3);
        assert_eq!(enrollment.model_version.as_deref(), Some("fake-mesh"));

        let err = h.proctor.enroll("s", &blank_jpeg()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ReferenceAlreadySet(_)));

        h.proctor.start_session("closed").await.unwrap();
        h.proctor.complete_session("closed").await.unwrap();
        let err = h.proctor.enroll("closed", &blank_jpeg()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SessionClosed { status: SessionStatus::Completed, .. }
        ));
    }

    #[tokio::test]
    async fn test_submit_dispatch() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();
        h.loader.set_scan(frontal(CANDIDATE));

        let enrolled = h
            .proctor
            .submit(FrameSubmission {
                session_id: "s".into(),
                image: blank_jpeg(),
                is_reference_capture: true,
            })
            .await
            .unwrap();
        assert!(matches!(enrolled, Submission::Enrolled(_)));
        // enrollment never touches counters
        assert_eq!(h.store.get("s").await.unwrap().unwrap().total_violations, 0);

        h.loader.set_scan(no_face());
        let processed = h
            .proctor
            .submit(FrameSubmission {
                session_id: "s".into(),
                image: blank_jpeg(),
                is_reference_capture: false,
            })
            .await
            .unwrap();
        let Submission::Frame(report) = processed else {
            panic!("expected frame report");
        };
        assert_eq!(report.violations, vec![NoFaceDetected]);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();
        let err = h.proctor.start_session("s").await.unwrap_err();
        assert!(matches!(err, PipelineError::SessionExists(_)));

        let done = h.proctor.complete_session("s").await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert!(done.ended_at.is_some());

        // idempotent
        let again = h.proctor.complete_session("s").await.unwrap();
        assert_eq!(again, done);

        h.loader.set_scan(no_face());
        let report = frame(&h, "s").await;
        assert!(report.end_exam);
        assert_eq!(report.status, SessionStatus::Completed);
        assert!(report.violations.is_empty());
    }

    #[tokio::test]
    async fn test_locks_released_after_every_call() {
        let h = harness();
        h.proctor.start_session("s").await.unwrap();
        assert_eq!(h.proctor.locks.len(), 0);

        h.loader.set_scan(frontal(CANDIDATE));
        h.proctor.enroll("s", &blank_jpeg()).await.unwrap();
        frame(&h, "s").await;
        assert_eq!(h.proctor.locks.len(), 0);

        // error paths too
        h.proctor.process_frame("ghost", &blank_jpeg()).await.unwrap_err();
        h.proctor.enroll("s", &blank_jpeg()).await.unwrap_err();
        assert_eq!(h.proctor.locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_frames_lose_no_updates() {
        let h = harness_with(Thresholds {
            max_violations: 1000,
            ..Thresholds::default()
        });
        h.proctor.start_session("a").await.unwrap();
        h.proctor.start_session("b").await.unwrap();
        h.loader.set_scan(no_face());

        let mut tasks = Vec::new();
        for i in 0..40 {
            let proctor = Arc::clone(&h.proctor);
            let id = if i % 2 == 0 { "a" } else { "b" };
            tasks.push(tokio::spawn(async move {
                proctor.process_frame(id, &blank_jpeg()).await.unwrap()
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        for id in ["a", "b"] {
            let state = h.store.get(id).await.unwrap().unwrap();
            assert_eq!(state.total_violations, 20);
            assert_eq!(state.count(NoFaceDetected), 20);
        }
    }

    #[tokio::test]
    async fn test_evaluate_without_store() {
        let h = harness();
        h.loader.set_scan(crowd(3));
        let mut state = SessionState::new("direct");
        let report = h.proctor.evaluate(&blank_frame(), &mut state).await.unwrap();
        assert_eq!(report.violations, vec![MultipleFacesDetected]);
        assert_eq!(state.total_violations, 1);
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_report_json_shape() {
        let state = SessionState::new("s");
        let json = serde_json::to_value(Submission::Frame(FrameReport::unanalyzed(&state, true))).unwrap();
        assert_eq!(json["kind"], "frame");
        assert_eq!(json["sessionId"], "s");
        assert_eq!(json["endExam"], false);
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["skipped"], true);
        assert!(json["detectedObjects"].as_array().unwrap().is_empty());
    }
}

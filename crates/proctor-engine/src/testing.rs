//! Scripted models for engine tests. No ONNX files involved.

use crate::registry::ModelLoader;
use proctor_core::face_mesh::{CHIN, LEFT_EYE, NOSE_TIP, RIGHT_EYE};
use proctor_core::objects::COCO_LABELS;
use proctor_core::{
    BoundingBox, FaceDetection, FaceMesh, FaceScan, Frame, InferenceError, LandmarkModel, Landmark,
    ObjectDetection, ObjectModel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MESH_POINTS: usize = 468;

/// Mesh whose embedding has roughly `likeness` cosine similarity to `mesh(1.0, _)`.
///
/// Filler landmarks are rotated in the x/y plane; the four pose landmarks are
/// shared and barely move the similarity.
pub fn mesh(likeness: f32, nose: (f32, f32)) -> FaceMesh {
    let other = (1.0 - likeness * likeness).max(0.0).sqrt();
    let mut points: Vec<Landmark> = (0..MESH_POINTS)
        .map(|i| {
            let v = i as f32;
            Landmark { x: v * likeness, y: v * other, z: 0.0 }
        })
        .collect();
    points[NOSE_TIP] = Landmark { x: nose.0, y: nose.1, z: 0.0 };
    points[LEFT_EYE] = Landmark { x: 90.0, y: 100.0, z: 0.0 };
    points[RIGHT_EYE] = Landmark { x: 130.0, y: 100.0, z: 0.0 };
    points[CHIN] = Landmark { x: 110.0, y: 220.0, z: 0.0 };
    FaceMesh {
        points,
        model_version: "fake-mesh".into(),
    }
}

fn face(confidence: f32) -> FaceDetection {
    FaceDetection {
        bbox: BoundingBox { x: 60.0, y: 60.0, width: 100.0, height: 120.0 },
        confidence,
        keypoints: None,
    }
}

pub fn no_face() -> FaceScan {
    FaceScan::default()
}

/// Enrolled candidate.
pub const CANDIDATE: f32 = 1.0;

/// One frontal face, nose between the eyes.
pub fn frontal(likeness: f32) -> FaceScan {
    looking(likeness, (110.0, 106.0))
}

pub fn looking(likeness: f32, nose: (f32, f32)) -> FaceScan {
    FaceScan {
        faces: vec![face(0.9)],
        mesh: Some(mesh(likeness, nose)),
    }
}

pub fn crowd(n: usize) -> FaceScan {
    FaceScan {
        faces: (0..n).map(|i| face(0.9 - i as f32 * 0.1)).collect(),
        mesh: Some(mesh(CANDIDATE, (110.0, 106.0))),
    }
}

pub fn detection(label: &str, confidence: f32) -> ObjectDetection {
    ObjectDetection {
        label: label.to_string(),
        class_id: COCO_LABELS.iter().position(|l| *l == label).unwrap_or(0),
        confidence,
        bbox: BoundingBox { x: 10.0, y: 10.0, width: 120.0, height: 120.0 },
    }
}

pub fn blank_frame() -> Frame {
    Frame::from_rgb(vec![128; 320 * 240 * 3], 320, 240).unwrap()
}

pub fn blank_jpeg() -> Vec<u8> {
    blank_frame().to_jpeg().unwrap()
}

struct ScriptedLandmarks {
    scan: Arc<Mutex<FaceScan>>,
    calls: Arc<AtomicUsize>,
}

impl LandmarkModel for ScriptedLandmarks {
    fn scan(&mut self, _frame: &Frame) -> Result<FaceScan, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scan.lock().unwrap().clone())
    }
}

struct ScriptedObjects {
    detections: Arc<Mutex<Result<Vec<ObjectDetection>, String>>>,
}

impl ObjectModel for ScriptedObjects {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<ObjectDetection>, InferenceError> {
        self.detections
            .lock()
            .unwrap()
            .clone()
            .map_err(InferenceError::Other)
    }
}

/// Loader whose models answer with whatever the test last scripted.
pub struct FakeLoader {
    scan: Arc<Mutex<FaceScan>>,
    detections: Arc<Mutex<Result<Vec<ObjectDetection>, String>>>,
    scan_calls: Arc<AtomicUsize>,
    face_mesh_loads: AtomicUsize,
    object_loads: AtomicUsize,
    failures_left: AtomicUsize,
    load_delay: Duration,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            scan: Arc::new(Mutex::new(FaceScan::default())),
            detections: Arc::new(Mutex::new(Ok(Vec::new()))),
            scan_calls: Arc::new(AtomicUsize::new(0)),
            face_mesh_loads: AtomicUsize::new(0),
            object_loads: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            load_delay: Duration::ZERO,
        }
    }

    pub fn with_load_delay(mut self, millis: u64) -> Self {
        self.load_delay = Duration::from_millis(millis);
        self
    }

    /// The next `n` load attempts (of any kind) fail.
    pub fn failing_loads(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn set_scan(&self, scan: FaceScan) {
        *self.scan.lock().unwrap() = scan;
    }

    pub fn set_detections(&self, detections: Vec<ObjectDetection>) {
        *self.detections.lock().unwrap() = Ok(detections);
    }

    pub fn fail_detections(&self, reason: &str) {
        *self.detections.lock().unwrap() = Err(reason.to_string());
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn face_mesh_loads(&self) -> usize {
        self.face_mesh_loads.load(Ordering::SeqCst)
    }

    pub fn object_loads(&self) -> usize {
        self.object_loads.load(Ordering::SeqCst)
    }

    fn attempt(&self, counter: &AtomicUsize) -> Result<(), InferenceError> {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(InferenceError::Other("scripted load failure".into()));
        }
        Ok(())
    }
}

impl ModelLoader for FakeLoader {
    fn load_face_mesh(&self) -> Result<Box<dyn LandmarkModel>, InferenceError> {
        self.attempt(&self.face_mesh_loads)?;
        Ok(Box::new(ScriptedLandmarks {
            scan: Arc::clone(&self.scan),
            calls: Arc::clone(&self.scan_calls),
        }))
    }

    fn load_object_detector(&self) -> Result<Box<dyn ObjectModel>, InferenceError> {
        self.attempt(&self.object_loads)?;
        Ok(Box::new(ScriptedObjects {
            detections: Arc::clone(&self.detections),
        }))
    }
}

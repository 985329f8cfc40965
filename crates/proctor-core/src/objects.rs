//! Generic object detection (YOLOv8 ONNX, COCO classes) and prohibited-item filtering.

use crate::config::Thresholds;
use crate::detector::nms;
use crate::frame::Frame;
use crate::preprocess::{letterbox_nchw, Letterbox};
use crate::types::{BoundingBox, ObjectDetection, ObjectObservation};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const YOLO_INPUT_SIZE: usize = 640;
const YOLO_PAD_VALUE: f32 = 114.0;
/// Raw candidates below this never leave the decoder; policy thresholds apply later.
const YOLO_MIN_CONFIDENCE: f32 = 0.25;
const YOLO_NMS_THRESHOLD: f32 = 0.45;

pub const PERSON_LABEL: &str = "person";

pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[derive(Error, Debug)]
pub enum ObjectDetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// YOLOv8-style single-output object detector.
pub struct ObjectDetector {
    session: Session,
}

impl ObjectDetector {
    /// Load the object detection ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ObjectDetectorError> {
        if !model_path.exists() {
            return Err(ObjectDetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded object detection model");
        Ok(Self { session })
    }

    /// Detect objects, returning class-wise NMS survivors sorted by confidence.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<ObjectDetection>, ObjectDetectorError> {
        let (input, letterbox) = letterbox_nchw(
            frame,
            YOLO_INPUT_SIZE,
            YOLO_INPUT_SIZE,
            YOLO_PAD_VALUE,
            |p| p / 255.0,
        );

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ObjectDetectorError::InferenceFailed(format!("detections: {e}")))?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        let layout = YoloLayout::from_shape(&dims, COCO_LABELS.len()).ok_or_else(|| {
            ObjectDetectorError::InferenceFailed(format!("unexpected output shape {dims:?}"))
        })?;

        let candidates = decode_yolo(data, layout, &letterbox, YOLO_MIN_CONFIDENCE);
        tracing::trace!(candidates = candidates.len(), "YOLO decoded");
        Ok(class_wise_nms(candidates, YOLO_NMS_THRESHOLD))
    }
}

/// Memory layout of the YOLO output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct YoloLayout {
    anchors: usize,
    classes: usize,
    /// `[1, 4 + classes, anchors]` when true, `[1, anchors, 4 + classes]` otherwise.
    channel_major: bool,
}

impl YoloLayout {
    fn from_shape(shape: &[i64], classes: usize) -> Option<Self> {
        let [_, a, b] = shape else {
            return None;
        };
        let (a, b) = (*a as usize, *b as usize);
        let attrs = 4 + classes;
        if a == attrs {
            Some(Self { anchors: b, classes, channel_major: true })
        } else if b == attrs {
            Some(Self { anchors: a, classes, channel_major: false })
        } else {
            None
        }
    }

    fn at(&self, data: &[f32], anchor: usize, attr: usize) -> f32 {
        let idx = if self.channel_major {
            attr * self.anchors + anchor
        } else {
            anchor * (4 + self.classes) + attr
        };
        data.get(idx).copied().unwrap_or(0.0)
    }
}

fn decode_yolo(
    data: &[f32],
    layout: YoloLayout,
    letterbox: &Letterbox,
    min_confidence: f32,
) -> Vec<ObjectDetection> {
    let mut detections = Vec::new();
    for anchor in 0..layout.anchors {
        let (class_id, confidence) = (0..layout.classes)
            .map(|c| (c, layout.at(data, anchor, 4 + c)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if confidence < min_confidence {
            continue;
        }

        let cx = layout.at(data, anchor, 0);
        let cy = layout.at(data, anchor, 1);
        let w = layout.at(data, anchor, 2);
        let h = layout.at(data, anchor, 3);
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        detections.push(ObjectDetection {
            label: COCO_LABELS.get(class_id).copied().unwrap_or("unknown").to_string(),
            class_id,
            confidence,
            bbox: BoundingBox { x: x1, y: y1, width: x2 - x1, height: y2 - y1 },
        });
    }
    detections
}

fn class_wise_nms(detections: Vec<ObjectDetection>, iou_threshold: f32) -> Vec<ObjectDetection> {
    let mut by_class: std::collections::BTreeMap<usize, Vec<ObjectDetection>> = Default::default();
    for det in detections {
        by_class.entry(det.class_id).or_default().push(det);
    }
    let mut kept: Vec<ObjectDetection> = by_class
        .into_values()
        .flat_map(|dets| nms(dets, iou_threshold, |d| (&d.bbox, d.confidence)))
        .collect();
    kept.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept
}

/// True when `label` matches an allowlist entry (case-insensitive substring).
pub fn is_prohibited(label: &str, prohibited: &[String]) -> bool {
    let label = label.to_lowercase();
    prohibited
        .iter()
        .any(|entry| !entry.is_empty() && label.contains(&entry.to_lowercase()))
}

/// Reduce raw detections to the object signals the classifier consumes.
///
/// Keeps detections above the confidence threshold and the minimum area
/// (a fraction of `frame_area`); persons are counted, prohibited labels listed.
pub fn classify_detections(
    detections: &[ObjectDetection],
    frame_area: f32,
    thresholds: &Thresholds,
) -> ObjectObservation {
    let min_area = thresholds.min_object_area * frame_area;
    let mut observation = ObjectObservation::default();

    for det in detections {
        if det.confidence <= thresholds.object_confidence || det.bbox.area() < min_area {
            continue;
        }
        if det.label.eq_ignore_ascii_case(PERSON_LABEL) {
            observation.person_count += 1;
        } else if is_prohibited(&det.label, &thresholds.prohibited_objects) {
            observation.objects.push(det.label.to_lowercase());
        }
    }

    observation
}

/// Object signals from labels that were already filtered upstream (the
/// external ML service applies its own confidence and area cutoffs).
///
/// `person` labels are not re-counted; the service's `person_count` is kept.
pub fn classify_labels(
    labels: &[String],
    person_count: usize,
    thresholds: &Thresholds,
) -> ObjectObservation {
    let objects = labels
        .iter()
        .filter(|label| !label.eq_ignore_ascii_case(PERSON_LABEL))
        .filter(|label| is_prohibited(label, &thresholds.prohibited_objects))
        .map(|label| label.to_lowercase())
        .collect();
    ObjectObservation {
        objects,
        person_count,
    }
}

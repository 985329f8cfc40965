//! SCRFD face detector via ONNX Runtime.
//!
//! Finds face boxes (and five keypoints) so the face count is known before the
//! dense mesh runs on the primary face.

use crate::frame::Frame;
use crate::preprocess::{letterbox_nchw, Letterbox};
use crate::types::{BoundingBox, FaceDetection};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    stride_indices: [StrideOutputIndices; 3],
    confidence_threshold: f32,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
            confidence_threshold: SCRFD_CONFIDENCE_THRESHOLD,
        })
    }

    /// Detect faces, returning detections sorted by descending confidence.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, DetectorError> {
        let (input, letterbox) = letterbox_nchw(
            frame,
            SCRFD_INPUT_SIZE,
            SCRFD_INPUT_SIZE,
            SCRFD_MEAN,
            |p| (p - SCRFD_MEAN) / SCRFD_STD,
        );

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;
            let (_, kps) = outputs[kps_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("kps stride {stride}: {e}"))
            })?;

            all_detections.extend(decode_stride(
                &StrideOutputs { scores, bboxes, kps },
                stride,
                SCRFD_INPUT_SIZE,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        Ok(nms(all_detections, SCRFD_NMS_THRESHOLD, |d| (&d.bbox, d.confidence)))
    }
}

/// Discover output tensor ordering by name ("score_8", "bbox_16", ...), falling back
/// to positional ordering [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut named = [(0usize, 0usize, 0usize); 3];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(s), Some(b), Some(k)) => named[slot] = (s, b, k),
            _ => {
                tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    named
}

/// Raw tensors for one stride level.
struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode detections for a single stride level.
fn decode_stride(
    out: &StrideOutputs<'_>,
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceDetection> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = out.scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid) as f32 * s;
        let anchor_cy = (anchor_idx / grid) as f32 * s;

        let Some(b) = out.bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (x1, y1) = letterbox.unmap(anchor_cx - b[0] * s, anchor_cy - b[1] * s);
        let (x2, y2) = letterbox.unmap(anchor_cx + b[2] * s, anchor_cy + b[3] * s);

        let keypoints = out.kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| {
                letterbox.unmap(anchor_cx + k[i * 2] * s, anchor_cy + k[i * 2 + 1] * s)
            })
        });

        detections.push(FaceDetection {
            bbox: BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
            },
            confidence: score,
            keypoints,
        });
    }

    detections
}

/// Non-Maximum Suppression. Returns survivors sorted by descending score.
pub(crate) fn nms<T>(
    mut detections: Vec<T>,
    iou_threshold: f32,
    key: impl Fn(&T) -> (&BoundingBox, f32),
) -> Vec<T> {
    detections.sort_by(|a, b| {
        key(b)
            .1
            .partial_cmp(&key(a).1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<T> = Vec::new();
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|kept| key(kept).0.iou(key(&det).0) > iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

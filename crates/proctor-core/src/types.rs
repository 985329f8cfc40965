use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// A face found by the detector, with its five SCRFD keypoints when available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Five-point keypoints: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub keypoints: Option<[(f32, f32); 5]>,
}

/// A single 3-D mesh landmark in frame pixel coordinates (z shares the x scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Dense landmark mesh for one face, in the mesh model's fixed point order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMesh {
    pub points: Vec<Landmark>,
    /// Model revision that produced the mesh (e.g. "face_landmark_468").
    pub model_version: String,
}

impl FaceMesh {
    pub fn point(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }
}

/// Result of running the landmark capability over one frame.
///
/// `faces` is sorted by confidence; `mesh` belongs to `faces[0]` when present.
#[derive(Debug, Clone, Default)]
pub struct FaceScan {
    pub faces: Vec<FaceDetection>,
    pub mesh: Option<FaceMesh>,
}

impl FaceScan {
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// Face embedding vector. Only comparable with embeddings of the same model revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model_version: Option<String>,
}

impl Embedding {
    /// Build an L2-normalized embedding. A zero vector is kept as-is.
    pub fn normalized(raw: Vec<f32>, model_version: Option<String>) -> Self {
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };
        Self { values, model_version }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Coarse head rotation proxy in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
}

impl HeadPose {
    /// True when either axis exceeds `limit` degrees in magnitude.
    pub fn exceeds(&self, limit: f32) -> bool {
        self.yaw.abs() > limit || self.pitch.abs() > limit
    }
}

/// Face-derived signals for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceObservation {
    pub face_count: usize,
    /// Present only when exactly one face was found.
    pub embedding: Option<Embedding>,
    /// Present only when exactly one face was found and the geometry is not degenerate.
    pub head_pose: Option<HeadPose>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    #[default]
    Center,
    Away,
}

/// A raw detection from the generic object detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub label: String,
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Object-derived signals for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectObservation {
    /// Prohibited labels seen in the frame, in detection order.
    pub objects: Vec<String>,
    pub person_count: usize,
}

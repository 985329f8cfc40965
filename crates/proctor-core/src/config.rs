use serde::{Deserialize, Serialize};

/// Default head-pose limit in degrees.
pub const DEFAULT_HEAD_POSE_LIMIT: f32 = 45.0;
/// Default gaze limit in degrees.
pub const DEFAULT_GAZE_LIMIT: f32 = 15.0;
/// Default cosine similarity required for an identity match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;
/// Default number of violations a session may accumulate before termination.
pub const DEFAULT_MAX_VIOLATIONS: u32 = 5;
/// Default minimum detector confidence for an object to count.
pub const DEFAULT_OBJECT_CONFIDENCE: f32 = 0.5;
/// Default minimum object box area as a fraction of the frame area.
pub const DEFAULT_MIN_OBJECT_AREA: f32 = 0.01;

/// Every tunable decision threshold of the violation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub head_pose_degrees: f32,
    pub gaze_degrees: f32,
    pub similarity: f32,
    /// Terminate once the total strictly exceeds this value.
    pub max_violations: u32,
    pub object_confidence: f32,
    pub min_object_area: f32,
    /// Labels that count as prohibited; matched case-insensitively as substrings.
    pub prohibited_objects: Vec<String>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            head_pose_degrees: DEFAULT_HEAD_POSE_LIMIT,
            gaze_degrees: DEFAULT_GAZE_LIMIT,
            similarity: DEFAULT_SIMILARITY_THRESHOLD,
            max_violations: DEFAULT_MAX_VIOLATIONS,
            object_confidence: DEFAULT_OBJECT_CONFIDENCE,
            min_object_area: DEFAULT_MIN_OBJECT_AREA,
            prohibited_objects: default_prohibited_objects(),
        }
    }
}

pub fn default_prohibited_objects() -> Vec<String> {
    ["cell phone", "book", "laptop", "remote", "keyboard", "mouse", "tv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

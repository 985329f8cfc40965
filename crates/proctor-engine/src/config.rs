use proctor_core::Thresholds;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default ML service endpoint used by the remote object scanner.
pub const DEFAULT_ML_SERVICE_URL: &str = "http://localhost:5001/process-ml";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Which backend answers object/person questions for a frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ScannerConfig {
    /// In-process YOLO model through the registry.
    #[default]
    Local,
    /// External ML service; failures are fail-open.
    Remote {
        #[serde(default = "default_ml_service_url")]
        url: String,
        #[serde(default = "default_remote_timeout")]
        timeout_secs: u64,
    },
}

fn default_ml_service_url() -> String {
    DEFAULT_ML_SERVICE_URL.to_string()
}

fn default_remote_timeout() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

/// Engine configuration, loaded from a TOML file or `PROCTOR_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub face_detector_file: String,
    pub face_mesh_file: String,
    pub object_detector_file: String,
    /// Pending jobs each inference thread accepts before callers wait.
    pub queue_depth: usize,
    pub scanner: ScannerConfig,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: proctor_core::default_model_dir(),
            face_detector_file: "det_10g.onnx".to_string(),
            face_mesh_file: "face_landmark.onnx".to_string(),
            object_detector_file: "yolov8n.onnx".to_string(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            scanner: ScannerConfig::Local,
            thresholds: Thresholds::default(),
        }
    }
}

impl Config {
    /// Parse a TOML config file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from `PROCTOR_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let t = defaults.thresholds.clone();

        let scanner = match get("PROCTOR_SCANNER").as_deref() {
            Some("remote") => ScannerConfig::Remote {
                url: get("PROCTOR_ML_SERVICE_URL").unwrap_or_else(default_ml_service_url),
                timeout_secs: parse_or(&get, "PROCTOR_ML_TIMEOUT_SECS", DEFAULT_REMOTE_TIMEOUT_SECS),
            },
            _ => ScannerConfig::Local,
        };

        let prohibited_objects = get("PROCTOR_PROHIBITED_OBJECTS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(t.prohibited_objects);

        Self {
            model_dir: get("PROCTOR_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            face_detector_file: get("PROCTOR_FACE_DETECTOR").unwrap_or(defaults.face_detector_file),
            face_mesh_file: get("PROCTOR_FACE_MESH").unwrap_or(defaults.face_mesh_file),
            object_detector_file: get("PROCTOR_OBJECT_DETECTOR")
                .unwrap_or(defaults.object_detector_file),
            queue_depth: parse_or(&get, "PROCTOR_QUEUE_DEPTH", defaults.queue_depth),
            scanner,
            thresholds: Thresholds {
                head_pose_degrees: parse_or(&get, "PROCTOR_HEAD_POSE_LIMIT", t.head_pose_degrees),
                gaze_degrees: parse_or(&get, "PROCTOR_GAZE_LIMIT", t.gaze_degrees),
                similarity: parse_or(&get, "PROCTOR_SIMILARITY_THRESHOLD", t.similarity),
                max_violations: parse_or(&get, "PROCTOR_MAX_VIOLATIONS", t.max_violations),
                object_confidence: parse_or(&get, "PROCTOR_OBJECT_CONFIDENCE", t.object_confidence),
                min_object_area: parse_or(&get, "PROCTOR_MIN_OBJECT_AREA", t.min_object_area),
                prohibited_objects,
            },
        }
    }

    /// Path to the SCRFD detection model.
    pub fn face_detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.face_detector_file)
    }

    /// Path to the 468-point face mesh model.
    pub fn face_mesh_path(&self) -> PathBuf {
        self.model_dir.join(&self.face_mesh_file)
    }

    /// Path to the YOLO object detector.
    pub fn object_detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.object_detector_file)
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

//! Process-wide model registry.
//!
//! Each model kind is constructed at most once. Concurrent first callers share a
//! single in-flight load; a failed load is not cached, so the next caller retries.

use crate::config::Config;
use crate::queue::InferenceQueue;
use proctor_core::{InferenceError, LandmarkModel, ObjectModel, OnnxFaceLandmarker, OnnxObjectDetector};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    FaceMesh,
    ObjectDetector,
}

impl ModelKind {
    fn thread_name(self) -> &'static str {
        match self {
            ModelKind::FaceMesh => "proctor-face-mesh",
            ModelKind::ObjectDetector => "proctor-objects",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::FaceMesh => "face mesh",
            ModelKind::ObjectDetector => "object detector",
        })
    }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("failed to load {kind} model: {source}")]
    Load {
        kind: ModelKind,
        source: InferenceError,
    },
    #[error("failed to start {kind} inference thread: {source}")]
    Thread {
        kind: ModelKind,
        source: std::io::Error,
    },
    #[error("{kind} loader task failed: {reason}")]
    Join { kind: ModelKind, reason: String },
}

/// A loaded model behind its inference queue.
#[derive(Debug, Clone)]
pub enum ModelHandle {
    FaceMesh(InferenceQueue<dyn LandmarkModel>),
    ObjectDetector(InferenceQueue<dyn ObjectModel>),
}

impl ModelHandle {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelHandle::FaceMesh(_) => ModelKind::FaceMesh,
            ModelHandle::ObjectDetector(_) => ModelKind::ObjectDetector,
        }
    }
}

/// Constructs models. Called on the blocking pool.
pub trait ModelLoader: Send + Sync + 'static {
    fn load_face_mesh(&self) -> Result<Box<dyn LandmarkModel>, InferenceError>;
    fn load_object_detector(&self) -> Result<Box<dyn ObjectModel>, InferenceError>;
}

/// Loads the ONNX models named in [`Config`] from its model directory.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    face_detector: PathBuf,
    face_mesh: PathBuf,
    object_detector: PathBuf,
}

impl OnnxModelLoader {
    pub fn from_config(config: &Config) -> Self {
        Self {
            face_detector: config.face_detector_path(),
            face_mesh: config.face_mesh_path(),
            object_detector: config.object_detector_path(),
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load_face_mesh(&self) -> Result<Box<dyn LandmarkModel>, InferenceError> {
        let model = OnnxFaceLandmarker::load(&self.face_detector, &self.face_mesh)?;
        tracing::info!(
            detector = %self.face_detector.display(),
            mesh = %self.face_mesh.display(),
            "face landmark models loaded"
        );
        Ok(Box::new(model))
    }

    fn load_object_detector(&self) -> Result<Box<dyn ObjectModel>, InferenceError> {
        let model = OnnxObjectDetector::load(&self.object_detector)?;
        tracing::info!(path = %self.object_detector.display(), "object detector loaded");
        Ok(Box::new(model))
    }
}

pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    queue_depth: usize,
    face_mesh: OnceCell<InferenceQueue<dyn LandmarkModel>>,
    object_detector: OnceCell<InferenceQueue<dyn ObjectModel>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("face_mesh", &self.face_mesh.initialized())
            .field("object_detector", &self.object_detector.initialized())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>, queue_depth: usize) -> Self {
        Self {
            loader,
            queue_depth,
            face_mesh: OnceCell::new(),
            object_detector: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(OnnxModelLoader::from_config(config)), config.queue_depth)
    }

    /// Return the handle for `kind`, loading it on first use.
    pub async fn get_model(&self, kind: ModelKind) -> Result<ModelHandle, ModelLoadError> {
        match kind {
            ModelKind::FaceMesh => self.face_mesh().await.map(ModelHandle::FaceMesh),
            ModelKind::ObjectDetector => self.object_detector().await.map(ModelHandle::ObjectDetector),
        }
    }

    pub async fn face_mesh(&self) -> Result<InferenceQueue<dyn LandmarkModel>, ModelLoadError> {
        self.face_mesh
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let model = load_blocking(ModelKind::FaceMesh, move || loader.load_face_mesh()).await?;
                spawn_queue(ModelKind::FaceMesh, model, self.queue_depth)
            })
            .await
            .cloned()
    }

    pub async fn object_detector(&self) -> Result<InferenceQueue<dyn ObjectModel>, ModelLoadError> {
        self.object_detector
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let model =
                    load_blocking(ModelKind::ObjectDetector, move || loader.load_object_detector())
                        .await?;
                spawn_queue(ModelKind::ObjectDetector, model, self.queue_depth)
            })
            .await
            .cloned()
    }

    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        match kind {
            ModelKind::FaceMesh => self.face_mesh.initialized(),
            ModelKind::ObjectDetector => self.object_detector.initialized(),
        }
    }
}

async fn load_blocking<M: ?Sized + Send + 'static>(
    kind: ModelKind,
    load: impl FnOnce() -> Result<Box<M>, InferenceError> + Send + 'static,
) -> Result<Box<M>, ModelLoadError> {
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(load)
        .await
        .map_err(|e| ModelLoadError::Join {
            kind,
            reason: e.to_string(),
        })?;
    match result {
        Ok(model) => {
            tracing::info!(%kind, elapsed_ms = started.elapsed().as_millis() as u64, "model ready");
            Ok(model)
        }
        Err(source) => {
            tracing::warn!(%kind, error = %source, "model load failed; will retry on next request");
            Err(ModelLoadError::Load { kind, source })
        }
    }
}

fn spawn_queue<M: ?Sized + Send + 'static>(
    kind: ModelKind,
    model: Box<M>,
    depth: usize,
) -> Result<InferenceQueue<M>, ModelLoadError> {
    InferenceQueue::spawn(kind.thread_name(), model, depth)
        .map_err(|source| ModelLoadError::Thread { kind, source })
}

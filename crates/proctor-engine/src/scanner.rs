//! Object/person scanning backends.

use crate::registry::{ModelLoadError, ModelRegistry};
use crate::queue::QueueError;
use async_trait::async_trait;
use base64::Engine as _;
use proctor_core::{classify_detections, classify_labels, Frame, ObjectObservation, Thresholds};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("object inference failed: {0}")]
    Inference(String),
}

/// Answers "which prohibited objects and how many people" for one frame.
#[async_trait]
pub trait ObjectScanner: Send + Sync {
    async fn scan(&self, frame: Arc<Frame>) -> Result<ObjectObservation, ScanError>;

    fn name(&self) -> &'static str;
}

/// In-process YOLO detector served by the model registry.
pub struct LocalObjectScanner {
    registry: Arc<ModelRegistry>,
    thresholds: Thresholds,
}

impl LocalObjectScanner {
    pub fn new(registry: Arc<ModelRegistry>, thresholds: Thresholds) -> Self {
        Self { registry, thresholds }
    }
}

#[async_trait]
impl ObjectScanner for LocalObjectScanner {
    async fn scan(&self, frame: Arc<Frame>) -> Result<ObjectObservation, ScanError> {
        let model = self.registry.object_detector().await?;
        let frame_area = frame.area();
        let detections = model
            .run(move |m| m.detect(&frame))
            .await?
            .map_err(|e| ScanError::Inference(e.to_string()))?;
        let observation = classify_detections(&detections, frame_area, &self.thresholds);
        tracing::trace!(
            raw = detections.len(),
            objects = observation.objects.len(),
            persons = observation.person_count,
            "local object scan"
        );
        Ok(observation)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[derive(Serialize)]
struct MlRequest<'a> {
    image: &'a str,
}

/// Reply of the ML service. Labels arrive already filtered by its own
/// confidence and size cutoffs; the remaining fields are ignored.
#[derive(Deserialize, Debug, Default, PartialEq)]
struct MlResponse {
    /// The service may leave `null` holes in the list.
    #[serde(default)]
    detected_objects: Vec<Option<String>>,
    #[serde(default)]
    person_count: usize,
}

/// Delegates detection to the external ML service.
///
/// Fail-open: timeouts, transport errors, HTTP errors and malformed replies all
/// yield an empty observation.
pub struct RemoteObjectScanner {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    thresholds: Thresholds,
}

impl RemoteObjectScanner {
    pub fn new(url: impl Into<String>, timeout: Duration, thresholds: Thresholds) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
            thresholds,
        }
    }

    async fn request(&self, frame: &Frame) -> Result<MlResponse, String> {
        let jpeg = frame.to_jpeg().map_err(|e| e.to_string())?;
        let image = base64::engine::general_purpose::STANDARD.encode(jpeg);

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&MlRequest { image: &image })
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        response.json().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ObjectScanner for RemoteObjectScanner {
    async fn scan(&self, frame: Arc<Frame>) -> Result<ObjectObservation, ScanError> {
        match self.request(&frame).await {
            Ok(reply) => {
                let labels: Vec<String> = reply.detected_objects.into_iter().flatten().collect();
                Ok(classify_labels(&labels, reply.person_count, &self.thresholds))
            }
            Err(error) => {
                tracing::warn!(url = %self.url, %error, "ML service unavailable; continuing without object signals");
                Ok(ObjectObservation::default())
            }
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

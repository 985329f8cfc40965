//! proctor-engine — Async runtime around proctor-core.
//!
//! Owns the model registry and its inference threads, the object scanner
//! backends, the session store contract and the per-frame [`Proctor`] pipeline.

pub mod config;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod scanner;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError, ScannerConfig};
pub use pipeline::{Enrollment, FrameReport, FrameSubmission, PipelineError, Proctor, Submission};
pub use queue::{InferenceQueue, QueueError};
pub use registry::{ModelHandle, ModelKind, ModelLoadError, ModelLoader, ModelRegistry, OnnxModelLoader};
pub use scanner::{LocalObjectScanner, ObjectScanner, RemoteObjectScanner, ScanError};
pub use store::{InMemorySessionStore, SessionStore, StoreError};

//! Dedicated inference threads.
//!
//! ONNX sessions need exclusive access, so each loaded model lives on its own OS
//! thread and async callers submit closures through a bounded channel.

use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("inference thread exited")]
    ChannelClosed,
    #[error("inference job panicked")]
    JobPanicked,
}

type Job<M> = Box<dyn FnOnce(&mut M) + Send>;

/// Clone-safe handle to a model owned by a worker thread.
pub struct InferenceQueue<M: ?Sized> {
    tx: mpsc::Sender<Job<M>>,
    name: String,
}

impl<M: ?Sized> Clone for InferenceQueue<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name.clone(),
        }
    }
}

impl<M: ?Sized> std::fmt::Debug for InferenceQueue<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceQueue").field("name", &self.name).finish()
    }
}

impl<M: ?Sized + Send + 'static> InferenceQueue<M> {
    /// Move `model` onto a new named thread and start serving jobs.
    ///
    /// The thread exits when every handle has been dropped.
    pub fn spawn(name: &str, mut model: Box<M>, depth: usize) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::channel::<Job<M>>(depth.max(1));
        let thread_name = name.to_string();

        std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::info!(thread = %thread_name, "inference thread started");
                while let Some(job) = rx.blocking_recv() {
                    // A panicking job drops its reply sender; the model stays usable.
                    if catch_unwind(AssertUnwindSafe(|| job(&mut *model))).is_err() {
                        tracing::error!(thread = %thread_name, "inference job panicked");
                    }
                }
                tracing::info!(thread = %thread_name, "inference thread exiting");
            })?;

        Ok(Self {
            tx,
            name: name.to_string(),
        })
    }

    /// Run `f` against the model on the worker thread and await its result.
    pub async fn run<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce(&mut M) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job<M> = Box::new(move |model: &mut M| {
            let _ = reply_tx.send(f(model));
        });
        self.tx
            .send(job)
            .await
            .map_err(|_| QueueError::ChannelClosed)?;
        reply_rx.await.map_err(|_| QueueError::JobPanicked)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when both handles feed the same worker thread.
    pub fn same_worker(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

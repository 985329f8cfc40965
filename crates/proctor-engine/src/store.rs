use async_trait::async_trait;
use proctor_core::SessionState;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence boundary for session state. The web layer supplies the real one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;
    async fn put(&self, session_id: &str, state: SessionState) -> Result<(), StoreError>;
}

/// Process-local store, for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(state: SessionState) -> Self {
        let store = Self::default();
        store
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.session_id.clone(), state);
        store
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(session_id).cloned())
    }

    async fn put(&self, session_id: &str, state: SessionState) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session_id.to_string(), state);
        Ok(())
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use super::types::{ChatMessage, Session, SessionId};

/// Exclusive handle on one conversation. Holding the lock serializes turns.
pub type SessionHandle = Arc<AsyncMutex<Session>>;

/// Process-local registry of live sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    max_history: Option<usize>,
}

impl SessionStore {
    pub fn new(max_history: Option<usize>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_history,
        }
    }

    /// Returns the session for `id`, creating an empty one on first use.
    pub fn open(&self, id: &SessionId) -> anyhow::Result<SessionHandle> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;
        let handle = sessions.entry(id.clone()).or_insert_with(|| {
            debug!(session = %id, "creating session");
            Arc::new(AsyncMutex::new(Session::new(id.clone(), self.max_history)))
        });
        Ok(handle.clone())
    }

    fn existing(&self, id: &SessionId) -> anyhow::Result<Option<SessionHandle>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;
        Ok(sessions.get(id).cloned())
    }

    /// Snapshot of the history; empty for sessions that were never opened.
    pub async fn get(&self, id: &SessionId) -> anyhow::Result<Vec<ChatMessage>> {
        match self.existing(id)? {
            Some(handle) => Ok(handle.lock().await.snapshot()),
            None => Ok(Vec::new()),
        }
    }

    pub async fn append(&self, id: &SessionId, message: ChatMessage) -> anyhow::Result<()> {
        let handle = self.open(id)?;
        handle.lock().await.append(message);
        Ok(())
    }

    pub async fn clear(&self, id: &SessionId) -> anyhow::Result<()> {
        if let Some(handle) = self.existing(id)? {
            handle.lock().await.clear();
        }
        Ok(())
    }

    /// Ends a session. Returns whether it existed.
    pub fn remove(&self, id: &SessionId) -> anyhow::Result<bool> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;
        Ok(sessions.remove(id).is_some())
    }

    pub fn session_ids(&self) -> anyhow::Result<Vec<SessionId>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session registry lock poisoned"))?;
        let mut ids: Vec<_> = sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

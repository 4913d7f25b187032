// ABOUTME: Pool of SSH sessions keyed by (host, port, user).
// ABOUTME: Sites on the same host reuse one connection for the whole CLI invocation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::client::{Session, SessionConfig};
use super::error::Result;

type PoolKey = (String, u16, String);

#[derive(Debug, Default)]
pub struct SessionPool {
    sessions: Mutex<HashMap<PoolKey, Arc<Session>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pooled session for this endpoint, connecting on first use.
    ///
    /// Two concurrent callers for the same new endpoint may both connect; the
    /// first one stored wins and the other connection is dropped.
    pub async fn get_or_connect(&self, config: SessionConfig) -> Result<Arc<Session>> {
        let key = (config.host.clone(), config.port, config.user.clone());

        if let Some(session) = self.sessions.lock().get(&key) {
            tracing::debug!("Reusing SSH session to {}@{}:{}", key.2, key.0, key.1);
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(Session::connect(config).await?);
        let mut sessions = self.sessions.lock();
        Ok(Arc::clone(sessions.entry(key).or_insert(session)))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every pooled session. Failures are logged, not returned.
    pub async fn disconnect_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().collect();
        for ((host, port, user), session) in sessions {
            if let Err(e) = session.disconnect().await {
                tracing::warn!("Failed to disconnect from {}@{}:{}: {}", user, host, port, e);
            }
        }
    }
}

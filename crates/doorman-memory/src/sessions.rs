//! In-memory `SessionStore`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use doorman_core::error::StoreResult;
use doorman_core::session::{SessionRecord, SessionStore};

/// Session records keyed by `(user_id, session_type)`.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<HashMap<(String, String), SessionRecord>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Drop a user's session for one namespace (the host-side revoke).
    pub async fn remove(&self, user_id: &str, session_type: &str) -> bool {
        self.inner
            .write()
            .await
            .remove(&(user_id.to_string(), session_type.to_string()))
            .is_some()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn upsert(&self, user_id: &str, session_type: &str) -> StoreResult<SessionRecord> {
        let mut sessions = self.inner.write().await;
        let now = Utc::now();
        let record = sessions
            .entry((user_id.to_string(), session_type.to_string()))
            .and_modify(|record| {
                record.token_index += 1;
                record.rotated_at = now;
            })
            .or_insert_with(|| SessionRecord {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                session_type: session_type.to_string(),
                token_index: 1,
                rotated_at: now,
            });
        Ok(record.clone())
    }

    async fn get(
        &self,
        user_id: &str,
        session_type: &str,
    ) -> StoreResult<Option<SessionRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .get(&(user_id.to_string(), session_type.to_string()))
            .cloned())
    }
}

//! Conversational session state.
//!
//! History lives here, outside any agent, so an agent can serve many
//! concurrent conversations. The router hands the matching [`SessionHandle`]
//! to `Agent::invoke`; agents never look sessions up themselves.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Role of the party that produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: MessageRole,
    /// Agent that produced an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub content: String,
    /// Unix millis.
    pub timestamp: u64,
}

impl SessionTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            agent_id: None,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn from_agent(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            agent_id: Some(agent.into()),
            content: content.into(),
            timestamp: now_millis(),
        }
    }
}

/// Shared handle to one session's history.
#[derive(Debug)]
pub struct SessionHandle {
    id: String,
    history: Mutex<Vec<SessionTurn>>,
    /// Unix millis of the last lookup or turn.
    last_active: AtomicU64,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            history: Mutex::new(Vec::new()),
            last_active: AtomicU64::new(now_millis()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn push(&self, turn: SessionTurn) {
        self.touch();
        self.history.lock().await.push(turn);
    }

    pub fn last_active(&self) -> u64 {
        self.last_active.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_active.store(now_millis(), Ordering::Relaxed);
    }

    /// Snapshot of the conversation so far.
    pub async fn history(&self) -> Vec<SessionTurn> {
        self.history.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.lock().await.is_empty()
    }

    /// Number of turns an agent has contributed.
    pub async fn turns_by(&self, agent_id: &str) -> usize {
        self.history
            .lock()
            .await
            .iter()
            .filter(|t| t.agent_id.as_deref() == Some(agent_id))
            .count()
    }
}

/// Session handles keyed by opaque session id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the handle for `id`, creating it on first use.
    pub async fn get_or_create(&self, id: &str) -> Arc<SessionHandle> {
        if let Some(handle) = self.sessions.read().await.get(id) {
            handle.touch();
            return handle.clone();
        }
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(SessionHandle::new(id)));
        handle.touch();
        handle.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session. Returns whether it existed.
    pub async fn end(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drop sessions untouched for longer than `max_idle`. Sessions still
    /// held by an in-flight request are kept. Returns how many were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = now_millis().saturating_sub(max_idle.as_millis() as u64);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            handle.last_active() >= cutoff || Arc::strong_count(handle) > 1
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Generate a fresh session id.
pub fn new_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_returns_same_handle_for_same_id() {
        let store = SessionStore::new();
        let a = store.get_or_create("s1").await;
        a.push(SessionTurn::user("hello")).await;

        let b = store.get_or_create("s1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.get_or_create("s1").await;
        let b = store.get_or_create("s2").await;
        a.push(SessionTurn::user("only in s1")).await;

        assert_eq!(a.len().await, 1);
        assert!(b.is_empty().await);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_end_session() {
        let store = SessionStore::new();
        store.get_or_create("s1").await;
        assert!(store.end("s1").await);
        assert!(!store.end("s1").await);
        assert!(store.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_idle_sessions() {
        let store = SessionStore::new();
        store.get_or_create("stale").await;
        let held = store.get_or_create("held").await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.get_or_create("fresh").await;

        assert_eq!(store.evict_idle(Duration::from_millis(30)).await, 1);
        assert!(store.get("stale").await.is_none());
        assert!(store.get("fresh").await.is_some());
        assert!(store.get("held").await.is_some());

        drop(held);
        assert_eq!(store.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_push_marks_session_active() {
        let handle = SessionHandle::new("s");
        let created = handle.last_active();
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.push(SessionTurn::user("hi")).await;
        assert!(handle.last_active() > created);
    }

    #[tokio::test]
    async fn test_turns_by_agent() {
        let handle = SessionHandle::new("s");
        handle.push(SessionTurn::user("I feel worried")).await;
        handle.push(SessionTurn::from_agent("mental_health", "I hear you")).await;
        handle.push(SessionTurn::from_agent("other", "noise")).await;
        assert_eq!(handle.turns_by("mental_health").await, 1);
        assert_eq!(handle.history().await[0].role, MessageRole::User);
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
        assert!(new_session_id().starts_with("session-"));
    }
}

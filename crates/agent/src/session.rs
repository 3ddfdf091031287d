use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use waypoint_core::ConversationState;

pub type SharedConversation = Arc<Mutex<ConversationState>>;

/// Conversation state per conversation id. Each entry has its own lock, so
/// turns within one conversation serialize while other conversations
/// proceed.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SharedConversation>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, conversation_id: &str) -> SharedConversation {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(sessions.entry(conversation_id.to_string()).or_default())
    }

    pub async fn remove(&self, conversation_id: &str) -> Option<SharedConversation> {
        self.sessions.lock().await.remove(conversation_id)
    }

    pub async fn contains(&self, conversation_id: &str) -> bool {
        self.sessions.lock().await.contains_key(conversation_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SessionStore;

    #[tokio::test]
    async fn same_id_shares_one_conversation() {
        let store = SessionStore::new();
        let first = store.get_or_create("chat-1").await;
        let again = store.get_or_create("chat-1").await;
        let other = store.get_or_create("chat-2").await;

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn removed_conversation_starts_fresh() {
        let store = SessionStore::new();
        store.get_or_create("chat-1").await.lock().await.merge(Vec::new());
        assert!(store.remove("chat-1").await.is_some());
        assert!(!store.contains("chat-1").await);

        let fresh = store.get_or_create("chat-1").await;
        assert_eq!(fresh.lock().await.turns(), 0);
    }
}

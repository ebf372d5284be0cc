use super::{ChatResult, MessageSynchronizer};
use pawmatch_model::{ConversationId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Typing flags raised by one session. Keystrokes raise the flag and each
/// keystroke pushes back the moment it is lowered again.
#[derive(Clone)]
pub struct TypingTracker {
    messages: MessageSynchronizer,
    idle: Duration,
    /// Conversation -> generation of the latest keystroke.
    raised: Arc<Mutex<HashMap<ConversationId, u64>>>,
}

impl TypingTracker {
    pub fn new(messages: MessageSynchronizer, idle: Duration) -> Self {
        Self {
            messages,
            idle,
            raised: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn raised(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationId, u64>> {
        self.raised.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Explicit flag change. Lowering forgets any pending idle timer.
    pub async fn set(&self, conversation: &ConversationId, user: &UserId, is_typing: bool) -> ChatResult<()> {
        self.messages
            .update_typing_status(conversation, user, is_typing)
            .await?;
        let mut raised = self.raised();
        if is_typing {
            *raised.entry(conversation.clone()).or_insert(0) += 1;
        } else {
            raised.remove(conversation);
        }
        Ok(())
    }

    /// Raise the flag if it is down, then lower it after `idle` without
    /// another keystroke.
    pub async fn keystroke(&self, conversation: &ConversationId, user: &UserId) -> ChatResult<()> {
        let already_raised = self.raised().contains_key(conversation);
        if !already_raised {
            self.messages
                .update_typing_status(conversation, user, true)
                .await?;
        }
        let generation = {
            let mut raised = self.raised();
            let generation = raised.entry(conversation.clone()).or_insert(0);
            *generation += 1;
            *generation
        };

        let tracker = self.clone();
        let conversation = conversation.clone();
        let user = user.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.idle).await;
            let expired = {
                let mut raised = tracker.raised();
                if raised.get(&conversation) == Some(&generation) {
                    raised.remove(&conversation);
                    true
                } else {
                    false
                }
            };
            if expired {
                debug!(%conversation, "typing idle, lowering flag");
                if let Err(err) = tracker
                    .messages
                    .update_typing_status(&conversation, &user, false)
                    .await
                {
                    warn!(%conversation, error = %err, "failed to lower typing flag");
                }
            }
        });
        Ok(())
    }

    pub fn is_raised(&self, conversation: &ConversationId) -> bool {
        self.raised().contains_key(conversation)
    }

    /// Lower every flag this session still has up. Returns how many were lowered.
    pub async fn clear_all(&self, user: &UserId) -> usize {
        let pending: Vec<ConversationId> = self.raised().drain().map(|(c, _)| c).collect();
        let mut cleared = 0;
        for conversation in pending {
            match self
                .messages
                .update_typing_status(&conversation, user, false)
                .await
            {
                Ok(()) => cleared += 1,
                Err(err) => warn!(%conversation, error = %err, "failed to clear typing flag"),
            }
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, Fields, MemoryStore};
    use crate::subscriptions::BackoffPolicy;
    use pawmatch_model::Conversation;

    async fn setup() -> (MemoryStore, TypingTracker) {
        let store = MemoryStore::new();
        let conversation = Conversation::new(
            ConversationId::from("c1"),
            UserId::from("u1"),
            UserId::from("p1"),
            1,
        );
        store
            .create("conversations", "c1", Fields::from_record(&conversation).unwrap())
            .await
            .unwrap();
        let messages = MessageSynchronizer::new(Arc::new(store.clone()), 50, BackoffPolicy::default());
        (store, TypingTracker::new(messages, Duration::from_secs(3)))
    }

    async fn flag(store: &MemoryStore) -> serde_json::Value {
        let doc = store.get("conversations", "c1").await.unwrap().unwrap();
        doc.data["typing"]["u1"].clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystrokes_extend_idle_window() {
        let (store, tracker) = setup().await;
        let c1 = ConversationId::from("c1");
        let u1 = UserId::from("u1");

        tracker.keystroke(&c1, &u1).await.unwrap();
        assert_eq!(flag(&store).await, serde_json::json!(true));

        tokio::time::sleep(Duration::from_secs(2)).await;
        tracker.keystroke(&c1, &u1).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(flag(&store).await, serde_json::json!(true));
        assert!(tracker.is_raised(&c1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(flag(&store).await, serde_json::json!(false));
        assert!(!tracker.is_raised(&c1));
    }

    #[tokio::test]
    async fn test_clear_all_lowers_outstanding_flags() {
        let (store, tracker) = setup().await;
        let u1 = UserId::from("u1");
        tracker.set(&ConversationId::from("c1"), &u1, true).await.unwrap();

        assert_eq!(tracker.clear_all(&u1).await, 1);
        assert_eq!(flag(&store).await, serde_json::json!(false));
        assert_eq!(tracker.clear_all(&u1).await, 0);
    }
}

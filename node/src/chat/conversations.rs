use super::{ChatError, ChatResult};
use crate::profiles::ProfileDirectory;
use crate::store::{collections, Direction, Document, DocumentStore, Query};
use crate::subscriptions::{spawn_feed, BackoffPolicy, FeedEvent, ListenerHandle, Subscription};
use futures::future::join_all;
use pawmatch_model::{
    Conversation, ConversationId, ConversationSummary, LastMessage, MessageType, UserId,
    PLACEHOLDER_AVATAR, UNKNOWN_NAME,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Keeps a user's chat list current: every pushed conversation snapshot is
/// joined with counterpart profiles and unread tallies.
#[derive(Clone)]
pub struct ConversationSynchronizer {
    store: Arc<dyn DocumentStore>,
    profiles: ProfileDirectory,
    backoff: BackoffPolicy,
}

impl ConversationSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, backoff: BackoffPolicy) -> Self {
        Self {
            profiles: ProfileDirectory::new(Arc::clone(&store)),
            store,
            backoff,
        }
    }

    fn active_for(user: &UserId) -> Query {
        Query::collection(collections::CONVERSATIONS)
            .where_array_contains("participants", user.as_str())
            .where_eq("status", "active")
            .order_by("lastMessageAt", Direction::Descending)
    }

    /// Push the user's active conversations, newest activity first, on every
    /// change. Store errors go to `on_error` and the listener stays up.
    pub fn subscribe_conversations<U, E>(&self, user: UserId, on_update: U, on_error: E) -> Subscription
    where
        U: Fn(Vec<ConversationSummary>) + Send + Sync + 'static,
        E: Fn(ChatError) + Send + Sync + 'static,
    {
        let handle = ListenerHandle::new();
        let guard = handle.clone();
        let on_update = Arc::new(on_update);
        let on_error = Arc::new(on_error);
        let this = self.clone();
        let query = Self::active_for(&user);

        spawn_feed(
            Arc::clone(&self.store),
            query,
            self.backoff.clone(),
            handle.clone(),
            move |event| {
                let this = this.clone();
                let user = user.clone();
                let guard = guard.clone();
                let on_update = Arc::clone(&on_update);
                let on_error = Arc::clone(&on_error);
                async move {
                    match event {
                        FeedEvent::Snapshot(docs) => {
                            let summaries = this.summarize(&user, docs).await;
                            guard.deliver(|| on_update(summaries));
                        }
                        FeedEvent::Error(err) => {
                            guard.deliver(|| on_error(err.into()));
                        }
                        FeedEvent::RetriesExhausted(attempts) => {
                            guard.deliver(|| on_error(ChatError::RetriesExhausted { attempts }));
                        }
                    }
                }
            },
        );
        Subscription::new(handle)
    }

    /// One-shot read of the same list.
    pub async fn get_conversations(&self, user: &UserId) -> ChatResult<Vec<ConversationSummary>> {
        let docs = self.store.query(&Self::active_for(user)).await?;
        Ok(self.summarize(user, docs).await)
    }

    /// Messages in the conversation sent by someone other than `user` and not
    /// yet read. Lookup failures count as zero.
    pub async fn unread_count(&self, conversation: &ConversationId, user: &UserId) -> usize {
        let query = Query::collection(collections::MESSAGES)
            .where_eq("conversationId", conversation.as_str())
            .where_eq("read", false)
            .where_not_eq("senderId", user.as_str());
        match self.store.query(&query).await {
            Ok(docs) => docs.len(),
            Err(err) => {
                warn!(%conversation, error = %err, "unread count failed");
                0
            }
        }
    }

    async fn summarize(&self, user: &UserId, docs: Vec<Document>) -> Vec<ConversationSummary> {
        let rows = docs.into_iter().map(|doc| self.summary(user, doc));
        join_all(rows).await.into_iter().flatten().collect()
    }

    async fn summary(&self, user: &UserId, doc: Document) -> Option<ConversationSummary> {
        let conversation: Conversation = match doc.decode() {
            Ok(conversation) => conversation,
            Err(err) => {
                warn!(conversation = %doc.id, error = %err, "skipping undecodable conversation");
                return None;
            }
        };
        let counterpart_id = conversation
            .counterpart_of(user)
            .unwrap_or(&conversation.counterpart_ref_id)
            .clone();

        let (profile, unread_count) = futures::join!(
            self.profiles.lookup(&counterpart_id),
            self.unread_count(&conversation.id, user)
        );
        let (counterpart_name, counterpart_avatar) = match &profile {
            Some(profile) => (
                profile.display_name().to_string(),
                profile.avatar_url().to_string(),
            ),
            None => {
                debug!(counterpart = %counterpart_id, "no profile, using placeholders");
                (UNKNOWN_NAME.to_string(), PLACEHOLDER_AVATAR.to_string())
            }
        };

        let last_message = conversation.last_message.unwrap_or(LastMessage {
            content: String::new(),
            timestamp: conversation.last_message_at,
            kind: MessageType::Text,
        });

        Some(ConversationSummary {
            conversation_id: conversation.id,
            counterpart_id,
            counterpart_name,
            counterpart_avatar,
            last_message,
            unread_count,
            typing: conversation.typing,
        })
    }
}

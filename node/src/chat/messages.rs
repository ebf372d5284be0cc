use super::{ChatError, ChatResult};
use crate::store::{
    collections, Direction, Document, DocumentStore, FieldPath, Fields, Query, StoreError, WriteOp,
};
use crate::subscriptions::{spawn_feed, BackoffPolicy, FeedEvent, ListenerHandle, Subscription};
use pawmatch_model::{ConversationId, Message, MessageId, OutgoingMessage, UserId};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Per-subscription memory of read state. Once a message has been seen read
/// it is never handed out unread again, and each unread message is marked
/// at most once.
#[derive(Default)]
struct ReadGuard {
    seen_read: HashSet<MessageId>,
    requested: HashSet<MessageId>,
}

impl ReadGuard {
    /// Patch stale read flags in place and return the messages that still
    /// need marking on behalf of `viewer`.
    fn reconcile(&mut self, viewer: &UserId, messages: &mut [Message]) -> Vec<MessageId> {
        let mut to_mark = Vec::new();
        for message in messages.iter_mut() {
            if message.read {
                self.seen_read.insert(message.id.clone());
            } else if self.seen_read.contains(&message.id) {
                message.read = true;
            } else if message.is_unread_for(viewer) && self.requested.insert(message.id.clone()) {
                to_mark.push(message.id.clone());
            }
        }
        to_mark
    }
}

/// Message windows, sends, read receipts and typing flags for conversations.
#[derive(Clone)]
pub struct MessageSynchronizer {
    store: Arc<dyn DocumentStore>,
    window: usize,
    backoff: BackoffPolicy,
}

impl MessageSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, window: usize, backoff: BackoffPolicy) -> Self {
        Self {
            store,
            window: window.max(1),
            backoff,
        }
    }

    fn window_of(&self, conversation: &ConversationId) -> Query {
        Query::collection(collections::MESSAGES)
            .where_eq("conversationId", conversation.as_str())
            .order_by("createdAt", Direction::Descending)
            .limit(self.window)
    }

    /// Push the newest messages of one conversation, newest first. Messages
    /// from others that arrive unread are marked read in the background.
    pub fn subscribe_messages<U, E>(
        &self,
        viewer: UserId,
        conversation: ConversationId,
        on_update: U,
        on_error: E,
    ) -> Subscription
    where
        U: Fn(Vec<Message>) + Send + Sync + 'static,
        E: Fn(ChatError) + Send + Sync + 'static,
    {
        let handle = ListenerHandle::new();
        let guard = handle.clone();
        let reads = Arc::new(Mutex::new(ReadGuard::default()));
        let on_update = Arc::new(on_update);
        let on_error = Arc::new(on_error);
        let this = self.clone();

        spawn_feed(
            Arc::clone(&self.store),
            self.window_of(&conversation),
            self.backoff.clone(),
            handle.clone(),
            move |event| {
                let this = this.clone();
                let viewer = viewer.clone();
                let guard = guard.clone();
                let reads = Arc::clone(&reads);
                let on_update = Arc::clone(&on_update);
                let on_error = Arc::clone(&on_error);
                async move {
                    match event {
                        FeedEvent::Snapshot(docs) => {
                            let mut messages = decode_all(docs);
                            let to_mark = reads
                                .lock()
                                .unwrap_or_else(|p| p.into_inner())
                                .reconcile(&viewer, &mut messages);
                            for id in to_mark {
                                let this = this.clone();
                                tokio::spawn(async move {
                                    if let Err(err) = this.mark_message_as_read(&id).await {
                                        warn!(message = %id, error = %err, "auto mark-read failed");
                                    }
                                });
                            }
                            guard.deliver(|| on_update(messages));
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

    /// One-shot read of the same window.
    pub async fn get_messages(&self, conversation: &ConversationId) -> ChatResult<Vec<Message>> {
        let docs = self.store.query(&self.window_of(conversation)).await?;
        Ok(decode_all(docs))
    }

    /// Write the message and the conversation's last-message summary in one batch.
    pub async fn send_message(&self, sender: &UserId, draft: OutgoingMessage) -> ChatResult<Message> {
        if sender.as_str().is_empty() {
            return Err(ChatError::Unauthenticated);
        }
        if self
            .store
            .get(collections::CONVERSATIONS, draft.conversation_id.as_str())
            .await?
            .is_none()
        {
            return Err(ChatError::ConversationNotFound(draft.conversation_id));
        }

        let now = self.store.server_timestamp().await;
        let summary = serde_json::to_value(draft.summary(now)).map_err(StoreError::from)?;
        let message = Message {
            id: MessageId::new(self.store.new_id()),
            conversation_id: draft.conversation_id,
            sender_id: sender.clone(),
            content: draft.content,
            kind: draft.kind,
            gif_url: draft.gif_url,
            created_at: now,
            read: false,
        };

        self.store
            .batch_write(vec![
                WriteOp::create(
                    collections::MESSAGES,
                    message.id.as_str(),
                    Fields::from_record(&message)?,
                ),
                WriteOp::update(
                    collections::CONVERSATIONS,
                    message.conversation_id.as_str(),
                    Fields::new()
                        .set("lastMessage", summary)
                        .set("lastMessageAt", now),
                ),
            ])
            .await?;
        info!(
            message = %message.id,
            conversation = %message.conversation_id,
            kind = ?message.kind,
            "message sent"
        );
        Ok(message)
    }

    /// Sets `read` to true. There is no way to unset it.
    pub async fn mark_message_as_read(&self, message: &MessageId) -> ChatResult<()> {
        self.store
            .update(
                collections::MESSAGES,
                message.as_str(),
                Fields::new().set("read", true),
            )
            .await?;
        debug!(%message, "marked read");
        Ok(())
    }

    /// Mark `message` read on behalf of `reader`. Only the recipient may.
    pub async fn mark_read_as(&self, reader: &UserId, message: &MessageId) -> ChatResult<()> {
        let doc = self
            .store
            .get(collections::MESSAGES, message.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: collections::MESSAGES.to_owned(),
                id: message.to_string(),
            })?;
        let stored: Message = doc.decode()?;
        if &stored.sender_id == reader {
            return Err(ChatError::OwnMessage(message.clone()));
        }
        if stored.read {
            return Ok(());
        }
        self.mark_message_as_read(message).await
    }

    /// Field-scoped write of `typing.<user>`; the other participant's flag is untouched.
    pub async fn update_typing_status(
        &self,
        conversation: &ConversationId,
        user: &UserId,
        is_typing: bool,
    ) -> ChatResult<()> {
        let result = self
            .store
            .update(
                collections::CONVERSATIONS,
                conversation.as_str(),
                Fields::new().set(FieldPath::nested(["typing", user.as_str()]), is_typing),
            )
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => {
                Err(ChatError::ConversationNotFound(conversation.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Push the conversation's typing flags on every change. A missing
    /// conversation reads as nobody typing.
    pub fn subscribe_typing<U, E>(
        &self,
        conversation: ConversationId,
        on_update: U,
        on_error: E,
    ) -> Subscription
    where
        U: Fn(BTreeMap<UserId, bool>) + Send + Sync + 'static,
        E: Fn(ChatError) + Send + Sync + 'static,
    {
        let handle = ListenerHandle::new();
        let guard = handle.clone();
        let on_update = Arc::new(on_update);
        let on_error = Arc::new(on_error);
        let mut last: Option<BTreeMap<UserId, bool>> = None;

        spawn_feed(
            Arc::clone(&self.store),
            Query::document(collections::CONVERSATIONS, conversation.as_str()),
            self.backoff.clone(),
            handle.clone(),
            move |event| {
                let guard = guard.clone();
                let on_update = Arc::clone(&on_update);
                let on_error = Arc::clone(&on_error);
                let changed = match &event {
                    FeedEvent::Snapshot(docs) => {
                        let typing = docs.first().map(typing_flags).unwrap_or_default();
                        if last.as_ref() == Some(&typing) {
                            None
                        } else {
                            last = Some(typing.clone());
                            Some(typing)
                        }
                    }
                    _ => None,
                };
                async move {
                    match event {
                        FeedEvent::Snapshot(_) => {
                            if let Some(typing) = changed {
                                guard.deliver(|| on_update(typing));
                            }
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
}

fn typing_flags(doc: &Document) -> BTreeMap<UserId, bool> {
    doc.data
        .get("typing")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

fn decode_all(docs: Vec<Document>) -> Vec<Message> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(message = %doc.id, error = %err, "skipping undecodable message");
                None
            }
        })
        .collect()
}

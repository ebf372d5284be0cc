use super::{
    ChatError, ChatResult, ConversationSynchronizer, MessageSynchronizer, Session, TypingTracker,
};
use crate::config::ChatConfig;
use crate::gateways::{DebouncedGifSearch, GifSearch, MediaBlob, MediaUploader};
use crate::matching::MatchEngine;
use crate::store::DocumentStore;
use crate::subscriptions::{ListenerRegistry, Subscription};
use pawmatch_model::{
    ConversationId, ConversationSummary, GifResult, MatchOutcome, Message, MessageId, MessageType,
    OutgoingMessage, SwipeDecision, SwipeVerdict, UserId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Everything a signed-in client screen talks to. One facade per session;
/// it owns every listener it hands out and sweeps them on teardown.
pub struct ChatFacade {
    session: Session,
    matches: MatchEngine,
    conversations: ConversationSynchronizer,
    messages: MessageSynchronizer,
    typing: TypingTracker,
    uploader: Arc<dyn MediaUploader>,
    gifs: DebouncedGifSearch,
    message_listeners: ListenerRegistry<ConversationId>,
    conversation_listeners: ListenerRegistry<UserId>,
    typing_listeners: ListenerRegistry<ConversationId>,
}

impl ChatFacade {
    pub fn new(
        session: Session,
        store: Arc<dyn DocumentStore>,
        config: ChatConfig,
        uploader: Arc<dyn MediaUploader>,
        gifs: Arc<dyn GifSearch>,
    ) -> Self {
        let messages = MessageSynchronizer::new(
            Arc::clone(&store),
            config.message_window,
            config.backoff.clone(),
        );
        Self {
            session,
            matches: MatchEngine::new(Arc::clone(&store)),
            conversations: ConversationSynchronizer::new(store, config.backoff.clone()),
            typing: TypingTracker::new(messages.clone(), config.typing_idle),
            messages,
            uploader,
            gifs: DebouncedGifSearch::new(gifs, config.gif_debounce),
            message_listeners: ListenerRegistry::new("messages"),
            conversation_listeners: ListenerRegistry::new("conversations"),
            typing_listeners: ListenerRegistry::new("typing"),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn record_swipe(
        &self,
        counterpart: UserId,
        verdict: SwipeVerdict,
    ) -> ChatResult<MatchOutcome> {
        let actor = self.session.current_user()?.clone();
        Ok(self
            .matches
            .record_swipe(SwipeDecision::new(actor, counterpart, verdict))
            .await?)
    }

    pub async fn send_message(
        &self,
        conversation: ConversationId,
        content: impl Into<String>,
        kind: MessageType,
        gif_url: Option<String>,
    ) -> ChatResult<Message> {
        let sender = self.session.current_user()?;
        let draft = OutgoingMessage::new(conversation, content, kind, gif_url)?;
        self.messages.send_message(sender, draft).await
    }

    pub fn subscribe_to_messages<U, E>(
        &self,
        conversation: ConversationId,
        on_update: U,
        on_error: E,
    ) -> ChatResult<Subscription>
    where
        U: Fn(Vec<Message>) + Send + Sync + 'static,
        E: Fn(ChatError) + Send + Sync + 'static,
    {
        let viewer = self.session.current_user()?.clone();
        let subscription =
            self.messages
                .subscribe_messages(viewer, conversation.clone(), on_update, on_error);
        self.message_listeners
            .register(conversation, subscription.handle());
        Ok(subscription)
    }

    pub fn unsubscribe_from_messages(&self, conversation: &ConversationId) -> bool {
        self.message_listeners.remove(conversation)
    }

    pub fn subscribe_to_conversations<U, E>(&self, on_update: U, on_error: E) -> ChatResult<Subscription>
    where
        U: Fn(Vec<ConversationSummary>) + Send + Sync + 'static,
        E: Fn(ChatError) + Send + Sync + 'static,
    {
        let user = self.session.current_user()?.clone();
        let subscription =
            self.conversations
                .subscribe_conversations(user.clone(), on_update, on_error);
        self.conversation_listeners
            .register(user, subscription.handle());
        Ok(subscription)
    }

    pub fn unsubscribe_from_conversations(&self) -> bool {
        match self.session.current_user() {
            Ok(user) => self.conversation_listeners.remove(user),
            Err(_) => false,
        }
    }

    pub fn subscribe_to_typing<U, E>(
        &self,
        conversation: ConversationId,
        on_update: U,
        on_error: E,
    ) -> Subscription
    where
        U: Fn(BTreeMap<UserId, bool>) + Send + Sync + 'static,
        E: Fn(ChatError) + Send + Sync + 'static,
    {
        let subscription = self
            .messages
            .subscribe_typing(conversation.clone(), on_update, on_error);
        self.typing_listeners
            .register(conversation, subscription.handle());
        subscription
    }

    pub fn unsubscribe_from_typing(&self, conversation: &ConversationId) -> bool {
        self.typing_listeners.remove(conversation)
    }

    pub async fn get_conversations(&self) -> ChatResult<Vec<ConversationSummary>> {
        let user = self.session.current_user()?;
        self.conversations.get_conversations(user).await
    }

    pub async fn get_messages(&self, conversation: &ConversationId) -> ChatResult<Vec<Message>> {
        self.messages.get_messages(conversation).await
    }

    pub async fn upload_image(&self, blob: MediaBlob) -> ChatResult<String> {
        self.session.current_user()?;
        Ok(self.uploader.upload(blob).await?)
    }

    /// Upload the image, then send its hosted url as an image message.
    pub async fn send_image(&self, conversation: ConversationId, blob: MediaBlob) -> ChatResult<Message> {
        let url = self.upload_image(blob).await?;
        self.send_message(conversation, url, MessageType::Image, None)
            .await
    }

    /// Debounced. `Ok(None)` when a newer search superseded this one.
    pub async fn search_gifs(&self, query: &str, page: u32) -> ChatResult<Option<Vec<GifResult>>> {
        Ok(self.gifs.search(query, page).await?)
    }

    pub async fn mark_message_as_read(&self, message: &MessageId) -> ChatResult<()> {
        let reader = self.session.current_user()?;
        self.messages.mark_read_as(reader, message).await
    }

    pub async fn update_typing_status(
        &self,
        conversation: &ConversationId,
        is_typing: bool,
    ) -> ChatResult<()> {
        let user = self.session.current_user()?;
        self.typing.set(conversation, user, is_typing).await
    }

    /// Raise the typing flag and lower it again after a quiet period.
    pub async fn note_keystroke(&self, conversation: &ConversationId) -> ChatResult<()> {
        let user = self.session.current_user()?;
        self.typing.keystroke(conversation, user).await
    }

    /// Cancel every listener handed out by this facade. Returns how many were live.
    pub fn unsubscribe_all(&self) -> usize {
        self.message_listeners.cancel_all()
            + self.conversation_listeners.cancel_all()
            + self.typing_listeners.cancel_all()
    }

    /// End of session: sweep listeners and lower any typing flag still up.
    pub async fn teardown(&self) {
        let listeners = self.unsubscribe_all();
        let flags = match self.session.current_user() {
            Ok(user) => self.typing.clear_all(user).await,
            Err(_) => 0,
        };
        info!(listeners, flags, "chat session torn down");
    }
}

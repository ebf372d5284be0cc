use crate::chat::{ChatFacade, ConversationSynchronizer, MessageSynchronizer, Session};
use crate::config::AppConfig;
use crate::gateways::{CloudinaryUploader, GifSearch, GiphyClient, MediaUploader};
use crate::matching::MatchEngine;
use crate::store::DocumentStore;
use std::sync::Arc;

/// Shared handles for the http surface.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn DocumentStore>,
    matches: MatchEngine,
    conversations: ConversationSynchronizer,
    messages: MessageSynchronizer,
    uploader: Arc<dyn MediaUploader>,
    gifs: Arc<dyn GifSearch>,
}

impl AppState {
    /// State whose gateways talk to the hosts named in `config`.
    pub fn new(config: AppConfig, store: Arc<dyn DocumentStore>) -> Arc<Self> {
        let uploader = Arc::new(CloudinaryUploader::new(config.media.clone()));
        let gifs = Arc::new(GiphyClient::new(config.gifs.clone()));
        Self::with_gateways(config, store, uploader, gifs)
    }

    pub fn with_gateways(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn MediaUploader>,
        gifs: Arc<dyn GifSearch>,
    ) -> Arc<Self> {
        let backoff = config.chat.backoff.clone();
        Arc::new(Self {
            matches: MatchEngine::new(Arc::clone(&store)),
            conversations: ConversationSynchronizer::new(Arc::clone(&store), backoff.clone()),
            messages: MessageSynchronizer::new(
                Arc::clone(&store),
                config.chat.message_window,
                backoff,
            ),
            uploader,
            gifs,
            store,
            config,
        })
    }

    /// Chat surface for one session, sharing this node's store and gateways.
    pub fn facade(&self, session: Session) -> ChatFacade {
        ChatFacade::new(
            session,
            Arc::clone(&self.store),
            self.config.chat.clone(),
            Arc::clone(&self.uploader),
            Arc::clone(&self.gifs),
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_id(&self) -> &str {
        &self.config.build_id
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn matches(&self) -> &MatchEngine {
        &self.matches
    }

    pub fn conversations(&self) -> &ConversationSynchronizer {
        &self.conversations
    }

    pub fn messages(&self) -> &MessageSynchronizer {
        &self.messages
    }

    pub fn gifs(&self) -> &Arc<dyn GifSearch> {
        &self.gifs
    }
}

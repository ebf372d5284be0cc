//! Live chat: conversation lists, message windows, typing flags and the
//! per-session facade that owns their listeners.

mod conversations;
mod facade;
mod messages;
mod typing;

pub use conversations::ConversationSynchronizer;
pub use facade::ChatFacade;
pub use messages::MessageSynchronizer;
pub use typing::TypingTracker;

use crate::gateways::GatewayError;
use crate::matching::MatchError;
use crate::store::StoreError;
use pawmatch_model::{ConversationId, MessageId, ModelError, UserId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("no authenticated user")]
    Unauthenticated,
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] ModelError),
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),
    #[error("message {0} was sent by the reader")]
    OwnMessage(MessageId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

pub type ChatResult<T> = Result<T, ChatError>;

/// The signed-in user a facade acts for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<UserId>,
}

impl Session {
    pub fn authenticated(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn current_user(&self) -> ChatResult<&UserId> {
        self.user
            .as_ref()
            .filter(|user| !user.as_str().is_empty())
            .ok_or(ChatError::Unauthenticated)
    }
}

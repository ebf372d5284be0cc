//! Match, conversation and message models shared across PawMatch services.

pub mod chat;
pub mod matching;
pub mod profile;

pub use chat::{
    Conversation, ConversationStatus, ConversationSummary, LastMessage, Message, MessageType,
    OutgoingMessage,
};
pub use matching::{seed_greeting, Match, MatchOutcome, MatchStatus, SwipeDecision, SwipeVerdict};
pub use profile::{CounterpartProfile, GifResult, ProfileImages, PLACEHOLDER_AVATAR, UNKNOWN_NAME};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Milliseconds since the Unix epoch, as assigned by the document store.
pub type Timestamp = i64;

/// Wall-clock time in epoch milliseconds.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh random identifier, shaped like a store-assigned document id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identity of a participant. Users and the pets they swipe on share this space.
    UserId
);
string_id!(
    /// Unique identifier of a conversation document.
    ConversationId
);
string_id!(
    /// Unique identifier of a message document.
    MessageId
);
string_id!(
    /// Unique identifier of a match document.
    MatchId
);

/// Validation failures for locally composed records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("message content is empty")]
    EmptyContent,
    #[error("gif messages require a full-resolution gif url")]
    MissingGifUrl,
    #[error("image messages must reference an uploaded url, got {0:?}")]
    InvalidMediaUrl(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

//! Conversations, messages and the summaries shown in a chat list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ConversationId, MessageId, ModelError, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Gif,
}

/// Denormalized copy of the newest message, kept on the conversation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: Vec<UserId>,
    /// Profile the conversation was opened with.
    pub counterpart_ref_id: UserId,
    pub created_at: Timestamp,
    pub last_message_at: Timestamp,
    pub status: ConversationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    /// Ephemeral per-participant typing flags.
    #[serde(default)]
    pub typing: BTreeMap<UserId, bool>,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        user_id: UserId,
        counterpart_id: UserId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            participants: vec![user_id, counterpart_id.clone()],
            counterpart_ref_id: counterpart_id,
            created_at,
            last_message_at: created_at,
            status: ConversationStatus::Active,
            last_message: None,
            typing: BTreeMap::new(),
        }
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    /// The other participant, as seen by `user`.
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        if !self.is_participant(user) {
            return None;
        }
        self.participants.iter().find(|p| *p != user)
    }

    /// Participants whose typing flag is currently raised.
    pub fn typing_users(&self) -> Vec<&UserId> {
        self.typing
            .iter()
            .filter_map(|(user, typing)| typing.then_some(user))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Text body, uploaded image url, or gif preview url.
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    /// Unread from the point of view of `user`: sent by someone else and not yet read.
    pub fn is_unread_for(&self, user: &UserId) -> bool {
        !self.read && &self.sender_id != user
    }
}

/// A validated message draft, ready to be written by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub content: String,
    pub kind: MessageType,
    pub gif_url: Option<String>,
}

impl OutgoingMessage {
    pub fn new(
        conversation_id: ConversationId,
        content: impl Into<String>,
        kind: MessageType,
        gif_url: Option<String>,
    ) -> crate::Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ModelError::EmptyContent);
        }

        let gif_url = match kind {
            MessageType::Gif => match gif_url {
                Some(url) if !url.trim().is_empty() => Some(url),
                _ => return Err(ModelError::MissingGifUrl),
            },
            _ => None,
        };

        if kind == MessageType::Image && !is_remote_url(&content) {
            return Err(ModelError::InvalidMediaUrl(content));
        }

        Ok(Self {
            conversation_id,
            content,
            kind,
            gif_url,
        })
    }

    pub fn text(conversation_id: ConversationId, content: impl Into<String>) -> crate::Result<Self> {
        Self::new(conversation_id, content, MessageType::Text, None)
    }

    /// Summary stored on the conversation once this message is written.
    pub fn summary(&self, timestamp: Timestamp) -> LastMessage {
        LastMessage {
            content: self.content.clone(),
            timestamp,
            kind: self.kind,
        }
    }
}

fn is_remote_url(content: &str) -> bool {
    content.starts_with("https://") || content.starts_with("http://")
}

/// Chat-list row: a conversation joined with the counterpart profile and an unread tally.
/// Derived on every push, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub counterpart_id: UserId,
    pub counterpart_name: String,
    pub counterpart_avatar: String,
    pub last_message: LastMessage,
    pub unread_count: usize,
    #[serde(default)]
    pub typing: BTreeMap<UserId, bool>,
}

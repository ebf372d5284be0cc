//! Conversation bootstrap for a freshly matched pair.

use crate::store::{collections, Fields, StoreResult, WriteOp};
use pawmatch_model::{
    seed_greeting, Conversation, ConversationId, LastMessage, Message, MessageId, MessageType,
    Timestamp, UserId,
};
use serde_json::Value;

/// Affinity added to the counterpart for each match and superlike.
pub(crate) const MATCH_RATE_STEP: f64 = 0.1;

/// The conversation and seed message opened when a pair becomes mutual.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationBootstrap {
    pub conversation: Conversation,
    pub seed: Message,
}

impl ConversationBootstrap {
    pub fn new(
        conversation_id: ConversationId,
        seed_id: MessageId,
        user_id: UserId,
        counterpart_id: UserId,
        counterpart_name: &str,
        now: Timestamp,
    ) -> Self {
        let seed = Message {
            id: seed_id,
            conversation_id: conversation_id.clone(),
            sender_id: counterpart_id.clone(),
            content: seed_greeting(counterpart_name),
            kind: MessageType::Text,
            gif_url: None,
            created_at: now,
            read: false,
        };

        let mut conversation = Conversation::new(conversation_id, user_id, counterpart_id, now);
        conversation.last_message = Some(LastMessage {
            content: seed.content.clone(),
            timestamp: now,
            kind: MessageType::Text,
        });

        Self { conversation, seed }
    }

    /// Writes for one atomic batch: the match record, the conversation, its
    /// seed message, the counterpart's aggregates and the user's last-match marker.
    pub fn into_ops(self, match_write: WriteOp) -> StoreResult<Vec<WriteOp>> {
        let user_id = self.conversation.participants[0].clone();
        let counterpart_id = self.conversation.counterpart_ref_id.clone();

        Ok(vec![
            match_write,
            WriteOp::create(
                collections::CONVERSATIONS,
                self.conversation.id.as_str(),
                Fields::from_record(&self.conversation)?,
            ),
            WriteOp::create(
                collections::MESSAGES,
                self.seed.id.as_str(),
                Fields::from_record(&self.seed)?,
            ),
            WriteOp::update(
                collections::PETS,
                counterpart_id.as_str(),
                Fields::new()
                    .array_union("matches", vec![Value::String(user_id.to_string())])
                    .increment("matchRate", MATCH_RATE_STEP)
                    .server_timestamp("lastActivity"),
            ),
            WriteOp::merge(
                collections::USERS,
                user_id.as_str(),
                Fields::new().server_timestamp("settings.lastMatch"),
            ),
        ])
    }
}

use super::{caller, ApiError};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use pawmatch_model::{
    ConversationId, ConversationSummary, Message, MessageId, MessageType, OutgoingMessage, UserId,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default)]
    pub gif_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub is_typing: bool,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/:id/conversations", get(list_conversations))
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/:id/typing", put(update_typing))
        .route("/messages/:id/read", post(mark_read))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Path(user): Path<UserId>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.conversations().get_conversations(&user).await?))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation): Path<ConversationId>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.messages().get_messages(&conversation).await?))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(conversation): Path<ConversationId>,
    headers: HeaderMap,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let sender = caller(&headers)?;
    let draft = OutgoingMessage::new(conversation, request.content, request.kind, request.gif_url)
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let message = state.messages().send_message(&sender, draft).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(message): Path<MessageId>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let reader = caller(&headers)?;
    state.messages().mark_read_as(&reader, &message).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_typing(
    State(state): State<Arc<AppState>>,
    Path(conversation): Path<ConversationId>,
    headers: HeaderMap,
    Json(request): Json<TypingRequest>,
) -> Result<StatusCode, ApiError> {
    let user = caller(&headers)?;
    state
        .messages()
        .update_typing_status(&conversation, &user, request.is_typing)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub mod chat;
pub mod health;
pub mod media;
pub mod swipes;

use crate::chat::ChatError;
use crate::matching::MatchError;
use crate::state::AppState;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use pawmatch_model::UserId;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-user-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(swipes::routes())
        .merge(chat::routes())
        .merge(media::routes())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or empty x-user-id header")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(message) => {
                error!(%message, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::Unauthenticated => ApiError::Unauthorized,
            MatchError::CounterpartNotFound(_) => ApiError::NotFound(err.to_string()),
            MatchError::SelfSwipe => ApiError::BadRequest(err.to_string()),
            MatchError::Store(store) => ApiError::Internal(store.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Unauthenticated => ApiError::Unauthorized,
            ChatError::InvalidMessage(_) => ApiError::BadRequest(err.to_string()),
            ChatError::ConversationNotFound(_) => ApiError::NotFound(err.to_string()),
            ChatError::OwnMessage(_) => ApiError::Forbidden(err.to_string()),
            ChatError::Store(crate::store::StoreError::NotFound { .. }) => {
                ApiError::NotFound(err.to_string())
            }
            ChatError::Match(inner) => inner.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Caller identity from the request headers.
pub(crate) fn caller(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::from)
        .ok_or(ApiError::Unauthorized)
}

use super::{caller, ApiError};
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{routing::post, Json, Router};
use pawmatch_model::{MatchOutcome, SwipeDecision, SwipeVerdict, UserId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeRequest {
    pub counterpart_id: UserId,
    pub verdict: SwipeVerdict,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/swipes", post(record_swipe))
}

async fn record_swipe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SwipeRequest>,
) -> Result<Json<MatchOutcome>, ApiError> {
    let actor = caller(&headers)?;
    debug!(%actor, counterpart = %request.counterpart_id, verdict = ?request.verdict, "swipe request");
    let outcome = state
        .matches()
        .record_swipe(SwipeDecision::new(actor, request.counterpart_id, request.verdict))
        .await?;
    Ok(Json(outcome))
}

use super::{caller, ApiError};
use crate::chat::{ChatError, Session};
use crate::gateways::MediaBlob;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use pawmatch_model::GifResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct GifParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub page: u32,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media", post(upload))
        .route("/gifs", get(search_gifs))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let user = caller(&headers)?;
    let url = state
        .facade(Session::authenticated(user))
        .upload_image(MediaBlob::new(params.file_name, body.to_vec()))
        .await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}

async fn search_gifs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GifParams>,
) -> Result<Json<Vec<GifResult>>, ApiError> {
    let results = state
        .gifs()
        .search(params.q.trim(), params.page)
        .await
        .map_err(ChatError::from)?;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::gateways::{GatewayError, GatewayResult, GifSearch, MediaBlob, MediaUploader};
    use crate::routes::router;
    use crate::state::AppState;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use pawmatch_model::GifResult;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct EchoUploader;

    #[async_trait]
    impl MediaUploader for EchoUploader {
        async fn upload(&self, blob: MediaBlob) -> GatewayResult<String> {
            if blob.bytes.is_empty() {
                return Err(GatewayError::Upload("empty file".into()));
            }
            Ok(format!("https://cdn.test/{}", blob.file_name))
        }
    }

    struct OneGif;

    #[async_trait]
    impl GifSearch for OneGif {
        async fn search(&self, query: &str, page: u32) -> GatewayResult<Vec<GifResult>> {
            Ok(vec![GifResult {
                id: format!("{query}-{page}"),
                preview_url: "https://g/small.gif".into(),
                full_url: "https://g/full.gif".into(),
            }])
        }
    }

    fn app() -> axum::Router {
        let state = AppState::with_gateways(
            AppConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(EchoUploader),
            Arc::new(OneGif),
        );
        router(state)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_hosted_url() {
        let response = app()
            .oneshot(
                Request::post("/media?fileName=rex.png")
                    .header("x-user-id", "u1")
                    .body(Body::from(vec![1u8, 2, 3]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["url"], "https://cdn.test/rex.png");
    }

    #[tokio::test]
    async fn test_upload_requires_caller() {
        let response = app()
            .oneshot(
                Request::post("/media?fileName=rex.png")
                    .body(Body::from(vec![1u8]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_gif_search_passes_query_and_page() {
        let response = app()
            .oneshot(Request::get("/gifs?q=dog&page=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["id"], "dog-2");
    }
}

//! Outbound gateways the chat layer consumes: image hosting and gif search.

mod cloudinary;
mod debounce;
mod giphy;

pub use cloudinary::CloudinaryUploader;
pub use debounce::DebouncedGifSearch;
pub use giphy::GiphyClient;

use async_trait::async_trait;
use pawmatch_model::GifResult;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway not configured: {0}")]
    Configuration(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("{0}")]
    Upload(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Http(err.to_string())
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Local image picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl MediaBlob {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// `image/<ext>` from the file extension, `image/jpeg` when there is none.
    pub fn mime_type(&self) -> String {
        match Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
        {
            Some(ext) => format!("image/{}", ext.to_ascii_lowercase()),
            None => "image/jpeg".to_string(),
        }
    }
}

/// Turns a local image into a durable url. No retries at this layer.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, blob: MediaBlob) -> GatewayResult<String>;
}

/// Paged gif lookup. An empty query means trending.
#[async_trait]
pub trait GifSearch: Send + Sync {
    async fn search(&self, query: &str, page: u32) -> GatewayResult<Vec<GifResult>>;
}

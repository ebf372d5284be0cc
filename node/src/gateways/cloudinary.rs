use super::{GatewayError, GatewayResult, MediaBlob, MediaUploader};
use crate::config::MediaConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

const UPLOAD_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Unsigned upload to a Cloudinary upload preset.
#[derive(Clone)]
pub struct CloudinaryUploader {
    http: reqwest::Client,
    config: MediaConfig,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CloudinaryUploader {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            base_url: UPLOAD_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> GatewayResult<String> {
        if !self.config.is_complete() {
            return Err(GatewayError::Configuration(
                "cloud name and upload preset are required".to_string(),
            ));
        }
        Ok(format!(
            "{}/{}/image/upload",
            self.base_url.trim_end_matches('/'),
            self.config.cloud_name
        ))
    }
}

/// Message for a rejected upload: the provider's own when it sent one.
fn failure_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| format!("Upload failed with status {status}"))
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, blob: MediaBlob) -> GatewayResult<String> {
        let endpoint = self.endpoint()?;
        let mime = blob.mime_type();
        debug!(file = %blob.file_name, %mime, size = blob.bytes.len(), "uploading image");

        let part = Part::bytes(blob.bytes)
            .file_name(blob.file_name)
            .mime_str(&mime)?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone())
            .text("cloud_name", self.config.cloud_name.clone())
            .text("api_key", self.config.api_key.clone());

        let response = self.http.post(&endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = failure_message(status.as_u16(), &body);
            warn!(status = status.as_u16(), %message, "image upload rejected");
            return Err(GatewayError::Upload(message));
        }

        let uploaded: UploadResponse = response.json().await?;
        Ok(uploaded.secure_url)
    }
}

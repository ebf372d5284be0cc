use super::{GatewayError, GatewayResult, GifSearch};
use crate::config::GifConfig;
use async_trait::async_trait;
use pawmatch_model::GifResult;
use serde::Deserialize;
use tracing::debug;

#[derive(Clone)]
pub struct GiphyClient {
    http: reqwest::Client,
    config: GifConfig,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<GifItem>,
}

#[derive(Debug, Deserialize)]
struct GifItem {
    id: String,
    images: Renditions,
}

#[derive(Debug, Deserialize)]
struct Renditions {
    fixed_height_small: Option<Rendition>,
    fixed_height: Option<Rendition>,
    original: Option<Rendition>,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    url: String,
}

impl GifItem {
    fn into_result(self) -> Option<GifResult> {
        let Renditions {
            fixed_height_small,
            fixed_height,
            original,
        } = self.images;
        let full = original?.url;
        let preview = fixed_height_small
            .or(fixed_height)
            .map_or_else(|| full.clone(), |r| r.url);
        Some(GifResult {
            id: self.id,
            preview_url: preview,
            full_url: full,
        })
    }
}

fn parse_results(body: SearchResponse) -> Vec<GifResult> {
    body.data.into_iter().filter_map(GifItem::into_result).collect()
}

impl GiphyClient {
    pub fn new(config: GifConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn request(&self, query: &str, page: u32) -> (String, Vec<(&'static str, String)>) {
        let base = self.config.base_url.trim_end_matches('/');
        let offset = page as usize * self.config.page_size;
        let mut params = vec![
            ("api_key", self.config.api_key.clone()),
            ("limit", self.config.page_size.to_string()),
            ("offset", offset.to_string()),
            ("rating", self.config.rating.clone()),
        ];
        let query = query.trim();
        if query.is_empty() {
            (format!("{base}/trending"), params)
        } else {
            params.push(("q", query.to_string()));
            (format!("{base}/search"), params)
        }
    }
}

#[async_trait]
impl GifSearch for GiphyClient {
    async fn search(&self, query: &str, page: u32) -> GatewayResult<Vec<GifResult>> {
        if self.config.api_key.is_empty() {
            return Err(GatewayError::Configuration("gif api key is missing".into()));
        }
        let (url, params) = self.request(query, page);
        debug!(%url, page, "gif search");

        let response = self.http.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Http(format!("gif search returned {status}")));
        }
        Ok(parse_results(response.json().await?))
    }
}

use crate::subscriptions::BackoffPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Runtime configuration for the node service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub build_id: String,
    /// Where the document store persists. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub chat: ChatConfig,
    pub media: MediaConfig,
    pub gifs: GifConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let build_id =
            env::var("PAWMATCH_BUILD_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
        let data_dir = env::var("PAWMATCH_DATA_DIR").ok().map(PathBuf::from);

        let mut chat = ChatConfig::default();
        if let Some(window) = env::var("PAWMATCH_MESSAGE_WINDOW")
            .ok()
            .and_then(|w| w.parse().ok())
        {
            chat = chat.with_message_window(window);
        }

        Ok(Self {
            host,
            port,
            build_id,
            data_dir,
            chat,
            media: MediaConfig {
                cloud_name: env::var("CLOUDINARY_CLOUD_NAME").unwrap_or_default(),
                api_key: env::var("CLOUDINARY_API_KEY").unwrap_or_default(),
                upload_preset: env::var("CLOUDINARY_UPLOAD_PRESET").unwrap_or_default(),
            },
            gifs: GifConfig {
                api_key: env::var("GIPHY_API_KEY").unwrap_or_default(),
                ..GifConfig::default()
            },
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            build_id: "dev".to_string(),
            data_dir: None,
            chat: ChatConfig::default(),
            media: MediaConfig::default(),
            gifs: GifConfig::default(),
        }
    }
}

/// Tuning for the synchronizers and the chat facade.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Most recent messages kept in a live window.
    pub message_window: usize,
    /// Quiet period before a gif query is issued.
    pub gif_debounce: Duration,
    /// Keystroke inactivity after which a raised typing flag is cleared.
    pub typing_idle: Duration,
    pub backoff: BackoffPolicy,
}

impl ChatConfig {
    pub fn with_message_window(mut self, window: usize) -> Self {
        self.message_window = window.max(1);
        self
    }

    pub fn with_gif_debounce(mut self, debounce: Duration) -> Self {
        self.gif_debounce = debounce;
        self
    }

    pub fn with_typing_idle(mut self, idle: Duration) -> Self {
        self.typing_idle = idle;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            message_window: 50,
            gif_debounce: Duration::from_millis(500),
            typing_idle: Duration::from_secs(3),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Credentials for the image hosting provider.
#[derive(Debug, Clone, Default)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub upload_preset: String,
}

impl MediaConfig {
    pub fn is_complete(&self) -> bool {
        !self.cloud_name.is_empty() && !self.upload_preset.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GifConfig {
    pub api_key: String,
    pub base_url: String,
    pub page_size: usize,
    pub rating: String,
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.giphy.com/v1/gifs".to_string(),
            page_size: 20,
            rating: "g".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.message_window, 50);
        assert_eq!(config.gif_debounce, Duration::from_millis(500));
        assert_eq!(config.with_message_window(0).message_window, 1);
    }

    #[test]
    fn test_media_config_completeness() {
        let mut media = MediaConfig::default();
        assert!(!media.is_complete());
        media.cloud_name = "demo".into();
        media.upload_preset = "unsigned".into();
        assert!(media.is_complete());
    }
}

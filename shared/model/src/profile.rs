//! Counterpart profiles and gif search results.

use serde::{Deserialize, Serialize};

pub const UNKNOWN_NAME: &str = "Unknown";
pub const PLACEHOLDER_AVATAR: &str = "/placeholder.png";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileImages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
}

/// Public face of a swipeable identity, as stored in the profile collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub images: ProfileImages,
}

impl CounterpartProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            UNKNOWN_NAME
        } else {
            &self.name
        }
    }

    pub fn avatar_url(&self) -> &str {
        self.images
            .main
            .as_deref()
            .or(self.avatar.as_deref())
            .filter(|url| !url.is_empty())
            .unwrap_or(PLACEHOLDER_AVATAR)
    }
}

/// One animated-image candidate from the gif gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GifResult {
    pub id: String,
    pub preview_url: String,
    pub full_url: String,
}

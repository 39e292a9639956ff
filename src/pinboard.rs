use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SinkError;
use crate::http::{HttpRequest, HttpTransport};
use crate::model::Article;

pub const DEFAULT_BASE_URL: &str = "https://api.pinboard.in/v1";
/// Pinboard asks clients to make at most one call every three seconds.
pub const MIN_PUBLISH_INTERVAL: Duration = Duration::from_secs(3);

const MAX_DESCRIPTION_CHARS: usize = 255;
const MAX_EXTENDED_CHARS: usize = 65536;

/// A bookmark in the shape `posts/add` expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub url: String,
    pub description: String,
    pub extended: String,
    pub tags: Vec<String>,
}

impl Bookmark {
    pub fn from_article(article: &Article) -> Self {
        let url = article.source_url.trim().to_string();
        let title = article.title.trim();
        let description = if title.is_empty() { url.as_str() } else { title };

        let mut tags: Vec<String> = article
            .tag_names()
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join("_"))
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();

        Bookmark {
            description: truncate_chars(description, MAX_DESCRIPTION_CHARS),
            extended: truncate_chars(&article.summary, MAX_EXTENDED_CHARS),
            url,
            tags,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[async_trait]
pub trait BookmarkSink: Send + Sync {
    async fn publish(&self, bookmark: &Bookmark) -> Result<(), SinkError>;
}

#[derive(Debug, Deserialize)]
struct ResultCode {
    result_code: String,
}

pub struct PinboardClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    auth_token: String,
}

impl PinboardClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str, auth_token: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    fn add_url(&self, bookmark: &Bookmark) -> String {
        let tags = bookmark.tags.join(" ");
        let params = [
            ("url", bookmark.url.as_str()),
            ("description", bookmark.description.as_str()),
            ("extended", bookmark.extended.as_str()),
            ("tags", tags.as_str()),
            ("auth_token", self.auth_token.as_str()),
            ("format", "json"),
        ];
        let query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        format!("{}/posts/add?{}", self.base_url, query.join("&"))
    }
}

#[async_trait]
impl BookmarkSink for PinboardClient {
    async fn publish(&self, bookmark: &Bookmark) -> Result<(), SinkError> {
        let response = self.transport.send(HttpRequest::get(self.add_url(bookmark))).await?;

        match response.status {
            429 | 500..=599 => return Err(SinkError::Unavailable { status: response.status }),
            401 | 403 => return Err(SinkError::Unauthorized { status: response.status }),
            _ if !response.is_success() => {
                return Err(SinkError::Rejected(format!(
                    "status {}: {}",
                    response.status,
                    response.body_snippet()
                )));
            }
            _ => {}
        }

        let result: ResultCode = serde_json::from_slice(&response.body).map_err(|e| {
            SinkError::Rejected(format!("unreadable response: {}", e))
        })?;
        if result.result_code != "done" {
            return Err(SinkError::Rejected(result.result_code));
        }
        Ok(())
    }
}

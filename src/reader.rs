//! Readwise Reader document list client.
//!
//! The list endpoint is cursor paginated: each response carries a
//! `nextPageCursor` that is echoed back as `pageCursor` until the server
//! stops returning one. All pages of a call are buffered before returning.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::checkpoint::Checkpoint;
use crate::error::SourceError;
use crate::http::{HttpRequest, HttpTransport};
use crate::model::{Article, ListPage};

pub const DEFAULT_BASE_URL: &str = "https://readwise.io/api/v3/list/";
pub const DEFAULT_MAX_PAGES: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    New,
    Later,
    Shortlist,
    Archive,
    Feed,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::New => "new",
            Location::Later => "later",
            Location::Shortlist => "shortlist",
            Location::Archive => "archive",
            Location::Feed => "feed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub updated_after: Option<Checkpoint>,
    pub location: Option<Location>,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_all(&self, query: &ListQuery) -> Result<Vec<Article>, SourceError>;
}

pub struct ReaderClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
    max_pages: u32,
}

impl ReaderClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: &str,
        token: &str,
        max_pages: u32,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.to_string(),
            token: token.to_string(),
            max_pages,
        }
    }

    fn page_url(&self, query: &ListQuery, cursor: Option<&str>) -> String {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(cursor) = cursor {
            params.push(("pageCursor", cursor));
        }
        if let Some(after) = query.updated_after.as_ref().filter(|c| !c.is_blank()) {
            params.push(("updatedAfter", after.as_str()));
        }
        if let Some(location) = query.location {
            params.push(("location", location.as_str()));
        }

        if params.is_empty() {
            return self.base_url.clone();
        }
        let encoded: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.base_url, sep, encoded.join("&"))
    }

    async fn fetch_page(&self, url: String) -> Result<ListPage, SourceError> {
        let request = HttpRequest::get(url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json");
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(SourceError::Api {
                status: response.status,
                message: response.body_snippet(),
            });
        }
        Ok(serde_json::from_slice(&response.body)?)
    }
}

#[async_trait]
impl DocumentSource for ReaderClient {
    async fn fetch_all(&self, query: &ListQuery) -> Result<Vec<Article>, SourceError> {
        let mut articles = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            if pages >= self.max_pages {
                return Err(SourceError::PaginationLimitExceeded { pages });
            }
            pages += 1;

            tracing::info!(
                page = pages,
                cursor = cursor.as_deref().unwrap_or(""),
                updated_after = query.updated_after.as_ref().map(|c| c.as_str()).unwrap_or(""),
                location = query.location.map(|l| l.as_str()).unwrap_or(""),
                "requesting reader document list"
            );
            let page = self.fetch_page(self.page_url(query, cursor.as_deref())).await?;
            articles.extend(page.results);

            match page.next_page_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(pages, documents = articles.len(), "reader fetch complete");
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport};

    const BASE: &str = "https://readwise.test/api/v3/list/";

    fn client(transport: &MockTransport, max_pages: u32) -> ReaderClient {
        ReaderClient::new(Arc::new(transport.clone()), BASE, "secret", max_pages)
    }

    fn page(ids: &[&str], next: Option<&str>) -> String {
        let results: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "source_url": format!("https://example.com/{}", id),
                    "title": id,
                    "summary": "",
                    "tags": {}
                })
            })
            .collect();
        serde_json::json!({ "results": results, "nextPageCursor": next }).to_string()
    }

    #[tokio::test]
    async fn follows_cursor_until_exhausted() {
        let transport = MockTransport::new();
        transport.push(200, &page(&["a", "b"], Some("c1")));
        transport.push(200, &page(&["c"], Some("c2")));
        transport.push(200, &page(&["d"], None));

        let articles = client(&transport, 10)
            .fetch_all(&ListQuery::default())
            .await
            .expect("fetch");

        let ids: Vec<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, BASE);
        assert_eq!(requests[1].url, format!("{}?pageCursor=c1", BASE));
        assert_eq!(requests[2].url, format!("{}?pageCursor=c2", BASE));
        assert!(requests.iter().all(|r| r.method == HttpMethod::Get));
        assert!(requests.iter().all(|r| r
            .headers
            .contains(&("Authorization".to_string(), "Token secret".to_string()))));
    }

    #[tokio::test]
    async fn empty_cursor_ends_pagination() {
        let transport = MockTransport::new();
        transport.push(200, &page(&["a"], Some("")));

        let articles = client(&transport, 10)
            .fetch_all(&ListQuery::default())
            .await
            .expect("fetch");
        assert_eq!(articles.len(), 1);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn sends_filters_on_every_page() {
        let transport = MockTransport::new();
        transport.push(200, &page(&["a"], Some("next")));
        transport.push(200, &page(&[], None));

        let query = ListQuery {
            updated_after: Some(Checkpoint::new("2024-01-01T00:00:00Z")),
            location: Some(Location::Archive),
        };
        client(&transport, 10).fetch_all(&query).await.expect("fetch");

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                format!("{}?updatedAfter=2024-01-01T00%3A00%3A00Z&location=archive", BASE),
                format!(
                    "{}?pageCursor=next&updatedAfter=2024-01-01T00%3A00%3A00Z&location=archive",
                    BASE
                ),
            ]
        );
    }

    #[tokio::test]
    async fn blank_checkpoint_is_not_sent() {
        let transport = MockTransport::new();
        transport.push(200, &page(&[], None));

        let query = ListQuery {
            updated_after: Some(Checkpoint::new("")),
            location: Some(Location::Archive),
        };
        client(&transport, 10).fetch_all(&query).await.expect("fetch");
        assert_eq!(transport.requests()[0].url, format!("{}?location=archive", BASE));
    }

    #[tokio::test]
    async fn stops_at_page_limit() {
        let transport = MockTransport::new();
        for i in 0..3 {
            transport.push(200, &page(&["x"], Some(&format!("cursor-{}", i))));
        }

        let err = client(&transport, 3)
            .fetch_all(&ListQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::PaginationLimitExceeded { pages: 3 }));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn malformed_body_is_protocol_error() {
        let transport = MockTransport::new();
        transport.push(200, r#"{"detail": "ok but no results"}"#);

        let err = client(&transport, 10)
            .fetch_all(&ListQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Protocol(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_unavailable() {
        let transport = MockTransport::new();
        transport.push(200, &page(&["a"], Some("c1")));
        transport.push_transport_error("connection refused");

        let err = client(&transport, 10)
            .fetch_all(&ListQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[tokio::test]
    async fn error_status_is_api_error() {
        let transport = MockTransport::new();
        transport.push(401, r#"{"detail": "Invalid token."}"#);

        let err = client(&transport, 10)
            .fetch_all(&ListQuery::default())
            .await
            .unwrap_err();
        match err {
            SourceError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("Invalid token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

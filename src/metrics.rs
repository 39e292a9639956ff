use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::http::{HttpError, HttpRequest, HttpTransport};

pub const DEFAULT_FIELD: &str = "value";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("webhook unreachable: {0}")]
    Transport(#[from] HttpError),
}

#[async_trait]
pub trait MetricsReporter: Send + Sync {
    /// Reports how many documents a run read. Returns the webhook's status.
    async fn report(&self, read_count: usize) -> Result<u16, MetricsError>;
}

pub struct WebhookReporter {
    transport: Arc<dyn HttpTransport>,
    url: String,
    field: String,
}

impl WebhookReporter {
    pub fn new(transport: Arc<dyn HttpTransport>, url: &str, field: &str) -> Self {
        Self {
            transport,
            url: url.to_string(),
            field: field.to_string(),
        }
    }
}

#[async_trait]
impl MetricsReporter for WebhookReporter {
    async fn report(&self, read_count: usize) -> Result<u16, MetricsError> {
        let body = format!("{}={}", urlencoding::encode(&self.field), read_count);
        let request = HttpRequest::post(&self.url, body.into_bytes())
            .header("Content-Type", "application/x-www-form-urlencoded");

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            tracing::warn!(
                status = response.status,
                body = %response.body_snippet(),
                "metrics webhook returned an error status"
            );
        }
        Ok(response.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, MockTransport};

    #[tokio::test]
    async fn posts_count_as_form_field() {
        let transport = MockTransport::new();
        transport.push(200, "ok");

        let reporter = WebhookReporter::new(
            Arc::new(transport.clone()),
            "https://hooks.test/read",
            DEFAULT_FIELD,
        );
        assert_eq!(reporter.report(7).await.unwrap(), 200);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "https://hooks.test/read");
        assert_eq!(requests[0].body, b"value=7".to_vec());
        assert!(requests[0].headers.contains(&(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string()
        )));
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let transport = MockTransport::new();
        transport.push(502, "bad gateway");
        let reporter = WebhookReporter::new(Arc::new(transport), "https://hooks.test/read", "n");
        assert_eq!(reporter.report(1).await.unwrap(), 502);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let transport = MockTransport::new();
        transport.push_transport_error("dns");
        let reporter = WebhookReporter::new(Arc::new(transport), "https://hooks.test/read", "n");
        assert!(matches!(
            reporter.report(1).await,
            Err(MetricsError::Transport(_))
        ));
    }
}

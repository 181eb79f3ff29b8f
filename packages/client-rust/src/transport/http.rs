//! REST backend over `reqwest`.

use std::time::Instant;

use async_trait::async_trait;
use backoffice_core::{ErrorPayload, ListEnvelope, ListRequest};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{info_span, warn, Instrument};

use super::Backend;
use crate::config::ClientConfig;
use crate::error::FetchError;

/// JSON-over-HTTP backend rooted at a base URL.
#[derive(Debug, Clone)]
pub struct RestBackend {
    http: Client,
    base_url: String,
}

impl RestBackend {
    /// Builds the HTTP client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(http, &config.base_url))
    }

    #[must_use]
    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Sends `builder` inside an `http` span that records status and duration.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        method: &Method,
        endpoint: &str,
    ) -> Result<T, FetchError> {
        let span = info_span!(
            "http",
            method = %method,
            endpoint,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = match builder.send().await {
                Ok(response) => decode(response).await,
                Err(e) => Err(FetchError::from(e)),
            };

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let span = tracing::Span::current();
            span.record("duration_ms", duration_ms);
            match &result {
                Ok(_) => {
                    span.record("status", "ok");
                    tracing::debug!(duration_ms, "request complete");
                }
                Err(e) => {
                    span.record("status", "error");
                    warn!(duration_ms, error = %e, "request failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Maps a response to `T`, or to a [`FetchError::Server`] carrying the
/// server's message for non-success statuses.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FetchError> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorPayload>(&body)
            .ok()
            .and_then(|payload| payload.message().map(str::to_string));
        return Err(FetchError::Server {
            status: status.as_u16(),
            message,
        });
    }

    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &body
    };
    serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[async_trait]
impl Backend for RestBackend {
    async fn fetch_list(
        &self,
        endpoint: &str,
        request: &ListRequest,
    ) -> Result<ListEnvelope, FetchError> {
        request.validate()?;
        let builder = self.http.get(self.url(endpoint)).query(&request.query_pairs());
        self.send(builder, &Method::GET, endpoint).await
    }

    async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, FetchError> {
        let mut builder = self.http.request(method.clone(), self.url(endpoint));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(builder, &method, endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use backoffice_core::ValidationError;

    use super::*;

    fn backend() -> RestBackend {
        // Nothing listens here; tests below never reach the network.
        RestBackend::with_client(Client::new(), "http://127.0.0.1:9/api/")
    }

    #[test]
    fn joins_endpoint_onto_base_url() {
        let backend = backend();
        assert_eq!(backend.base_url(), "http://127.0.0.1:9/api");
        assert_eq!(backend.url("/deposits"), "http://127.0.0.1:9/api/deposits");
        assert_eq!(backend.url("users/list"), "http://127.0.0.1:9/api/users/list");
    }

    #[tokio::test]
    async fn invalid_request_is_never_sent() {
        let err = backend()
            .fetch_list("deposits", &ListRequest::offset(0, 25))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Validation(ValidationError::ZeroPage));
    }
}

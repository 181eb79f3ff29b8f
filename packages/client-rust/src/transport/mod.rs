//! Backend seam: how list queries and mutations reach the server.

pub mod http;
#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;
use backoffice_core::{ListEnvelope, ListRequest};
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::error::FetchError;

pub use http::RestBackend;

/// Remote data source for collections and mutations.
///
/// Used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs a list query against `endpoint`.
    ///
    /// Implementations must validate `request` and refuse to send it when
    /// validation fails.
    async fn fetch_list(
        &self,
        endpoint: &str,
        request: &ListRequest,
    ) -> Result<ListEnvelope, FetchError>;

    /// Sends a state-changing request and returns the decoded response body
    /// (`Null` when the server sent none).
    async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, FetchError>;
}

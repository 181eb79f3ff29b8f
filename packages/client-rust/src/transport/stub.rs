//! Scripted backend for unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use backoffice_core::{ListEnvelope, ListRequest};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value as JsonValue;

use super::Backend;
use crate::error::FetchError;

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    List { endpoint: String, request: ListRequest },
    Mutate { method: Method, endpoint: String, body: Option<JsonValue> },
}

/// One scripted reply, optionally delayed so tests can make replies overlap.
pub(crate) struct Reply<T> {
    pub delay: Duration,
    pub result: Result<T, FetchError>,
}

impl<T> Reply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    pub fn err(error: FetchError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Answers calls from queues in the order they were pushed.
///
/// Lists fall back to an empty envelope and mutations to `Null` once their
/// queue runs dry.
#[derive(Default)]
pub(crate) struct StubBackend {
    lists: Mutex<VecDeque<Reply<ListEnvelope>>>,
    mutations: Mutex<VecDeque<Reply<JsonValue>>>,
    calls: Mutex<Vec<Call>>,
}

impl StubBackend {
    pub fn push_list(&self, reply: Reply<ListEnvelope>) {
        self.lists.lock().push_back(reply);
    }

    pub fn push_mutation(&self, reply: Reply<JsonValue>) {
        self.mutations.lock().push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::List { .. }))
            .count()
    }
}

/// Envelope holding `ids` as `{"id": ..}` rows.
pub(crate) fn envelope(ids: &[&str]) -> ListEnvelope {
    ListEnvelope {
        items: ids.iter().map(|id| serde_json::json!({ "id": id })).collect(),
        ..ListEnvelope::default()
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn fetch_list(
        &self,
        endpoint: &str,
        request: &ListRequest,
    ) -> Result<ListEnvelope, FetchError> {
        request.validate()?;
        self.calls.lock().push(Call::List {
            endpoint: endpoint.to_string(),
            request: request.clone(),
        });
        let reply = self.lists.lock().pop_front();
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                reply.result
            }
            None => Ok(ListEnvelope::default()),
        }
    }

    async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, FetchError> {
        self.calls.lock().push(Call::Mutate {
            method,
            endpoint: endpoint.to_string(),
            body: body.cloned(),
        });
        let reply = self.mutations.lock().pop_front();
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                reply.result
            }
            None => Ok(JsonValue::Null),
        }
    }
}

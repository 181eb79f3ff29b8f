//! State-changing requests and the invalidation that follows them.
//!
//! A [`Mutation`] names the request to send and the query keys it makes
//! stale. [`MutationRunner`] sends it, invalidates those keys only after a
//! success, and refuses new submissions while one is still running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use backoffice_core::{QueryKey, ValidationError};
use futures_util::future::join_all;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::confirm::{Confirmed, Prepared};
use crate::error::{FetchError, MutationError};
use crate::invalidation::InvalidationTarget;
use crate::transport::Backend;

/// What a mutation does, which decides whether it needs confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    StatusChange,
}

impl MutationKind {
    /// Destructive and state-changing actions must be confirmed first.
    #[must_use]
    pub fn requires_confirmation(self) -> bool {
        !matches!(self, Self::Create | Self::Update)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::StatusChange => "status_change",
        }
    }
}

/// One request to the backend plus the keys it invalidates on success.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub method: Method,
    pub endpoint: String,
    pub body: Option<JsonValue>,
    pub invalidates: Vec<QueryKey>,
}

impl Mutation {
    fn new(kind: MutationKind, method: Method, endpoint: impl Into<String>, body: Option<JsonValue>) -> Self {
        Self {
            kind,
            method,
            endpoint: endpoint.into(),
            body,
            invalidates: Vec::new(),
        }
    }

    #[must_use]
    pub fn create(endpoint: impl Into<String>, body: JsonValue) -> Self {
        Self::new(MutationKind::Create, Method::POST, endpoint, Some(body))
    }

    #[must_use]
    pub fn update(endpoint: impl Into<String>, body: JsonValue) -> Self {
        Self::new(MutationKind::Update, Method::PUT, endpoint, Some(body))
    }

    /// Deletes by id. The body is always `{"ids": [...]}`, even for one id.
    #[must_use]
    pub fn delete<I, S>(endpoint: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        Self::new(MutationKind::Delete, Method::DELETE, endpoint, Some(json!({ "ids": ids })))
    }

    #[must_use]
    pub fn approve(endpoint: impl Into<String>) -> Self {
        Self::new(MutationKind::Approve, Method::POST, endpoint, None)
    }

    #[must_use]
    pub fn reject(endpoint: impl Into<String>, reason: Option<String>) -> Self {
        let body = reason.map(|reason| json!({ "reason": reason }));
        Self::new(MutationKind::Reject, Method::POST, endpoint, body)
    }

    #[must_use]
    pub fn status_change(endpoint: impl Into<String>, status: impl Into<String>) -> Self {
        let status: String = status.into();
        Self::new(
            MutationKind::StatusChange,
            Method::PATCH,
            endpoint,
            Some(json!({ "status": status })),
        )
    }

    /// Adds a key (or key prefix) to invalidate after success.
    #[must_use]
    pub fn invalidating(mut self, key: QueryKey) -> Self {
        self.invalidates.push(key);
        self
    }

    /// Checks the body before it is sent.
    ///
    /// # Errors
    ///
    /// A delete without ids, or a status change with a blank status, is
    /// reported as [`ValidationError::MissingField`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        let body = self.body.as_ref();
        match self.kind {
            MutationKind::Delete => {
                let empty = body
                    .and_then(|b| b.get("ids"))
                    .and_then(JsonValue::as_array)
                    .map_or(true, Vec::is_empty);
                if empty {
                    return Err(ValidationError::MissingField { field: "ids".into() });
                }
            }
            MutationKind::StatusChange => {
                let blank = body
                    .and_then(|b| b.get("status"))
                    .and_then(JsonValue::as_str)
                    .map_or(true, |s| s.trim().is_empty());
                if blank {
                    return Err(ValidationError::MissingField {
                        field: "status".into(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        match self.kind {
            MutationKind::Delete => {
                let count = self
                    .body
                    .as_ref()
                    .and_then(|b| b.get("ids"))
                    .and_then(JsonValue::as_array)
                    .map_or(0, Vec::len);
                format!("Delete {count} item(s)?")
            }
            kind => format!("Confirm {} on {}?", kind.as_str(), self.endpoint),
        }
    }
}

/// Result of a batch: one entry per call, in submission order.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<Result<JsonValue, FetchError>>,
}

impl BatchOutcome {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }

    /// Some calls succeeded and some failed.
    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        self.failed() > 0 && self.succeeded() > 0
    }

    /// `(index, error)` for each failed call.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &FetchError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }
}

/// Marks the runner busy for as long as it lives.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, MutationError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MutationError::InFlight)?;
        Ok(Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn record_outcome(kind: MutationKind, outcome: &'static str) {
    metrics::counter!("backoffice_mutations_total", "kind" => kind.as_str(), "outcome" => outcome)
        .increment(1);
}

/// Sends mutations for one form or action bar.
pub struct MutationRunner {
    backend: Arc<dyn Backend>,
    invalidation: Arc<dyn InvalidationTarget>,
    in_flight: AtomicBool,
}

impl MutationRunner {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, invalidation: Arc<dyn InvalidationTarget>) -> Self {
        Self {
            backend,
            invalidation,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a submission is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Gates `mutation` behind a confirmation when its kind requires one.
    pub fn prepare(mutation: Mutation) -> Prepared<Mutation> {
        let gated = mutation.kind.requires_confirmation();
        Prepared::gate(mutation, gated, Mutation::prompt)
    }

    /// Gates a batch when any of its calls requires confirmation.
    pub fn prepare_batch(mutations: Vec<Mutation>) -> Prepared<Vec<Mutation>> {
        let gated = mutations.iter().any(|m| m.kind.requires_confirmation());
        Prepared::gate(mutations, gated, |batch| {
            format!("Apply this action to {} item(s)?", batch.len())
        })
    }

    fn invalidate_all<'a>(&self, keys: impl IntoIterator<Item = &'a QueryKey>) {
        for key in keys {
            self.invalidation.invalidate(key);
        }
    }

    /// Sends one mutation and invalidates its keys on success.
    ///
    /// # Errors
    ///
    /// [`MutationError::InFlight`] while another submission runs (nothing is
    /// sent), otherwise the backend's error. Nothing is invalidated on failure.
    pub async fn execute(&self, mutation: Confirmed<Mutation>) -> Result<JsonValue, MutationError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let mutation = mutation.into_inner();
        mutation.validate().map_err(FetchError::from)?;

        let result = self
            .backend
            .mutate(mutation.method.clone(), &mutation.endpoint, mutation.body.as_ref())
            .await;

        match result {
            Ok(body) => {
                self.invalidate_all(&mutation.invalidates);
                info!(kind = mutation.kind.as_str(), endpoint = %mutation.endpoint, "mutation succeeded");
                record_outcome(mutation.kind, "success");
                Ok(body)
            }
            Err(e) => {
                warn!(kind = mutation.kind.as_str(), endpoint = %mutation.endpoint, error = %e, "mutation failed");
                record_outcome(mutation.kind, "failure");
                Err(e.into())
            }
        }
    }

    /// Sends every call concurrently, waits for all of them, and reports each
    /// result. Keys are invalidated only when every call succeeded.
    ///
    /// # Errors
    ///
    /// Only [`MutationError::InFlight`]; per-call failures are in the outcome.
    pub async fn execute_batch(
        &self,
        batch: Confirmed<Vec<Mutation>>,
    ) -> Result<BatchOutcome, MutationError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let batch = batch.into_inner();

        let calls = batch.iter().map(|m| async move {
            m.validate()?;
            self.backend
                .mutate(m.method.clone(), &m.endpoint, m.body.as_ref())
                .await
        });
        let outcome = BatchOutcome {
            results: join_all(calls).await,
        };

        for (m, result) in batch.iter().zip(&outcome.results) {
            record_outcome(m.kind, if result.is_ok() { "success" } else { "failure" });
        }

        if outcome.is_complete_success() {
            self.invalidate_all(batch.iter().flat_map(|m| &m.invalidates));
            info!(calls = batch.len(), "batch succeeded");
        } else {
            warn!(
                calls = batch.len(),
                failed = outcome.failed(),
                "batch finished with failures; nothing invalidated"
            );
        }
        Ok(outcome)
    }
}

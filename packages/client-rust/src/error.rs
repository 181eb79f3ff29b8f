//! Error types for fetches, mutations, pagination, and layout storage.

use backoffice_core::ValidationError;

/// Message shown when no server-provided text is available.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Errors from loading data.
///
/// `Clone` so that every caller coalesced onto one in-flight load receives the
/// same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server {
        status: u16,
        message: Option<String>,
    },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("request was abandoned before it settled")]
    Cancelled,
}

impl FetchError {
    /// Text to show the user: the server's message verbatim when present,
    /// the validation problem for rejected input, otherwise a generic fallback.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Server {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Validation(e) => e.to_string(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Errors from running a mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("another submission is still in flight")]
    InFlight,
    #[error(transparent)]
    Failed(#[from] FetchError),
}

impl MutationError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InFlight => self.to_string(),
            Self::Failed(e) => e.user_message(),
        }
    }
}

/// Navigation requests that fall outside the valid page window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    #[error("page numbers start at 1")]
    ZeroPage,
    #[error("page {page} is past the last page ({total_pages})")]
    PageOutOfRange { page: u32, total_pages: u32 },
    #[error("page size {size} is not one of the offered sizes")]
    PageSizeNotAllowed { size: u32 },
}

/// Errors from loading or persisting a column layout.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("layout storage failed: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("saved layout `{key}` is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

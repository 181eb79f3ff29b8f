//! Client configuration types.

use std::time::Duration;

/// Top-level configuration for a backoffice client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is joined onto.
    pub base_url: String,
    /// Maximum time to wait for one HTTP request to complete.
    pub request_timeout: Duration,
    /// Query cache settings.
    pub cache: CacheConfig,
    /// Offset pagination settings shared by paged grids.
    pub pagination: PaginationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout: Duration::from_secs(30),
            cache: CacheConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

/// Query cache timing.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which a successful entry is refetched on next use.
    pub stale_time: Duration,
    /// Idle time after which an unsubscribed entry is evicted.
    pub gc_time: Duration,
    /// How often the background sweep runs.
    pub gc_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(60),
            gc_time: Duration::from_secs(300),
            gc_interval: Duration::from_secs(60),
        }
    }
}

/// Page-size options offered by paged grids.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub page_size_options: Vec<u32>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            page_size_options: vec![10, 25, 50, 100],
        }
    }
}

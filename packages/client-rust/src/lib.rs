//! Backoffice client: query cache, paginated collections, layout persistence,
//! gated mutations, and export over a REST backend.

pub mod cache;
pub mod collection;
pub mod config;
pub mod confirm;
pub mod cursor;
pub mod error;
pub mod export;
pub mod invalidation;
pub mod layout;
pub mod mutation;
pub mod offset;
pub mod transport;
pub mod worker;

pub use cache::{CacheSweeper, QueryCache, QueryEntry, QueryStatus, QuerySubscription};
pub use collection::{
    CollectionSource, CollectionView, InfiniteCollection, PagedCollection, RefreshOutcome,
    RequestSequencer,
};
pub use config::{CacheConfig, ClientConfig, PaginationConfig};
pub use confirm::{Confirmation, Confirmed, Prepared};
pub use cursor::{CursorAccumulator, LoadOutcome};
pub use error::{FetchError, LayoutError, MutationError, PaginationError};
pub use export::{export, ExportDocument};
pub use invalidation::{CompositeInvalidation, InvalidationTarget};
pub use layout::{FileLayoutStorage, LayoutController, LayoutStorage, MemoryLayoutStorage};
pub use mutation::{BatchOutcome, Mutation, MutationKind, MutationRunner};
pub use offset::OffsetPagination;
pub use transport::{Backend, RestBackend};
pub use worker::{BackgroundRunnable, BackgroundWorker};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}

//! List views bound to the query cache and the backend.
//!
//! [`PagedCollection`] drives an offset-paginated grid through the shared
//! [`QueryCache`]. [`InfiniteCollection`] drives a cursor-paginated list through
//! a [`CursorAccumulator`]. Both stop applying results once unmounted, and
//! both ignore responses that belong to a request that is no longer current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use backoffice_core::{
    ColumnLayoutState, CursorToken, GridDefinition, ListEnvelope, ListRequest, Paging, QueryKey,
    Tiebreaker,
};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::config::PaginationConfig;
use crate::cursor::{CursorAccumulator, LoadOutcome};
use crate::error::{FetchError, PaginationError};
use crate::invalidation::InvalidationTarget;
use crate::offset::OffsetPagination;
use crate::transport::Backend;

/// Where a collection's rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSource {
    /// First part of every cache key for this list, e.g. `deposits`.
    pub entity: String,
    /// Endpoint path relative to the backend base URL.
    pub endpoint: String,
    /// Cursor tiebreakers the list endpoint expects.
    pub tiebreakers: Vec<Tiebreaker>,
}

impl CollectionSource {
    #[must_use]
    pub fn new(entity: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            endpoint: endpoint.into(),
            tiebreakers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tiebreaker(mut self, param: impl Into<String>, row_field: impl Into<String>) -> Self {
        self.tiebreakers.push(Tiebreaker::new(param, row_field));
        self
    }
}

/// Hands out increasing tickets. Only the most recent ticket is current.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[must_use]
    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}

/// Whether a refresh changed the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// A newer request was issued, or the view was unmounted, first.
    Discarded,
}

/// What a paged grid currently shows.
#[derive(Debug, Clone, Default)]
pub struct CollectionView {
    pub rows: Vec<JsonValue>,
    pub page: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub loading: bool,
    /// Error of the last refresh. Rows from before it are kept.
    pub error: Option<FetchError>,
}

// ---------------------------------------------------------------------------
// PagedCollection
// ---------------------------------------------------------------------------

/// Offset-paginated list view.
pub struct PagedCollection {
    source: CollectionSource,
    backend: Arc<dyn Backend>,
    cache: Arc<QueryCache>,
    selection: ArcSwap<ListRequest>,
    pagination: Mutex<OffsetPagination>,
    sequencer: RequestSequencer,
    view: ArcSwap<CollectionView>,
    changed: Notify,
    cancel: CancellationToken,
}

impl PagedCollection {
    /// Mounts a view over `selection`. Its paging and limit are managed here.
    #[must_use]
    pub fn new(
        source: CollectionSource,
        backend: Arc<dyn Backend>,
        cache: Arc<QueryCache>,
        pagination: &PaginationConfig,
        selection: ListRequest,
    ) -> Self {
        Self {
            source,
            backend,
            cache,
            selection: ArcSwap::from_pointee(selection),
            pagination: Mutex::new(OffsetPagination::new(pagination)),
            sequencer: RequestSequencer::default(),
            view: ArcSwap::from_pointee(CollectionView {
                page: 1,
                ..CollectionView::default()
            }),
            changed: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &CollectionSource {
        &self.source
    }

    /// The request the next refresh will send.
    #[must_use]
    pub fn request(&self) -> ListRequest {
        let pagination = self.pagination.lock();
        let mut request = ListRequest::clone(&self.selection.load());
        request.limit = pagination.page_size();
        request.paging = Paging::Offset {
            page: pagination.page(),
        };
        request
    }

    #[must_use]
    pub fn key(&self) -> QueryKey {
        self.request().query_key(&self.source.entity)
    }

    #[must_use]
    pub fn view(&self) -> Arc<CollectionView> {
        self.view.load_full()
    }

    #[must_use]
    pub fn pagination(&self) -> OffsetPagination {
        self.pagination.lock().clone()
    }

    /// Edits the selection. A different selection returns to page 1.
    pub fn update_selection(&self, edit: impl FnOnce(&mut ListRequest)) {
        let current = self.selection.load_full();
        let mut next = ListRequest::clone(&current);
        edit(&mut next);
        if !next.same_selection(&current) {
            self.pagination.lock().reset();
        }
        self.selection.store(Arc::new(next));
        self.changed.notify_one();
    }

    /// Takes sort and filter from a column layout. Only the server-side part
    /// of the sort model is sent.
    pub fn apply_layout(&self, grid: &GridDefinition, layout: &ColumnLayoutState) {
        self.update_selection(|request| {
            request.sort = grid.server_sort(&layout.sort_model);
            request.filter_model = layout.filter_model.clone();
        });
    }

    /// # Errors
    ///
    /// See [`OffsetPagination::set_page`].
    pub fn set_page(&self, page: u32) -> Result<(), PaginationError> {
        self.pagination.lock().set_page(page)?;
        self.changed.notify_one();
        Ok(())
    }

    /// # Errors
    ///
    /// See [`OffsetPagination::set_page_size`].
    pub fn set_page_size(&self, size: u32) -> Result<(), PaginationError> {
        self.pagination.lock().set_page_size(size)?;
        self.changed.notify_one();
        Ok(())
    }

    fn update_view(&self, edit: impl Fn(&mut CollectionView)) {
        self.view.rcu(|current| {
            let mut next = CollectionView::clone(current);
            edit(&mut next);
            next
        });
    }

    /// Fetches the current page through the cache and applies it if it is
    /// still wanted when it arrives.
    ///
    /// # Errors
    ///
    /// Returns validation and fetch errors, which are also stored on the view.
    pub async fn refresh(&self) -> Result<RefreshOutcome, FetchError> {
        if self.cancel.is_cancelled() {
            return Ok(RefreshOutcome::Discarded);
        }
        let request = self.request();
        let ticket = self.sequencer.issue();

        if let Err(e) = request.validate() {
            let e = FetchError::from(e);
            self.update_view(|view| {
                view.loading = false;
                view.error = Some(e.clone());
            });
            return Err(e);
        }

        self.update_view(|view| view.loading = true);
        let key = request.query_key(&self.source.entity);
        let load = self.cache.fetch(&key, || {
            self.backend.fetch_list(&self.source.endpoint, &request)
        });
        let result = tokio::select! {
            () = self.cancel.cancelled() => None,
            result = load => Some(result),
        };
        let Some(result) = result.filter(|_| !self.cancel.is_cancelled()) else {
            self.update_view(|view| view.loading = false);
            return Ok(RefreshOutcome::Discarded);
        };

        // The newer request owns `loading` from here on.
        if !self.sequencer.is_current(ticket) {
            debug!(key = %key, ticket, "discarding response for an outdated request");
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok(envelope) => {
                let page = ListEnvelope::clone(&envelope).into_offset_page(request.limit);
                let (current, clamped) = {
                    let mut pagination = self.pagination.lock();
                    let requested = pagination.page();
                    pagination.observe(&page);
                    (pagination.page(), pagination.page() != requested)
                };
                self.view.store(Arc::new(CollectionView {
                    rows: page.items,
                    page: current,
                    total_elements: page.total_elements,
                    total_pages: page.total_pages,
                    loading: false,
                    error: None,
                }));
                if clamped {
                    self.changed.notify_one();
                }
                Ok(RefreshOutcome::Applied)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "list refresh failed");
                self.update_view(|view| {
                    view.loading = false;
                    view.error = Some(e.clone());
                });
                Err(e)
            }
        }
    }

    /// Keeps the view current until unmounted: refreshes now, then again
    /// whenever the cache invalidates its key or the selection or page changes.
    pub async fn watch(&self) {
        while !self.cancel.is_cancelled() {
            let mut subscription = self.cache.subscribe(&self.key());
            if let Err(e) = self.refresh().await {
                debug!(error = %e, "waiting for a change before retrying");
            }
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = subscription.invalidated() => debug!(entity = %self.source.entity, "collection invalidated"),
                () = self.changed.notified() => {}
            }
        }
    }

    /// Stops applying results. In-flight responses are dropped on arrival.
    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Rows ready for display: numbered from the page offset and sorted
    /// locally when the effective sort is client-side.
    #[must_use]
    pub fn present(&self, grid: &GridDefinition, layout: &ColumnLayoutState) -> Vec<JsonValue> {
        let offset = self.pagination.lock().offset() as u64;
        grid.present(self.view.load().rows.clone(), layout, offset)
    }
}

// ---------------------------------------------------------------------------
// InfiniteCollection
// ---------------------------------------------------------------------------

/// Cursor-paginated list view.
pub struct InfiniteCollection {
    source: CollectionSource,
    backend: Arc<dyn Backend>,
    selection: ArcSwap<ListRequest>,
    accumulator: CursorAccumulator<JsonValue>,
    changed: Notify,
    cancel: CancellationToken,
}

impl InfiniteCollection {
    /// Mounts a view over `selection`. Its paging is managed here.
    #[must_use]
    pub fn new(source: CollectionSource, backend: Arc<dyn Backend>, selection: ListRequest) -> Self {
        Self {
            source,
            backend,
            selection: ArcSwap::from_pointee(selection.with_paging(Paging::Cursor(None))),
            accumulator: CursorAccumulator::new(),
            changed: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn selection(&self) -> Arc<ListRequest> {
        self.selection.load_full()
    }

    /// Edits the selection. A different selection empties the list at once.
    pub fn update_selection(&self, edit: impl FnOnce(&mut ListRequest)) {
        let current = self.selection.load_full();
        let mut next = ListRequest::clone(&current);
        edit(&mut next);
        next.paging = Paging::Cursor(None);
        if !next.same_selection(&current) {
            self.accumulator.reset();
        }
        self.selection.store(Arc::new(next));
        self.changed.notify_one();
    }

    /// Takes sort and filter from a column layout.
    pub fn apply_layout(&self, grid: &GridDefinition, layout: &ColumnLayoutState) {
        self.update_selection(|request| {
            request.sort = grid.server_sort(&layout.sort_model);
            request.filter_model = layout.filter_model.clone();
        });
    }

    /// Loads the next page.
    ///
    /// # Errors
    ///
    /// Returns validation and fetch errors; see [`CursorAccumulator::load_next`].
    pub async fn load_next(&self) -> Result<LoadOutcome, FetchError> {
        if self.cancel.is_cancelled() {
            return Ok(LoadOutcome::Discarded);
        }
        let selection = self.selection.load_full();
        selection.validate()?;

        let fetch = |cursor: Option<CursorToken>| {
            let request = ListRequest::clone(&selection).with_paging(Paging::Cursor(cursor));
            async move {
                let envelope = self
                    .backend
                    .fetch_list(&self.source.endpoint, &request)
                    .await?;
                Ok::<_, FetchError>(
                    envelope.into_cursor_page(&self.source.tiebreakers, request.limit),
                )
            }
        };

        tokio::select! {
            () = self.cancel.cancelled() => Ok(LoadOutcome::Discarded),
            outcome = self.accumulator.load_next(fetch) => outcome,
        }
    }

    /// Empties the list. The next `load_next` starts from the first page.
    pub fn reset(&self) {
        self.accumulator.reset();
        self.changed.notify_one();
    }

    /// Keeps the list populated until unmounted: loads the first page
    /// whenever the list is empty, which it is after a reset, an
    /// invalidation, or a selection change. Further pages are left to
    /// `load_next`.
    pub async fn watch(&self) {
        while !self.cancel.is_cancelled() {
            if self.accumulator.is_empty() {
                if let Err(e) = self.load_next().await {
                    debug!(error = %e, "waiting for a change before retrying");
                }
            }
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = self.changed.notified() => {}
            }
        }
    }

    #[must_use]
    pub fn items(&self) -> Vec<JsonValue> {
        self.accumulator.items()
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.accumulator.has_next()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.accumulator.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<FetchError> {
        self.accumulator.error()
    }

    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    /// Rows ready for display, numbered from 1.
    #[must_use]
    pub fn present(&self, grid: &GridDefinition, layout: &ColumnLayoutState) -> Vec<JsonValue> {
        grid.present(self.items(), layout, 0)
    }
}

impl InvalidationTarget for InfiniteCollection {
    fn invalidate(&self, prefix: &QueryKey) -> usize {
        let key = self.selection.load().selection_key(&self.source.entity);
        if key.starts_with(prefix) {
            debug!(prefix = %prefix, "infinite list invalidated");
            self.reset();
            1
        } else {
            0
        }
    }
}

//! Cursor pagination accumulator for infinite lists.
//!
//! [`CursorAccumulator`] appends successive server pages into one list, in
//! server order. Loads are strictly sequential: a second `load_next` while one
//! is running is refused with [`LoadOutcome::Busy`]. Every `reset` starts a new
//! epoch, and a load that settles under an older epoch is discarded.

use std::collections::HashSet;
use std::future::Future;

use ahash::RandomState;
use backoffice_core::{CursorToken, Page, RowIdentity};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::FetchError;

/// What one `load_next` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was appended; `appended` counts rows that were not already present.
    Loaded { appended: usize },
    /// The list has no further pages.
    Exhausted,
    /// Another load is still running.
    Busy,
    /// The list was reset or moved on while this load ran; its page was dropped.
    Discarded,
}

struct State<T> {
    items: Vec<T>,
    seen: HashSet<String, RandomState>,
    cursor: Option<CursorToken>,
    has_next: bool,
    in_flight: bool,
    epoch: u64,
    error: Option<FetchError>,
}

impl<T> State<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::with_hasher(RandomState::new()),
            cursor: None,
            has_next: true,
            in_flight: false,
            epoch: 0,
            error: None,
        }
    }
}

/// Releases the in-flight flag when a load ends or is dropped, unless a reset
/// already handed the list to a newer epoch.
struct InFlightRelease<'a, T> {
    state: &'a Mutex<State<T>>,
    epoch: u64,
}

impl<T> Drop for InFlightRelease<'_, T> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.epoch == self.epoch {
            state.in_flight = false;
        }
    }
}

/// Accumulated rows of a cursor-paginated list.
pub struct CursorAccumulator<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for CursorAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CursorAccumulator<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }

    /// Clears the list and cursor. Loads started before the reset are
    /// discarded when they settle.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let epoch = state.epoch + 1;
        *state = State::new();
        state.epoch = epoch;
        debug!(epoch, "cursor list reset");
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.state.lock().has_next
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Cursor the next `load_next` will send.
    #[must_use]
    pub fn cursor(&self) -> Option<CursorToken> {
        self.state.lock().cursor.clone()
    }

    /// Error from the most recent failed load, cleared by the next success.
    #[must_use]
    pub fn error(&self) -> Option<FetchError> {
        self.state.lock().error.clone()
    }
}

impl<T: Clone> CursorAccumulator<T> {
    /// Copy of the accumulated rows.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.state.lock().items.clone()
    }
}

impl<T: RowIdentity + Send> CursorAccumulator<T> {
    /// Fetches the page after the current cursor and appends it.
    ///
    /// `fetch` receives the cursor to resume after; `None` asks for the
    /// first page. It is only called when a load actually starts.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error. Accumulated rows and the cursor are left
    /// untouched so the same page can be retried.
    pub async fn load_next<F, Fut>(&self, fetch: F) -> Result<LoadOutcome, FetchError>
    where
        F: FnOnce(Option<CursorToken>) -> Fut,
        Fut: Future<Output = Result<Page<T>, FetchError>>,
    {
        let (cursor, epoch) = {
            let mut state = self.state.lock();
            if state.in_flight {
                return Ok(LoadOutcome::Busy);
            }
            if !state.has_next {
                return Ok(LoadOutcome::Exhausted);
            }
            state.in_flight = true;
            (state.cursor.clone(), state.epoch)
        };
        let _release = InFlightRelease {
            state: &self.state,
            epoch,
        };

        let result = fetch(cursor.clone()).await;

        let mut state = self.state.lock();
        if state.epoch != epoch || state.cursor != cursor {
            debug!(epoch, current = state.epoch, "discarding page from an outdated load");
            return Ok(LoadOutcome::Discarded);
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "loading next page failed");
                state.error = Some(e.clone());
                return Err(e);
            }
        };

        let mut appended = 0;
        for item in page.items {
            let fresh = match item.row_id() {
                Some(id) => state.seen.insert(id),
                None => true,
            };
            if fresh {
                state.items.push(item);
                appended += 1;
            }
        }

        if page.has_next && page.cursor.is_none() {
            warn!("server reported more rows without a cursor; treating list as complete");
        }
        state.has_next = page.has_next && page.cursor.is_some();
        state.cursor = page.cursor;
        state.error = None;

        debug!(appended, total = state.items.len(), has_next = state.has_next, "page appended");
        Ok(LoadOutcome::Loaded { appended })
    }
}

//! Live layout state for one screen, backed by a storage adapter.

use std::sync::Arc;

use arc_swap::ArcSwap;
use backoffice_core::{ColumnLayoutState, GridDefinition, LayoutPatch};
use tracing::{debug, info, warn};

use super::storage::LayoutStorage;
use crate::confirm::{Confirmation, Confirmed};
use crate::error::LayoutError;

/// A layout captured for saving.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSnapshot {
    pub key: String,
    pub state: ColumnLayoutState,
}

/// Owns a screen's column layout.
///
/// Reads are lock-free snapshots. Changes apply in memory at once and are
/// only persisted through [`LayoutController::save`].
pub struct LayoutController {
    grid: GridDefinition,
    key: String,
    storage: Arc<dyn LayoutStorage>,
    state: ArcSwap<ColumnLayoutState>,
}

impl LayoutController {
    /// Starts from the grid's default layout. Call [`restore`](Self::restore)
    /// to pick up a saved one.
    #[must_use]
    pub fn new(grid: GridDefinition, key: impl Into<String>, storage: Arc<dyn LayoutStorage>) -> Self {
        let state = ArcSwap::from_pointee(grid.default_layout());
        Self {
            grid,
            key: key.into(),
            storage,
            state,
        }
    }

    #[must_use]
    pub fn grid(&self) -> &GridDefinition {
        &self.grid
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn state(&self) -> Arc<ColumnLayoutState> {
        self.state.load_full()
    }

    /// Visible fields in display order.
    #[must_use]
    pub fn visible_fields(&self) -> Vec<String> {
        let state = self.state.load();
        self.grid
            .visible_fields(&state)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Loads the saved layout, reconciled against the current grid, or the
    /// default when nothing is saved.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] when the adapter fails and
    /// [`LayoutError::Corrupt`] when the saved blob does not parse. The live
    /// state is left unchanged in both cases.
    pub async fn restore(&self) -> Result<Arc<ColumnLayoutState>, LayoutError> {
        let restored = match self.storage.load(&self.key).await? {
            Some(blob) => {
                let saved: ColumnLayoutState =
                    serde_json::from_str(&blob).map_err(|source| {
                        warn!(key = %self.key, error = %source, "saved layout is unreadable");
                        LayoutError::Corrupt {
                            key: self.key.clone(),
                            source,
                        }
                    })?;
                debug!(key = %self.key, "restored saved layout");
                self.grid.reconcile(saved)
            }
            None => self.grid.default_layout(),
        };
        let restored = Arc::new(restored);
        self.state.store(Arc::clone(&restored));
        Ok(restored)
    }

    /// Applies a partial change in memory.
    ///
    /// Returns whether the change alters what the server must return: always
    /// for filter changes, and for sort changes only while sorting is
    /// server-side.
    pub fn apply_change(&self, patch: LayoutPatch) -> bool {
        let before = self.state.load_full();
        let mut next = (*before).clone();
        let change = next.apply(patch);
        if change.is_empty() {
            return false;
        }
        let refetch = self.grid.requires_refetch(&before, &next);
        debug!(key = %self.key, ?change, refetch, "layout changed");
        self.state.store(Arc::new(next));
        refetch
    }

    /// Captures the current layout for saving, behind a confirmation.
    pub fn request_save(&self) -> Confirmation<LayoutSnapshot> {
        let snapshot = LayoutSnapshot {
            key: self.key.clone(),
            state: (*self.state.load_full()).clone(),
        };
        Confirmation::new("Save the current column layout?", snapshot)
    }

    /// Persists a confirmed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if the adapter fails.
    pub async fn save(&self, confirmed: Confirmed<LayoutSnapshot>) -> Result<(), LayoutError> {
        let snapshot = confirmed.into_inner();
        let blob = serde_json::to_string(&snapshot.state).map_err(anyhow::Error::from)?;
        self.storage.save(&snapshot.key, &blob).await?;
        info!(key = %snapshot.key, "layout saved");
        Ok(())
    }

    /// Clears the saved layout and goes back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if the adapter fails. The live state
    /// is only reset once storage is cleared.
    pub async fn reset_to_default(&self) -> Result<Arc<ColumnLayoutState>, LayoutError> {
        self.storage.clear(&self.key).await?;
        let default = Arc::new(self.grid.default_layout());
        self.state.store(Arc::clone(&default));
        info!(key = %self.key, "layout reset to default");
        Ok(default)
    }
}

#[cfg(test)]
mod tests {
    use backoffice_core::{
        ColumnSpec, FilterClause, FilterModel, FilterOperator, LinkOperator, SortItem, SortMode,
    };

    use super::*;
    use crate::layout::storage::{FileLayoutStorage, MemoryLayoutStorage};

    fn grid() -> GridDefinition {
        GridDefinition::new(vec![
            ColumnSpec::new("txid"),
            ColumnSpec::new("amount"),
            ColumnSpec::new("memo").hidden(),
        ])
        .with_row_index("no")
    }

    fn controller(storage: &Arc<MemoryLayoutStorage>) -> LayoutController {
        LayoutController::new(grid(), "layout:deposits", storage.clone())
    }

    #[tokio::test]
    async fn layout_survives_a_remount_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn LayoutStorage> = Arc::new(FileLayoutStorage::new(dir.path()));

        let first = LayoutController::new(grid(), "layout:deposits", Arc::clone(&storage));
        first.apply_change(LayoutPatch::sort(vec![SortItem::desc("amount")]));
        first.apply_change(LayoutPatch::visibility("txid", false));
        first.save(first.request_save().confirm()).await.unwrap();
        let saved = first.state();
        drop(first);

        let remounted = LayoutController::new(grid(), "layout:deposits", Arc::clone(&storage));
        assert_eq!(remounted.restore().await.unwrap(), saved);
        assert_eq!(remounted.visible_fields(), ["no", "amount"]);

        // a file the controller cannot parse leaves the live state alone
        std::fs::write(
            dir.path().join(format!("{}.json", blake3::hash(b"layout:deposits").to_hex())),
            "{not json",
        )
        .unwrap();
        let err = remounted.restore().await.unwrap_err();
        assert!(matches!(err, LayoutError::Corrupt { .. }));
        assert_eq!(remounted.state(), saved);

        remounted.reset_to_default().await.unwrap();
        assert_eq!(storage.load("layout:deposits").await.unwrap(), None);
        assert_eq!(*remounted.state(), grid().default_layout());
    }

    #[tokio::test]
    async fn save_then_remount_restores_the_layout() {
        let storage = Arc::new(MemoryLayoutStorage::new());
        let first = controller(&storage);
        first.apply_change(LayoutPatch::visibility("memo", true));
        first.apply_change(LayoutPatch::order(vec![
            "amount".into(),
            "no".into(),
            "txid".into(),
            "memo".into(),
        ]));
        first.save(first.request_save().confirm()).await.unwrap();
        let saved = first.state();
        drop(first);

        let remounted = controller(&storage);
        assert_eq!(*remounted.state(), grid().default_layout());
        let restored = remounted.restore().await.unwrap();
        assert_eq!(restored, saved);
        assert_eq!(remounted.visible_fields(), ["amount", "no", "txid", "memo"]);
    }

    #[tokio::test]
    async fn reset_then_restore_gives_the_default() {
        let storage = Arc::new(MemoryLayoutStorage::new());
        let layout = controller(&storage);
        layout.apply_change(LayoutPatch::visibility("txid", false));
        layout.save(layout.request_save().confirm()).await.unwrap();

        layout.reset_to_default().await.unwrap();
        assert!(storage.is_empty());

        let remounted = controller(&storage);
        assert_eq!(*remounted.restore().await.unwrap(), grid().default_layout());
    }

    #[tokio::test]
    async fn changes_are_not_persisted_until_saved() {
        let storage = Arc::new(MemoryLayoutStorage::new());
        let layout = controller(&storage);
        layout.apply_change(LayoutPatch::visibility("memo", true));

        let pending = layout.request_save();
        pending.cancel();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn corrupt_blob_is_reported_and_state_kept() {
        let storage = Arc::new(MemoryLayoutStorage::new());
        storage.save("layout:deposits", "{not json").await.unwrap();

        let layout = controller(&storage);
        let err = layout.restore().await.unwrap_err();
        assert!(matches!(err, LayoutError::Corrupt { ref key, .. } if key == "layout:deposits"));
        assert_eq!(*layout.state(), grid().default_layout());
    }

    #[tokio::test]
    async fn saved_layout_is_reconciled_with_current_columns() {
        let storage = Arc::new(MemoryLayoutStorage::new());
        storage
            .save(
                "layout:deposits",
                r#"{"order":["gone","amount","txid"],"visibility":{"gone":true},"sortModel":[{"field":"gone","sort":"asc"}]}"#,
            )
            .await
            .unwrap();

        let layout = controller(&storage);
        let restored = layout.restore().await.unwrap();
        assert_eq!(restored.order, ["amount", "txid", "no", "memo"]);
        assert!(!restored.visibility.contains_key("gone"));
        assert!(restored.sort_model.is_empty());
    }

    #[test]
    fn filter_changes_always_refetch() {
        let layout = LayoutController::new(grid(), "k", Arc::new(MemoryLayoutStorage::new()));
        let filter = FilterModel::new(
            vec![FilterClause::new(
                "txid",
                FilterOperator::Contains("0xab".into()),
            )],
            LinkOperator::And,
        );
        assert!(layout.apply_change(LayoutPatch::filter(filter.clone())));
        assert!(!layout.apply_change(LayoutPatch::filter(filter)));
        assert!(!layout.apply_change(LayoutPatch::visibility("memo", true)));
    }

    #[test]
    fn sort_refetches_only_when_server_side() {
        let server = LayoutController::new(grid(), "k", Arc::new(MemoryLayoutStorage::new()));
        assert!(server.apply_change(LayoutPatch::sort(vec![SortItem::desc("amount")])));
        // row index is always sorted locally; leaving the server sort drops it
        assert!(server.apply_change(LayoutPatch::sort(vec![SortItem::asc("no")])));
        assert!(!server.apply_change(LayoutPatch::sort(vec![SortItem::desc("no")])));

        let client = LayoutController::new(
            grid().with_sort_mode(SortMode::Client),
            "k",
            Arc::new(MemoryLayoutStorage::new()),
        );
        assert!(!client.apply_change(LayoutPatch::sort(vec![SortItem::desc("amount")])));
    }
}

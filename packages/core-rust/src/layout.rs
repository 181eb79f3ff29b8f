//! Column layout state and the grid definitions it is checked against.
//!
//! [`ColumnLayoutState`] is the pure data a user customises (order,
//! visibility, sort, filter). [`GridDefinition`] is the per-screen column
//! catalogue that supplies defaults, decides where sorting happens, and repairs
//! layouts saved against an older set of columns.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::filter::FilterModel;
use crate::sort::{sort_rows, SortItem, SortMode};

// ---------------------------------------------------------------------------
// Column specs
// ---------------------------------------------------------------------------

/// Static description of one grid column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub field: String,
    /// Visibility used when no saved layout says otherwise.
    pub default_visible: bool,
    /// Whether the user may hide the column.
    pub hideable: bool,
    /// The server has no reliable order for this column, so sorting on it
    /// always happens locally.
    pub client_sort_only: bool,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            default_visible: true,
            hideable: true,
            client_sort_only: false,
        }
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.default_visible = false;
        self
    }

    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.hideable = false;
        self.default_visible = true;
        self
    }

    #[must_use]
    pub fn client_sort_only(mut self) -> Self {
        self.client_sort_only = true;
        self
    }
}

/// Per-screen column catalogue and sorting policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridDefinition {
    pub columns: Vec<ColumnSpec>,
    pub sort_mode: SortMode,
    pub default_sort: Vec<SortItem>,
    /// Field that receives a 1-based, client-computed row number.
    pub row_index_field: Option<String>,
}

impl GridDefinition {
    #[must_use]
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_sort_mode(mut self, mode: SortMode) -> Self {
        self.sort_mode = mode;
        self
    }

    #[must_use]
    pub fn with_default_sort(mut self, sort: Vec<SortItem>) -> Self {
        self.default_sort = sort;
        self
    }

    /// Adds a leading row-number column. It is always sorted locally.
    #[must_use]
    pub fn with_row_index(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.columns.retain(|c| c.field != field);
        self.columns
            .insert(0, ColumnSpec::new(field.clone()).client_sort_only());
        self.row_index_field = Some(field);
        self
    }

    #[must_use]
    pub fn column(&self, field: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// The built-in layout: declaration order, default visibility, default sort.
    #[must_use]
    pub fn default_layout(&self) -> ColumnLayoutState {
        ColumnLayoutState {
            order: self.columns.iter().map(|c| c.field.clone()).collect(),
            visibility: self
                .columns
                .iter()
                .map(|c| (c.field.clone(), c.default_visible))
                .collect(),
            sort_model: self.default_sort.clone(),
            filter_model: FilterModel::default(),
        }
    }

    /// Where a given sort model is applied.
    ///
    /// Any item on a client-sort-only column forces client-side sorting.
    #[must_use]
    pub fn effective_sort_mode(&self, model: &[SortItem]) -> SortMode {
        let forced = model
            .iter()
            .any(|item| self.column(&item.field).is_some_and(|c| c.client_sort_only));
        if forced {
            SortMode::Client
        } else {
            self.sort_mode
        }
    }

    /// The part of a sort model that is sent to the server.
    #[must_use]
    pub fn server_sort(&self, model: &[SortItem]) -> Vec<SortItem> {
        match self.effective_sort_mode(model) {
            SortMode::Server => model.to_vec(),
            SortMode::Client => Vec::new(),
        }
    }

    /// Whether moving from `before` to `after` changes what the server must return.
    #[must_use]
    pub fn requires_refetch(&self, before: &ColumnLayoutState, after: &ColumnLayoutState) -> bool {
        before.filter_model != after.filter_model
            || self.server_sort(&before.sort_model) != self.server_sort(&after.sort_model)
    }

    /// Repairs a layout saved against a different column set.
    ///
    /// Unknown columns are dropped, new columns are appended with their
    /// default visibility, pinned columns are forced visible, and sort or
    /// filter entries on vanished columns are removed.
    #[must_use]
    pub fn reconcile(&self, mut state: ColumnLayoutState) -> ColumnLayoutState {
        let known: HashSet<&str> = self.columns.iter().map(|c| c.field.as_str()).collect();

        let before = state.order.len();
        let mut seen = HashSet::new();
        state
            .order
            .retain(|f| known.contains(f.as_str()) && seen.insert(f.clone()));
        for column in &self.columns {
            if !seen.contains(&column.field) {
                state.order.push(column.field.clone());
            }
        }

        state.visibility.retain(|f, _| known.contains(f.as_str()));
        for column in &self.columns {
            let entry = state
                .visibility
                .entry(column.field.clone())
                .or_insert(column.default_visible);
            if !column.hideable {
                *entry = true;
            }
        }

        state.sort_model.retain(|item| known.contains(item.field.as_str()));
        state.filter_model.retain_fields(|f| known.contains(f));

        if state.order.len() != before {
            debug!(
                saved = before,
                current = state.order.len(),
                "reconciled saved column layout"
            );
        }
        state
    }

    /// Visible fields in display order.
    #[must_use]
    pub fn visible_fields<'a>(&self, state: &'a ColumnLayoutState) -> Vec<&'a str> {
        state
            .order
            .iter()
            .filter(|f| {
                state.visibility.get(f.as_str()).copied().unwrap_or_else(|| {
                    self.column(f).map_or(true, |c| c.default_visible)
                })
            })
            .map(String::as_str)
            .collect()
    }

    /// Prepares fetched rows for display.
    ///
    /// Rows get their row number (`offset + position + 1`) first, then are
    /// sorted locally only when the effective sort mode is client-side.
    #[must_use]
    pub fn present(
        &self,
        mut rows: Vec<JsonValue>,
        state: &ColumnLayoutState,
        offset: u64,
    ) -> Vec<JsonValue> {
        if let Some(field) = &self.row_index_field {
            for (position, row) in (offset + 1..).zip(rows.iter_mut()) {
                if let Some(object) = row.as_object_mut() {
                    object.insert(field.clone(), JsonValue::from(position));
                }
            }
        }
        if self.effective_sort_mode(&state.sort_model) == SortMode::Client {
            sort_rows(&mut rows, &state.sort_model);
        }
        rows
    }
}

// ---------------------------------------------------------------------------
// Layout state
// ---------------------------------------------------------------------------

/// The user's customised grid layout, persisted as one JSON blob.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayoutState {
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub visibility: BTreeMap<String, bool>,
    #[serde(default)]
    pub sort_model: Vec<SortItem>,
    #[serde(default)]
    pub filter_model: FilterModel,
}

impl ColumnLayoutState {
    /// Applies a partial change in place and reports what moved.
    pub fn apply(&mut self, patch: LayoutPatch) -> LayoutChange {
        let mut change = LayoutChange::default();
        if let Some(order) = patch.order {
            change.order = order != self.order;
            self.order = order;
        }
        if let Some(visibility) = patch.visibility {
            for (field, visible) in visibility {
                let previous = self.visibility.insert(field, visible);
                change.visibility |= previous != Some(visible);
            }
        }
        if let Some(sort_model) = patch.sort_model {
            change.sort = sort_model != self.sort_model;
            self.sort_model = sort_model;
        }
        if let Some(filter_model) = patch.filter_model {
            change.filter = filter_model != self.filter_model;
            self.filter_model = filter_model;
        }
        change
    }
}

/// A partial layout update. Visibility entries merge into the current map;
/// every other present field replaces its counterpart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPatch {
    pub order: Option<Vec<String>>,
    pub visibility: Option<BTreeMap<String, bool>>,
    pub sort_model: Option<Vec<SortItem>>,
    pub filter_model: Option<FilterModel>,
}

impl LayoutPatch {
    #[must_use]
    pub fn order(order: Vec<String>) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn visibility(field: impl Into<String>, visible: bool) -> Self {
        Self {
            visibility: Some(BTreeMap::from([(field.into(), visible)])),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sort(model: Vec<SortItem>) -> Self {
        Self {
            sort_model: Some(model),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(model: FilterModel) -> Self {
        Self {
            filter_model: Some(model),
            ..Self::default()
        }
    }
}

/// Which parts of a layout a patch actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutChange {
    pub order: bool,
    pub visibility: bool,
    pub sort: bool,
    pub filter: bool,
}

impl LayoutChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.order || self.visibility || self.sort || self.filter)
    }
}

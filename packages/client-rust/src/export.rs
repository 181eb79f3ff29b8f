//! Mass export of a list selection.
//!
//! An export is its own request: the same selection as the grid, with the
//! mass-fetch limit and no page or cursor. Rows are projected onto the visible
//! columns in layout order.

use std::io::Write;

use backoffice_core::{ColumnLayoutState, GridDefinition, ListRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::FetchError;
use crate::transport::Backend;

/// A tabular export: column names plus one value array per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub entity: String,
    pub exported_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl ExportDocument {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `writer`.
    pub fn write_json<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }
}

/// Fetches every row matching `selection` in one request.
///
/// # Errors
///
/// Returns the backend's error, or a validation error before anything is sent.
pub async fn fetch_all(
    backend: &dyn Backend,
    endpoint: &str,
    selection: &ListRequest,
) -> Result<Vec<JsonValue>, FetchError> {
    let request = selection.for_mass_fetch();
    let envelope = backend.fetch_list(endpoint, &request).await?;
    Ok(envelope.items)
}

/// Picks `columns` out of each row, in order. Missing fields become `null`.
#[must_use]
pub fn project(rows: &[JsonValue], columns: &[String]) -> Vec<Vec<JsonValue>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|field| row.get(field).cloned().unwrap_or(JsonValue::Null))
                .collect()
        })
        .collect()
}

/// Fetches the whole selection and lays it out like the grid: visible
/// columns in layout order, row numbers, local sort when applicable.
///
/// # Errors
///
/// See [`fetch_all`].
pub async fn export(
    backend: &dyn Backend,
    entity: &str,
    endpoint: &str,
    selection: &ListRequest,
    grid: &GridDefinition,
    layout: &ColumnLayoutState,
) -> Result<ExportDocument, FetchError> {
    let rows = fetch_all(backend, endpoint, selection).await?;
    let rows = grid.present(rows, layout, 0);
    let columns: Vec<String> = grid
        .visible_fields(layout)
        .into_iter()
        .map(str::to_string)
        .collect();

    let document = ExportDocument {
        entity: entity.to_string(),
        exported_at: Utc::now(),
        rows: project(&rows, &columns),
        columns,
    };
    info!(entity, rows = document.len(), "export ready");
    Ok(document)
}

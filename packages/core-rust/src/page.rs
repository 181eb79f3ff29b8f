//! Page shapes for cursor and offset pagination.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Everything needed to resume a cursor-paginated list.
///
/// The primary cursor is `lastId`. Some lists order by a column that is not
/// unique, so the server also hands back tiebreakers such as `lastCreatedAt`
/// or `lastEmail`. They travel together and are always sent back together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorToken {
    pub last_id: String,
    /// Tiebreaker parameters keyed by their wire name (e.g. `lastCreatedAt`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tiebreakers: BTreeMap<String, String>,
}

impl CursorToken {
    #[must_use]
    pub fn new(last_id: impl Into<String>) -> Self {
        Self {
            last_id: last_id.into(),
            tiebreakers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_tiebreaker(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tiebreakers.insert(name.into(), value.into());
        self
    }

    /// Query parameters that resume the list after this cursor.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("lastId".to_string(), self.last_id.clone())];
        pairs.extend(
            self.tiebreakers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        pairs
    }
}

/// One server response unit of a cursor-paginated list.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor to request the following page with.
    pub cursor: Option<CursorToken>,
    pub has_next: bool,
}

impl<T> Page<T> {
    /// A final page with no continuation.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: None,
            has_next: false,
        }
    }
}

/// One server response unit of an offset-paginated list.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u32,
}

/// Stable identity used to avoid appending the same row twice.
pub trait RowIdentity {
    /// The row's identifier, or `None` when the row has none.
    fn row_id(&self) -> Option<String>;
}

impl RowIdentity for JsonValue {
    fn row_id(&self) -> Option<String> {
        let id = self.get("id").or_else(|| self.get("_id"))?;
        match id {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Number of pages needed for `total_elements` at `page_size` rows per page.
#[must_use]
pub fn page_count(total_elements: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    u32::try_from(total_elements.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn cursor_pairs_carry_every_tiebreaker() {
        let cursor = CursorToken::new("665f")
            .with_tiebreaker("lastCreatedAt", "2024-05-01T00:00:00Z")
            .with_tiebreaker("lastEmail", "a@b.c");
        assert_eq!(
            cursor.query_pairs(),
            vec![
                ("lastId".to_string(), "665f".to_string()),
                ("lastCreatedAt".to_string(), "2024-05-01T00:00:00Z".to_string()),
                ("lastEmail".to_string(), "a@b.c".to_string()),
            ]
        );
    }

    #[test]
    fn cursor_without_tiebreakers_serializes_compactly() {
        let value = serde_json::to_value(CursorToken::new("9")).unwrap();
        assert_eq!(value, json!({"lastId": "9"}));
    }

    #[test]
    fn row_identity_reads_id_or_underscore_id() {
        assert_eq!(json!({"id": "a"}).row_id(), Some("a".to_string()));
        assert_eq!(json!({"_id": 42}).row_id(), Some("42".to_string()));
        assert_eq!(json!({"name": "x"}).row_id(), None);
        assert_eq!(json!({"id": null}).row_id(), None);
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 25), 0);
        assert_eq!(page_count(25, 25), 1);
        assert_eq!(page_count(26, 25), 2);
        assert_eq!(page_count(10, 0), 0);
    }
}

//! JSON wire envelopes exchanged with the REST backend.
//!
//! List endpoints do not agree on one response shape. The items array may be
//! called `items`, `data`, `list` or `rows`. Totals arrive as `total` or
//! `nbTotalElements`, and cursors as `lastId` plus optional tiebreakers.
//! [`ListEnvelope`] accepts all of them and converts into [`Page`] or
//! [`OffsetPage`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::page::{page_count, CursorToken, OffsetPage, Page, RowIdentity};

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A cursor tiebreaker: the query parameter name and the row field it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiebreaker {
    /// Parameter name on the wire, e.g. `lastCreatedAt`.
    pub param: String,
    /// Row field carrying the same value, e.g. `createdAt`.
    pub row_field: String,
}

impl Tiebreaker {
    #[must_use]
    pub fn new(param: impl Into<String>, row_field: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            row_field: row_field.into(),
        }
    }
}

/// Response body of any list endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope {
    #[serde(default, alias = "data", alias = "list", alias = "rows")]
    pub items: Vec<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_id: Option<String>,
    #[serde(default, alias = "nbTotalElements", skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, rename = "nbTotalPage", skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    /// Every other top-level field, including cursor tiebreakers.
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl ListEnvelope {
    /// Converts into a cursor page.
    ///
    /// The cursor comes from `lastId` and the listed tiebreakers. When the
    /// server leaves them out, they are taken from the last row. Without an
    /// explicit `hasNext`, a full page (`items.len() >= limit`) with a cursor is
    /// taken to have more rows.
    #[must_use]
    pub fn into_cursor_page(self, tiebreakers: &[Tiebreaker], limit: u32) -> Page<JsonValue> {
        let last_row = self.items.last();
        let last_id = self
            .last_id
            .clone()
            .or_else(|| last_row.and_then(|row| row.row_id()));

        let cursor = last_id.map(|id| {
            tiebreakers.iter().fold(CursorToken::new(id), |cursor, tb| {
                let value = self
                    .extra
                    .get(&tb.param)
                    .and_then(scalar_to_string)
                    .or_else(|| {
                        last_row
                            .and_then(|row| row.get(&tb.row_field))
                            .and_then(scalar_to_string)
                    });
                match value {
                    Some(v) => cursor.with_tiebreaker(tb.param.clone(), v),
                    None => cursor,
                }
            })
        });

        let full_page = limit > 0 && self.items.len() >= limit as usize;
        let has_next = self
            .has_next
            .unwrap_or(full_page && cursor.is_some());

        Page {
            items: self.items,
            cursor,
            has_next,
        }
    }

    /// Converts into an offset page.
    ///
    /// Without a reported total, the number of returned rows stands in.
    #[must_use]
    pub fn into_offset_page(self, page_size: u32) -> OffsetPage<JsonValue> {
        let total_elements = self.total.unwrap_or(self.items.len() as u64);
        let total_pages = self
            .total_pages
            .unwrap_or_else(|| page_count(total_elements, page_size));
        OffsetPage {
            items: self.items,
            total_elements,
            total_pages,
        }
    }
}

/// Error body returned by the backend on business failures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorPayload {
    /// The human-readable message, if the server sent a non-blank one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        fn non_blank(field: Option<&str>) -> Option<&str> {
            field.map(str::trim).filter(|m| !m.is_empty())
        }
        non_blank(self.message.as_deref()).or_else(|| non_blank(self.error.as_deref()))
    }
}

/// Body of delete and other id-list mutations. Always an array, even for one id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdsBody {
    pub ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn blank_message_falls_back_to_error() {
        let payload: ErrorPayload =
            serde_json::from_value(json!({"message": "", "error": "already completed"})).unwrap();
        assert_eq!(payload.message(), Some("already completed"));

        let payload: ErrorPayload =
            serde_json::from_value(json!({"message": "  ", "error": " "})).unwrap();
        assert_eq!(payload.message(), None);

        let payload: ErrorPayload =
            serde_json::from_value(json!({"message": " Not found ", "error": "NOT_FOUND"})).unwrap();
        assert_eq!(payload.message(), Some("Not found"));
    }

    #[test]
    fn parses_cursor_response() {
        let env: ListEnvelope = serde_json::from_value(json!({
            "items": [{"id": "a"}, {"id": "b"}],
            "lastId": "b",
            "hasNext": true
        }))
        .unwrap();
        let page = env.into_cursor_page(&[], 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.cursor, Some(CursorToken::new("b")));
        assert!(page.has_next);
    }

    #[test]
    fn numeric_last_id_and_tiebreakers() {
        let env: ListEnvelope = serde_json::from_value(json!({
            "data": [{"id": 7, "createdAt": "2024-01-02", "email": "z@z"}],
            "lastId": 7,
            "lastCreatedAt": "2024-01-02"
        }))
        .unwrap();
        let page = env.into_cursor_page(
            &[
                Tiebreaker::new("lastCreatedAt", "createdAt"),
                Tiebreaker::new("lastEmail", "email"),
            ],
            10,
        );
        let cursor = page.cursor.unwrap();
        assert_eq!(cursor.last_id, "7");
        assert_eq!(cursor.tiebreakers.get("lastCreatedAt").unwrap(), "2024-01-02");
        // taken from the last row because the envelope left it out
        assert_eq!(cursor.tiebreakers.get("lastEmail").unwrap(), "z@z");
        // short page without hasNext: no more rows
        assert!(!page.has_next);
    }

    #[test]
    fn missing_last_id_falls_back_to_last_row() {
        let env: ListEnvelope =
            serde_json::from_value(json!({"list": [{"id": "x"}, {"_id": "y"}]})).unwrap();
        let page = env.into_cursor_page(&[], 2);
        assert_eq!(page.cursor, Some(CursorToken::new("y")));
        assert!(page.has_next, "a full page with a cursor implies more rows");
    }

    #[test]
    fn empty_response_has_no_cursor() {
        let env: ListEnvelope = serde_json::from_value(json!({"rows": []})).unwrap();
        let page = env.into_cursor_page(&[], 10);
        assert!(page.items.is_empty());
        assert!(page.cursor.is_none());
        assert!(!page.has_next);
    }

    #[test]
    fn offset_totals() {
        let env: ListEnvelope = serde_json::from_value(json!({
            "items": [{"id": 1}],
            "nbTotalElements": 51,
        }))
        .unwrap();
        let page = env.into_offset_page(25);
        assert_eq!(page.total_elements, 51);
        assert_eq!(page.total_pages, 3);

        let env: ListEnvelope = serde_json::from_value(json!({
            "items": [],
            "total": 10,
            "nbTotalPage": 4,
        }))
        .unwrap();
        assert_eq!(env.into_offset_page(25).total_pages, 4);
    }

    #[test]
    fn error_payload_prefers_message() {
        let payload: ErrorPayload =
            serde_json::from_value(json!({"message": "duplicated TXID", "error": "Conflict"}))
                .unwrap();
        assert_eq!(payload.message(), Some("duplicated TXID"));

        let payload: ErrorPayload = serde_json::from_value(json!({"message": "  "})).unwrap();
        assert_eq!(payload.message(), None);

        let payload: ErrorPayload =
            serde_json::from_value(json!({"error": "already completed"})).unwrap();
        assert_eq!(payload.message(), Some("already completed"));
    }

    #[test]
    fn ids_body_is_always_an_array() {
        let body = IdsBody {
            ids: vec!["only".into()],
        };
        assert_eq!(serde_json::to_value(body).unwrap(), json!({"ids": ["only"]}));
    }
}

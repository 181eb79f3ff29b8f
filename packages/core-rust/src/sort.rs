//! Sort model and client-side row ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Sort direction for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One entry of a sort model: `{ field, sort }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortItem {
    pub field: String,
    pub sort: SortDirection,
}

impl SortItem {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sort: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sort: SortDirection::Desc,
        }
    }
}

/// Where sorting happens for a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// The server orders rows; the client never re-sorts.
    #[default]
    Server,
    /// Rows are ordered locally after they arrive.
    Client,
}

/// Encodes a sort model as the `sort` query parameter: `field:asc,field:desc`.
#[must_use]
pub fn encode_sort_param(model: &[SortItem]) -> String {
    model
        .iter()
        .map(|item| format!("{}:{}", item.field, item.sort.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Stable multi-column sort of JSON rows.
///
/// Numbers compare numerically, strings lexicographically, booleans false
/// before true. Missing and null values always sort last, whatever the
/// direction.
pub fn sort_rows(rows: &mut [JsonValue], model: &[SortItem]) {
    if model.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for item in model {
            let ord = compare_cells(a.get(&item.field), b.get(&item.field), item.sort);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare_cells(a: Option<&JsonValue>, b: Option<&JsonValue>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ord = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => compare_present(a, b),
    };
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn compare_present(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        // Mixed types fall back to their JSON text so the order is at least total.
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ids(rows: &[JsonValue]) -> Vec<&str> {
        rows.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn numbers_sort_numerically() {
        let mut rows = vec![
            json!({"id": "a", "amount": 10}),
            json!({"id": "b", "amount": 9}),
            json!({"id": "c", "amount": 100}),
        ];
        sort_rows(&mut rows, &[SortItem::asc("amount")]);
        assert_eq!(ids(&rows), ["b", "a", "c"]);

        sort_rows(&mut rows, &[SortItem::desc("amount")]);
        assert_eq!(ids(&rows), ["c", "a", "b"]);
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        let mut rows = vec![
            json!({"id": "a", "name": null}),
            json!({"id": "b", "name": "zed"}),
            json!({"id": "c"}),
            json!({"id": "d", "name": "amy"}),
        ];
        sort_rows(&mut rows, &[SortItem::asc("name")]);
        assert_eq!(ids(&rows)[..2], ["d", "b"]);

        sort_rows(&mut rows, &[SortItem::desc("name")]);
        assert_eq!(ids(&rows)[..2], ["b", "d"]);
    }

    #[test]
    fn ties_fall_through_to_next_item_and_stay_stable() {
        let mut rows = vec![
            json!({"id": "a", "status": "OK", "n": 2}),
            json!({"id": "b", "status": "OK", "n": 1}),
            json!({"id": "c", "status": "FAIL", "n": 1}),
            json!({"id": "d", "status": "OK", "n": 1}),
        ];
        sort_rows(&mut rows, &[SortItem::asc("status"), SortItem::asc("n")]);
        assert_eq!(ids(&rows), ["c", "b", "d", "a"]);
    }

    #[test]
    fn empty_model_keeps_server_order() {
        let mut rows = vec![json!({"id": "z"}), json!({"id": "a"})];
        sort_rows(&mut rows, &[]);
        assert_eq!(ids(&rows), ["z", "a"]);
    }

    #[test]
    fn sort_param_encoding() {
        let param = encode_sort_param(&[SortItem::desc("createdAt"), SortItem::asc("email")]);
        assert_eq!(param, "createdAt:desc,email:asc");
        assert_eq!(encode_sort_param(&[]), "");
    }
}

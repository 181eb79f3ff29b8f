//! List request parameters and their query-string encoding.
//!
//! A [`ListRequest`] holds everything that selects rows (search, dates,
//! status, screen-specific parameters, sort, column filters) plus how to page
//! through them. The selection part forms the list's filter key. Paging is
//! kept out of it, so a filter change can be told apart from a page change.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::filter::FilterModel;
use crate::key::{KeyPart, QueryKey};
use crate::page::CursorToken;
use crate::sort::{encode_sort_param, SortItem};

/// `limit` sent for mass fetches (export of the whole filtered set).
pub const MASS_FETCH_LIMIT: u32 = 1_000_000;

/// Request rejected before it is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("limit must be greater than zero")]
    ZeroLimit,
    #[error("page numbers start at 1")]
    ZeroPage,
    #[error("date range starts ({from}) after it ends ({to})")]
    InvertedDateRange { from: NaiveDate, to: NaiveDate },
    #[error("filter on `{field}` has an empty or inverted value")]
    MalformedFilter { field: String },
    #[error("required field `{field}` is missing")]
    MissingField { field: String },
}

/// Which pair of parameter names a list endpoint uses for its date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DateParamStyle {
    /// `from_date` / `to_date`
    #[default]
    FromTo,
    /// `startDate` / `endDate`
    StartEnd,
}

impl DateParamStyle {
    #[must_use]
    pub fn names(self) -> (&'static str, &'static str) {
        match self {
            Self::FromTo => ("from_date", "to_date"),
            Self::StartEnd => ("startDate", "endDate"),
        }
    }
}

/// Inclusive date range filter. Either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub style: DateParamStyle,
}

impl DateRange {
    #[must_use]
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>, style: DateParamStyle) -> Self {
        Self { from, to, style }
    }
}

/// How a list request pages through its results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Paging {
    /// 1-based page number.
    Offset { page: u32 },
    /// Resume after a cursor; `None` requests the first page.
    Cursor(Option<CursorToken>),
    /// The whole filtered set in one response.
    Mass,
}

/// Parameters of one list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub search_key: Option<String>,
    pub date_range: Option<DateRange>,
    pub status: Option<String>,
    /// Screen-specific parameters (`type`, `network`, `storeId`, ...).
    pub extra: BTreeMap<String, String>,
    pub sort: Vec<SortItem>,
    pub filter_model: FilterModel,
    pub limit: u32,
    pub paging: Paging,
}

impl ListRequest {
    /// An offset-paginated request for `page` with `limit` rows per page.
    #[must_use]
    pub fn offset(page: u32, limit: u32) -> Self {
        Self::with_paging_and_limit(Paging::Offset { page }, limit)
    }

    /// A cursor-paginated request for the first page.
    #[must_use]
    pub fn cursor(limit: u32) -> Self {
        Self::with_paging_and_limit(Paging::Cursor(None), limit)
    }

    fn with_paging_and_limit(paging: Paging, limit: u32) -> Self {
        Self {
            search_key: None,
            date_range: None,
            status: None,
            extra: BTreeMap::new(),
            sort: Vec::new(),
            filter_model: FilterModel::default(),
            limit,
            paging,
        }
    }

    #[must_use]
    pub fn with_search_key(mut self, search_key: impl Into<String>) -> Self {
        self.search_key = Some(search_key.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    #[must_use]
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Vec<SortItem>) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn with_filter_model(mut self, model: FilterModel) -> Self {
        self.filter_model = model;
        self
    }

    #[must_use]
    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    /// Same selection, asking for the whole result set.
    #[must_use]
    pub fn for_mass_fetch(&self) -> Self {
        self.clone().with_paging(Paging::Mass)
    }

    /// Whether `other` selects the same rows (paging ignored).
    #[must_use]
    pub fn same_selection(&self, other: &Self) -> bool {
        self.filter_key() == other.filter_key()
    }

    fn trimmed_search_key(&self) -> Option<&str> {
        self.search_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The selection part of the request as one normalised key part.
    #[must_use]
    pub fn filter_key(&self) -> KeyPart {
        let mut map = BTreeMap::new();
        map.insert("searchKey".to_string(), self.trimmed_search_key().into());
        map.insert("status".to_string(), self.status.clone().into());
        if let Some(range) = &self.date_range {
            let (from_name, to_name) = range.style.names();
            map.insert(from_name.to_string(), range.from.map(|d| d.to_string()).into());
            map.insert(to_name.to_string(), range.to.map(|d| d.to_string()).into());
        }
        for (name, value) in &self.extra {
            map.insert(format!("extra.{name}"), value.as_str().into());
        }
        map.insert(
            "sort".to_string(),
            KeyPart::List(
                self.sort
                    .iter()
                    .map(|s| KeyPart::Str(format!("{}:{}", s.field, s.sort.as_str())))
                    .collect(),
            ),
        );
        let filters = serde_json::to_value(&self.filter_model)
            .map_or(KeyPart::Null, |v| KeyPart::from_json(&v));
        map.insert("filters".to_string(), filters);
        map.insert("limit".to_string(), self.limit.into());
        KeyPart::Map(map)
    }

    /// Full cache key: entity, selection, then paging position.
    #[must_use]
    pub fn query_key(&self, entity: &str) -> QueryKey {
        let position = match &self.paging {
            Paging::Offset { page } => KeyPart::from(*page),
            Paging::Cursor(None) => KeyPart::Null,
            Paging::Cursor(Some(cursor)) => KeyPart::List(
                cursor
                    .query_pairs()
                    .into_iter()
                    .map(|(_, v)| KeyPart::Str(v))
                    .collect(),
            ),
            Paging::Mass => KeyPart::from("mass"),
        };
        QueryKey::new(entity).with(self.filter_key()).with(position)
    }

    /// Key shared by every page of this selection.
    #[must_use]
    pub fn selection_key(&self, entity: &str) -> QueryKey {
        QueryKey::new(entity).with(self.filter_key())
    }

    /// Checks the request before it is sent.
    ///
    /// # Errors
    ///
    /// Returns the first problem found; a request that fails here must not be sent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == 0 && self.paging != Paging::Mass {
            return Err(ValidationError::ZeroLimit);
        }
        if self.paging == (Paging::Offset { page: 0 }) {
            return Err(ValidationError::ZeroPage);
        }
        if let Some(DateRange {
            from: Some(from),
            to: Some(to),
            ..
        }) = self.date_range
        {
            if from > to {
                return Err(ValidationError::InvertedDateRange { from, to });
            }
        }
        if let Some(clause) = self.filter_model.first_malformed() {
            return Err(ValidationError::MalformedFilter {
                field: clause.field.clone(),
            });
        }
        Ok(())
    }

    /// Encodes the request as query-string pairs.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(search_key) = self.trimmed_search_key() {
            pairs.push(("searchKey".to_string(), search_key.to_string()));
        }
        if let Some(range) = &self.date_range {
            let (from_name, to_name) = range.style.names();
            if let Some(from) = range.from {
                pairs.push((from_name.to_string(), from.format("%Y-%m-%d").to_string()));
            }
            if let Some(to) = range.to {
                pairs.push((to_name.to_string(), to.format("%Y-%m-%d").to_string()));
            }
        }
        if let Some(status) = &self.status {
            pairs.push(("status".to_string(), status.clone()));
        }
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        if !self.sort.is_empty() {
            pairs.push(("sort".to_string(), encode_sort_param(&self.sort)));
        }
        if !self.filter_model.is_empty() {
            if let Ok(encoded) = serde_json::to_string(&self.filter_model) {
                pairs.push(("filters".to_string(), encoded));
            }
        }
        match &self.paging {
            Paging::Offset { page } => {
                pairs.push(("limit".to_string(), self.limit.to_string()));
                pairs.push(("page".to_string(), page.to_string()));
            }
            Paging::Cursor(cursor) => {
                pairs.push(("limit".to_string(), self.limit.to_string()));
                if let Some(cursor) = cursor {
                    pairs.extend(cursor.query_pairs());
                }
            }
            Paging::Mass => {
                pairs.push(("limit".to_string(), MASS_FETCH_LIMIT.to_string()));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterClause, FilterOperator, LinkOperator};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn offset_request_pairs() {
        let req = ListRequest::offset(3, 25)
            .with_search_key("  alice ")
            .with_status("PENDING")
            .with_date_range(DateRange::new(
                Some(date(2024, 1, 1)),
                Some(date(2024, 1, 31)),
                DateParamStyle::FromTo,
            ));
        assert_eq!(
            req.query_pairs(),
            vec![
                pair("searchKey", "alice"),
                pair("from_date", "2024-01-01"),
                pair("to_date", "2024-01-31"),
                pair("status", "PENDING"),
                pair("limit", "25"),
                pair("page", "3"),
            ]
        );
    }

    #[test]
    fn cursor_request_sends_all_cursor_fields() {
        let cursor = CursorToken::new("b").with_tiebreaker("lastCreatedAt", "2024-02-02");
        let req = ListRequest::cursor(20)
            .with_date_range(DateRange::new(None, Some(date(2024, 3, 1)), DateParamStyle::StartEnd))
            .with_paging(Paging::Cursor(Some(cursor)));
        assert_eq!(
            req.query_pairs(),
            vec![
                pair("endDate", "2024-03-01"),
                pair("limit", "20"),
                pair("lastId", "b"),
                pair("lastCreatedAt", "2024-02-02"),
            ]
        );
    }

    #[test]
    fn mass_fetch_keeps_filters_and_drops_paging() {
        let req = ListRequest::offset(4, 25)
            .with_status("DONE")
            .with_sort(vec![SortItem::desc("createdAt")]);
        let mass = req.for_mass_fetch();
        assert_eq!(
            mass.query_pairs(),
            vec![
                pair("status", "DONE"),
                pair("sort", "createdAt:desc"),
                pair("limit", &MASS_FETCH_LIMIT.to_string()),
            ]
        );
        assert!(mass.same_selection(&req));
    }

    #[test]
    fn blank_search_key_is_not_sent_and_not_part_of_selection() {
        let blank = ListRequest::cursor(10).with_search_key("   ");
        let none = ListRequest::cursor(10);
        assert!(blank.query_pairs().iter().all(|(k, _)| k != "searchKey"));
        assert!(blank.same_selection(&none));
    }

    #[test]
    fn paging_is_not_part_of_the_selection() {
        let page1 = ListRequest::offset(1, 25).with_status("A");
        let page2 = ListRequest::offset(2, 25).with_status("A");
        assert!(page1.same_selection(&page2));
        assert_ne!(page1.query_key("users"), page2.query_key("users"));
        assert_eq!(page1.selection_key("users"), page2.selection_key("users"));
        assert!(page2.query_key("users").starts_with(&page2.selection_key("users")));
    }

    #[test]
    fn filter_changes_change_the_selection() {
        let base = ListRequest::cursor(10);
        let filtered = base.clone().with_filter_model(FilterModel::new(
            vec![FilterClause::new("email", FilterOperator::Contains("@corp".into()))],
            LinkOperator::And,
        ));
        assert!(!base.same_selection(&filtered));
        assert!(filtered.query_pairs().iter().any(|(k, _)| k == "filters"));
    }

    #[test]
    fn validation_catches_bad_requests() {
        assert_eq!(ListRequest::offset(1, 0).validate(), Err(ValidationError::ZeroLimit));
        assert_eq!(ListRequest::offset(0, 10).validate(), Err(ValidationError::ZeroPage));

        let inverted = ListRequest::cursor(10).with_date_range(DateRange::new(
            Some(date(2024, 5, 2)),
            Some(date(2024, 5, 1)),
            DateParamStyle::FromTo,
        ));
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvertedDateRange { .. })
        ));

        let malformed = ListRequest::cursor(10).with_filter_model(FilterModel::new(
            vec![FilterClause::new("tags", FilterOperator::IsAnyOf(vec![]))],
            LinkOperator::And,
        ));
        assert_eq!(
            malformed.validate(),
            Err(ValidationError::MalformedFilter {
                field: "tags".into()
            })
        );

        assert!(ListRequest::offset(1, 10).validate().is_ok());
    }
}

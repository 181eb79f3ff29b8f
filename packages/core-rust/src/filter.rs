//! Grid filter model.
//!
//! A [`FilterModel`] is a flat list of [`FilterClause`]s joined by one shared
//! [`LinkOperator`]. Each clause carries a [`FilterOperator`] whose variant
//! fixes the type of its value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Boolean operator shared by every clause in a [`FilterModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkOperator {
    #[default]
    And,
    Or,
}

/// Closed set of filter operators.
///
/// Serialized as `{"operator": "<tag>", "value": ...}`. The tags match the
/// operator names the grid widget emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", content = "value")]
pub enum FilterOperator {
    // --- text ---
    #[serde(rename = "contains")]
    Contains(String),
    #[serde(rename = "equals")]
    Equals(String),
    #[serde(rename = "startsWith")]
    StartsWith(String),
    #[serde(rename = "endsWith")]
    EndsWith(String),
    #[serde(rename = "isAnyOf")]
    IsAnyOf(Vec<String>),

    // --- numeric ---
    #[serde(rename = "=")]
    NumberEquals(f64),
    #[serde(rename = "!=")]
    NumberNotEquals(f64),
    #[serde(rename = ">")]
    GreaterThan(f64),
    #[serde(rename = ">=")]
    GreaterThanOrEqual(f64),
    #[serde(rename = "<")]
    LessThan(f64),
    #[serde(rename = "<=")]
    LessThanOrEqual(f64),
    #[serde(rename = "between")]
    NumberBetween { min: f64, max: f64 },

    // --- dates ---
    #[serde(rename = "is")]
    DateIs(NaiveDate),
    #[serde(rename = "after")]
    After(NaiveDate),
    #[serde(rename = "onOrAfter")]
    OnOrAfter(NaiveDate),
    #[serde(rename = "before")]
    Before(NaiveDate),
    #[serde(rename = "onOrBefore")]
    OnOrBefore(NaiveDate),
    #[serde(rename = "dateBetween")]
    DateBetween { from: NaiveDate, to: NaiveDate },

    // --- presence ---
    #[serde(rename = "isEmpty")]
    IsEmpty,
    #[serde(rename = "isNotEmpty")]
    IsNotEmpty,
}

impl FilterOperator {
    /// The wire tag of this operator.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Contains(_) => "contains",
            Self::Equals(_) => "equals",
            Self::StartsWith(_) => "startsWith",
            Self::EndsWith(_) => "endsWith",
            Self::IsAnyOf(_) => "isAnyOf",
            Self::NumberEquals(_) => "=",
            Self::NumberNotEquals(_) => "!=",
            Self::GreaterThan(_) => ">",
            Self::GreaterThanOrEqual(_) => ">=",
            Self::LessThan(_) => "<",
            Self::LessThanOrEqual(_) => "<=",
            Self::NumberBetween { .. } => "between",
            Self::DateIs(_) => "is",
            Self::After(_) => "after",
            Self::OnOrAfter(_) => "onOrAfter",
            Self::Before(_) => "before",
            Self::OnOrBefore(_) => "onOrBefore",
            Self::DateBetween { .. } => "dateBetween",
            Self::IsEmpty => "isEmpty",
            Self::IsNotEmpty => "isNotEmpty",
        }
    }

    /// Whether the operator's range bounds are ordered.
    ///
    /// Single-value operators are always well formed.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::NumberBetween { min, max } => min <= max,
            Self::DateBetween { from, to } => from <= to,
            Self::IsAnyOf(values) => !values.is_empty(),
            _ => true,
        }
    }
}

/// A single filter condition on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    #[serde(flatten)]
    pub operator: FilterOperator,
}

impl FilterClause {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: FilterOperator) -> Self {
        Self {
            field: field.into(),
            operator,
        }
    }
}

/// Every active filter clause plus the operator joining them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterModel {
    #[serde(default)]
    pub items: Vec<FilterClause>,
    #[serde(default)]
    pub link_operator: LinkOperator,
}

impl FilterModel {
    #[must_use]
    pub fn new(items: Vec<FilterClause>, link_operator: LinkOperator) -> Self {
        Self {
            items,
            link_operator,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops clauses that reference fields outside `known`.
    pub fn retain_fields(&mut self, known: impl Fn(&str) -> bool) {
        self.items.retain(|clause| known(&clause.field));
    }

    /// The first clause whose operator is malformed, if any.
    #[must_use]
    pub fn first_malformed(&self) -> Option<&FilterClause> {
        self.items.iter().find(|c| !c.operator.is_well_formed())
    }
}

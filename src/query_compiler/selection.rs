//! Field-selection trees and pagination arguments
//!
//! A selection is a JSON object mapping logical field names to either an empty marker
//! (scalar) or a nested selection (relationship). A node may carry an `__arguments` child with
//! a relation-scoped filter and pagination:
//!
//! ```json
//! {
//!   "id": {},
//!   "members": {
//!     "name": {},
//!     "__arguments": {
//!       "filter": { "name_like": "F%" },
//!       "pagination": { "limit": 5, "offset": 2, "orderBy": [{ "name": "asc" }] }
//!     }
//!   }
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::errors::CompileError;

/// Reserved key of the arguments marker
pub const ARGUMENTS_KEY: &str = "__arguments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// One ordering term
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        OrderBy {
            field: field.into(),
            direction,
        }
    }
}

/// Limit, offset and ordering for the root query or one relation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_order_by")]
    pub order_by: Vec<OrderBy>,
}

impl Pagination {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none() && self.order_by.is_empty()
    }

    pub fn from_value(value: &Value) -> Result<Self, CompileError> {
        Pagination::deserialize(value).map_err(|e| CompileError::InvalidPagination(e.to_string()))
    }
}

/// Accepts `[{"name": "asc"}, {"born": "desc"}]` or a single `{"name": "asc", "born": "desc"}`
fn deserialize_order_by<'de, D>(deserializer: D) -> Result<Vec<OrderBy>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Terms {
        List(Vec<Map<String, Value>>),
        Single(Map<String, Value>),
    }

    let terms = match Option::<Terms>::deserialize(deserializer)? {
        None => return Ok(Vec::new()),
        Some(Terms::List(list)) => list,
        Some(Terms::Single(map)) => vec![map],
    };

    let mut order_by = Vec::new();
    for term in terms {
        for (field, direction) in term {
            let direction =
                SortDirection::deserialize(direction).map_err(serde::de::Error::custom)?;
            order_by.push(OrderBy { field, direction });
        }
    }
    Ok(order_by)
}

/// Relation-scoped arguments carried by the `__arguments` marker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionArguments {
    pub filter: Option<Map<String, Value>>,
    pub pagination: Option<Pagination>,
}

/// A node of the selection tree
#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    Scalar,
    Nested(FieldSelection),
}

/// Ordered selection of fields, plus optional arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSelection {
    pub fields: Vec<(String, FieldNode)>,
    pub arguments: Option<SelectionArguments>,
}

impl FieldSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar field
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push((name.into(), FieldNode::Scalar));
        self
    }

    /// Add a nested selection
    pub fn nested(mut self, name: impl Into<String>, selection: FieldSelection) -> Self {
        self.fields.push((name.into(), FieldNode::Nested(selection)));
        self
    }

    pub fn with_filter(mut self, filter: Map<String, Value>) -> Self {
        self.arguments.get_or_insert_with(Default::default).filter = Some(filter);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.arguments.get_or_insert_with(Default::default).pagination = Some(pagination);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a selection tree from JSON
    pub fn from_value(value: &Value) -> Result<Self, CompileError> {
        let object = value.as_object().ok_or_else(|| {
            CompileError::InvalidSelection(format!("expected an object, got {}", value))
        })?;

        let mut selection = FieldSelection::new();
        for (key, child) in object {
            if key == ARGUMENTS_KEY {
                selection.arguments = Some(parse_arguments(child)?);
                continue;
            }
            let node = match child {
                Value::Null | Value::Bool(true) => FieldNode::Scalar,
                Value::Object(map) if map.is_empty() => FieldNode::Scalar,
                Value::Object(_) => FieldNode::Nested(FieldSelection::from_value(child)?),
                other => {
                    return Err(CompileError::InvalidSelection(format!(
                        "field '{}' must map to an object, got {}",
                        key, other
                    )))
                }
            };
            selection.fields.push((key.clone(), node));
        }
        Ok(selection)
    }
}

fn parse_arguments(value: &Value) -> Result<SelectionArguments, CompileError> {
    let object = value.as_object().ok_or_else(|| {
        CompileError::InvalidSelection(format!("{} must be an object", ARGUMENTS_KEY))
    })?;

    let filter = match object.get("filter") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(other) => {
            return Err(CompileError::InvalidSelection(format!(
                "filter must be an object, got {}",
                other
            )))
        }
    };
    let pagination = match object.get("pagination") {
        None | Some(Value::Null) => None,
        Some(value) => Some(Pagination::from_value(value)?),
    };

    Ok(SelectionArguments { filter, pagination })
}

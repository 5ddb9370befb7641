use thiserror::Error;

use crate::entity_catalog::MetadataError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("Cannot resolve field '{key}' on alias {alias} (not a property, case variant or computed field)")]
    UnresolvedField { alias: String, key: String },
    #[error("Unknown filter operator '{operator}' on alias {alias}")]
    UnknownOperator { alias: String, operator: String },
    #[error("Operator '{operator}' expects {expected}, got {found}")]
    InvalidOperatorValue {
        operator: String,
        expected: &'static str,
        found: String,
    },
    #[error("Field '{field}' spans {columns} columns but the value has {values} element(s)")]
    ColumnArityMismatch {
        field: String,
        columns: usize,
        values: usize,
    },
    #[error("Bound parameter '{0}' is defined twice in one statement")]
    DuplicateBinding(String),
    #[error("Invalid field selection: {0}")]
    InvalidSelection(String),
    #[error("Invalid filter on alias {alias}: {message}")]
    InvalidFilter { alias: String, message: String },
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),
    #[error("Relation '{entity}.{field}' ({reference}) cannot be rendered: {reason}")]
    UnsupportedReference {
        entity: String,
        field: String,
        reference: String,
        reason: String,
    },
    #[error("Nesting depth {depth} exceeds the configured maximum of {max}")]
    MaxDepthExceeded { depth: u32, max: u32 },
}

impl CompileError {
    pub fn unresolved_field(alias: impl ToString, key: impl Into<String>) -> Self {
        CompileError::UnresolvedField {
            alias: alias.to_string(),
            key: key.into(),
        }
    }

    pub fn invalid_filter(alias: impl ToString, message: impl Into<String>) -> Self {
        CompileError::InvalidFilter {
            alias: alias.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_value(
        operator: impl Into<String>,
        expected: &'static str,
        found: &serde_json::Value,
    ) -> Self {
        CompileError::InvalidOperatorValue {
            operator: operator.into(),
            expected,
            found: found.to_string(),
        }
    }
}

//! # Entity Catalog Error Types
//!
//! Errors raised while loading or consulting entity metadata. Every variant signals invalid
//! static configuration: they are raised before any SQL runs and are never retried.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetadataError {
    #[error("No entity metadata found for `{entity}`")]
    UnknownEntity { entity: String },
    #[error("Property `{entity}.{property}` not found")]
    UnknownProperty { entity: String, property: String },
    #[error(
        "Column count mismatch on `{entity}.{property}`: {side} declares {found} column(s) but {expected} are required"
    )]
    ColumnCountMismatch {
        entity: String,
        property: String,
        side: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Primary key column `{column}` of `{entity}` does not back any property")]
    PrimaryKeyWithoutProperty { entity: String, column: String },
    #[error("Entity `{entity}` declares no primary key columns")]
    MissingPrimaryKey { entity: String },
    #[error("Relation `{entity}.{property}` is missing its {what}")]
    IncompleteRelation {
        entity: String,
        property: String,
        what: &'static str,
    },
    #[error("Invalid SQL identifier `{identifier}` in `{context}`")]
    InvalidIdentifier { identifier: String, context: String },
    #[error("Duplicate entity definition `{entity}`")]
    DuplicateEntity { entity: String },
    #[error("Failed to read metadata file: {error}")]
    ReadError { error: String },
    #[error("Failed to parse metadata: {error}")]
    ParseError { error: String },
}

impl MetadataError {
    /// Create an IncompleteRelation error
    pub fn incomplete_relation(
        entity: impl Into<String>,
        property: impl Into<String>,
        what: &'static str,
    ) -> Self {
        MetadataError::IncompleteRelation {
            entity: entity.into(),
            property: property.into(),
            what,
        }
    }

    /// Create a ColumnCountMismatch error
    pub fn column_count_mismatch(
        entity: impl Into<String>,
        property: impl Into<String>,
        side: &'static str,
        expected: usize,
        found: usize,
    ) -> Self {
        MetadataError::ColumnCountMismatch {
            entity: entity.into(),
            property: property.into(),
            side,
            expected,
            found,
        }
    }
}

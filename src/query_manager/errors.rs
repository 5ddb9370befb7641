use thiserror::Error;

use crate::entity_catalog::MetadataError;
use crate::query_compiler::CompileError;

use super::executor::ExecutorError;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query request does not name an entity")]
    MissingEntity,
    #[error("Entity '{0}' is not known to the metadata provider")]
    UnknownEntity(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{0}")]
    Execution(ExecutorError),
    #[error("Row {index}: {message}")]
    InvalidRow { index: usize, message: String },
}

impl From<MetadataError> for QueryError {
    fn from(error: MetadataError) -> Self {
        QueryError::Compile(CompileError::Metadata(error))
    }
}

impl QueryError {
    pub fn invalid_row(index: usize, message: impl Into<String>) -> Self {
        QueryError::InvalidRow {
            index,
            message: message.into(),
        }
    }
}

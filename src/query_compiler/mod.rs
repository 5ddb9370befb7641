//! Query compiler: selection tree + filter + pagination -> one PostgreSQL statement

pub mod alias;
pub mod common;
pub mod custom_fields;
mod errors;
pub mod field_resolver;
pub mod filter_processor;
pub mod mapper;
pub mod mapping;
pub mod operations;
mod placeholders;
pub mod relationship_handler;
pub mod selection;
pub mod sql_builder;

pub use alias::{Alias, AliasKind, AliasManager};
pub use custom_fields::{CustomField, CustomFieldRegistry, RAW_COLUMNS_KEY};
pub use errors::CompileError;
pub use mapper::{CompiledQuery, Mapper, QueryInput};
pub use mapping::Bindings;
pub use placeholders::{PlaceholderError, PositionalQuery};
pub use selection::{FieldNode, FieldSelection, OrderBy, Pagination, SortDirection, ARGUMENTS_KEY};

use crate::config::CompilerConfig;
use crate::entity_catalog::MetadataProvider;

/// Compile one request with a fresh alias context
pub fn build_query_and_bindings_for(
    metadata: &dyn MetadataProvider,
    config: &CompilerConfig,
    input: &QueryInput<'_>,
) -> Result<CompiledQuery, CompileError> {
    Mapper::new(metadata, config).build_query_and_bindings_for(input)
}

//! Shared metadata and compile helpers

use nestql::config::CompilerConfig;
use nestql::entity_catalog::MetadataRegistry;
use nestql::query_compiler::{
    build_query_and_bindings_for, CompileError, CompiledQuery, FieldSelection, Pagination,
    QueryInput,
};
use serde_json::Value;

pub fn middle_earth() -> MetadataRegistry {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/middle_earth.yaml");
    MetadataRegistry::from_yaml_file(path).expect("fixture metadata should load")
}

/// Compile `fields` (+ optional filter and pagination JSON) with the default config
pub fn compile(
    entity: &str,
    fields: Value,
    filter: Option<Value>,
    pagination: Option<Value>,
) -> Result<CompiledQuery, CompileError> {
    let registry = middle_earth();
    let config = CompilerConfig::default();
    let fields = FieldSelection::from_value(&fields)?;
    let filter = filter.map(|f| f.as_object().cloned().expect("filter must be an object"));
    let pagination = pagination.map(|p| Pagination::from_value(&p)).transpose()?;

    let mut input = QueryInput::new(entity, &fields);
    input.filter = filter.as_ref();
    input.pagination = pagination.as_ref();
    build_query_and_bindings_for(&registry, &config, &input)
}

//! Query Manager - the entry point resolvers call
//!
//! Turns a request into a compiled statement, hands it to the injected [`QueryExecutor`], and
//! turns the returned `val` column of each row back into a plain JSON record. Computed fields
//! are filled in from the hidden raw-column objects once the rows are back.

mod errors;
pub mod executor;

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::CompilerConfig;
use crate::entity_catalog::{EntityMetadata, MetadataProvider};
use crate::query_compiler::field_resolver::{FieldResolver, ResolvedField};
use crate::query_compiler::{
    CompiledQuery, CustomFieldRegistry, FieldNode, FieldSelection, Mapper, Pagination, QueryInput,
    RAW_COLUMNS_KEY,
};

pub use errors::QueryError;
pub use executor::{ExecutorError, QueryExecutor, Row, ROW_COLUMN};

/// Where a request comes from: a deserialized request, a GraphQL resolver context, ...
pub trait SelectionSource: Send + Sync {
    fn entity_name(&self) -> Option<&str>;

    fn selection(&self) -> Result<FieldSelection, QueryError>;

    fn filter(&self) -> Option<&Map<String, Value>> {
        None
    }

    fn pagination(&self) -> Option<&Pagination> {
        None
    }
}

/// A request as JSON
///
/// ```json
/// {
///   "entity": "Fellowship",
///   "fields": { "name": {}, "members": { "name": {} } },
///   "filter": { "name_like": "The%" },
///   "pagination": { "limit": 10 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub fields: Value,
    #[serde(default)]
    pub filter: Option<Map<String, Value>>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl QueryRequest {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl SelectionSource for QueryRequest {
    fn entity_name(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    fn selection(&self) -> Result<FieldSelection, QueryError> {
        if self.fields.is_null() {
            return Ok(FieldSelection::new());
        }
        Ok(FieldSelection::from_value(&self.fields)?)
    }

    fn filter(&self) -> Option<&Map<String, Value>> {
        self.filter.as_ref()
    }

    fn pagination(&self) -> Option<&Pagination> {
        self.pagination.as_ref()
    }
}

pub struct QueryManager {
    metadata: Arc<dyn MetadataProvider>,
    executor: Arc<dyn QueryExecutor>,
    config: CompilerConfig,
    custom_fields: CustomFieldRegistry,
}

impl QueryManager {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        executor: Arc<dyn QueryExecutor>,
        config: CompilerConfig,
    ) -> Self {
        QueryManager {
            metadata,
            executor,
            config,
            custom_fields: CustomFieldRegistry::new(),
        }
    }

    pub fn with_custom_fields(mut self, custom_fields: CustomFieldRegistry) -> Self {
        self.custom_fields = custom_fields;
        self
    }

    pub fn custom_fields_mut(&mut self) -> &mut CustomFieldRegistry {
        &mut self.custom_fields
    }

    /// Compile without executing
    pub fn build_query(&self, source: &dyn SelectionSource) -> Result<CompiledQuery, QueryError> {
        let (_, _, query) = self.compile(source)?;
        Ok(query)
    }

    /// Compile, execute and decode one request
    pub async fn get_query_results_for(
        &self,
        source: &dyn SelectionSource,
    ) -> Result<Vec<Value>, QueryError> {
        let (entity, selection, query) = self.compile(source)?;

        let rows = self
            .executor
            .execute_query(&query.sql, &query.bindings)
            .await
            .map_err(QueryError::Execution)?;
        log::debug!("{}: executor returned {} row(s)", entity.name, rows.len());

        let mut records = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| decode_row(index, row))
            .collect::<Result<Vec<_>, _>>()?;

        if !self.custom_fields.is_empty() {
            for record in &mut records {
                self.resolve_computed(&entity, &selection, record)?;
            }
        }
        Ok(records)
    }

    /// Run several requests concurrently; the first failure wins
    pub async fn get_many(
        &self,
        sources: &[&dyn SelectionSource],
    ) -> Result<Vec<Vec<Value>>, QueryError> {
        try_join_all(
            sources
                .iter()
                .map(|source| self.get_query_results_for(*source)),
        )
        .await
    }

    fn compile(
        &self,
        source: &dyn SelectionSource,
    ) -> Result<(Arc<EntityMetadata>, FieldSelection, CompiledQuery), QueryError> {
        let name = source
            .entity_name()
            .filter(|name| !name.is_empty())
            .ok_or(QueryError::MissingEntity)?;
        if !self.metadata.exists(name) {
            return Err(QueryError::UnknownEntity(name.to_string()));
        }
        let entity = self.metadata.get_metadata(name)?;
        let selection = source.selection()?;

        let mut input = QueryInput::new(name, &selection);
        input.filter = source.filter();
        input.pagination = source.pagination();
        if !self.custom_fields.is_empty() {
            input.custom_fields = Some(&self.custom_fields);
        }

        let query =
            Mapper::new(self.metadata.as_ref(), &self.config).build_query_and_bindings_for(&input)?;
        Ok((entity, selection, query))
    }

    /// Replace computed-field placeholders using each node's raw columns, depth first
    fn resolve_computed(
        &self,
        entity: &EntityMetadata,
        selection: &FieldSelection,
        node: &mut Value,
    ) -> Result<(), QueryError> {
        let object = match node {
            Value::Array(items) => {
                for item in items {
                    self.resolve_computed(entity, selection, item)?;
                }
                return Ok(());
            }
            Value::Object(object) => object,
            _ => return Ok(()),
        };

        let raw = match object.shift_remove(RAW_COLUMNS_KEY) {
            Some(Value::Object(raw)) => raw,
            _ => Map::new(),
        };
        let resolver =
            FieldResolver::new(entity, Some(&self.custom_fields), self.config.case_fallback);

        for (key, child) in &selection.fields {
            match resolver.resolve(key) {
                Some(ResolvedField::Computed(field)) => {
                    object.insert(key.clone(), field.resolve(&raw));
                }
                Some(ResolvedField::Property(property)) if property.is_relation() => {
                    let (FieldNode::Nested(nested), Some(value)) = (child, object.get_mut(key))
                    else {
                        continue;
                    };
                    let target = self.metadata.get_metadata(&property.type_name)?;
                    self.resolve_computed(&target, nested, value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// The `val` column arrives as JSON text or as an already decoded value
fn decode_row(index: usize, mut row: Row) -> Result<Value, QueryError> {
    let value = row
        .shift_remove(ROW_COLUMN)
        .ok_or_else(|| QueryError::invalid_row(index, format!("missing column '{}'", ROW_COLUMN)))?;
    match value {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| QueryError::invalid_row(index, format!("invalid JSON: {}", e))),
        other => Ok(other),
    }
}

//! Mapper - compiles a selection tree, filter and pagination into one statement
//!
//! The same recursive walk serves display and filtering: selected fields become JSON pairs and
//! display joins, filter keys become predicates and existence joins, and both land in
//! [`Mapping`] fragments that are reduced bottom-up. The root fragment renders as
//!
//! ```sql
//! SELECT <json object> AS val FROM "<table>" AS t_e1 <joins> [WHERE ...] [ORDER BY ...] [LIMIT n] [OFFSET m]
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::CompilerConfig;
use crate::entity_catalog::{EntityMetadata, EntityProperty, MetadataProvider};

use super::alias::{Alias, AliasKind, AliasManager};
use super::custom_fields::{CustomFieldRegistry, RAW_COLUMNS_KEY};
use super::errors::CompileError;
use super::field_resolver::{FieldResolver, ResolvedField};
use super::filter_processor::FilterProcessor;
use super::mapping::{Bindings, FilterScope, Mapping};
use super::relationship_handler::{ChildBody, RelationSite, RelationshipHandler};
use super::selection::{FieldNode, FieldSelection, OrderBy, Pagination};
use super::sql_builder::{build_order_by_sql, json_object, SelectParts};

/// One compilation request
#[derive(Debug, Clone, Copy)]
pub struct QueryInput<'r> {
    pub entity: &'r str,
    pub fields: &'r FieldSelection,
    pub filter: Option<&'r Map<String, Value>>,
    pub pagination: Option<&'r Pagination>,
    pub custom_fields: Option<&'r CustomFieldRegistry>,
}

impl<'r> QueryInput<'r> {
    pub fn new(entity: &'r str, fields: &'r FieldSelection) -> Self {
        QueryInput {
            entity,
            fields,
            filter: None,
            pagination: None,
            custom_fields: None,
        }
    }

    pub fn with_filter(mut self, filter: &'r Map<String, Value>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_pagination(mut self, pagination: &'r Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_custom_fields(mut self, custom_fields: &'r CustomFieldRegistry) -> Self {
        self.custom_fields = Some(custom_fields);
        self
    }
}

/// A parameterized statement and the values of its named placeholders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Bindings,
}

/// Per-statement compilation state
pub struct MapContext<'r> {
    pub aliases: AliasManager,
    pub custom_fields: Option<&'r CustomFieldRegistry>,
    depth: u32,
}

impl<'r> MapContext<'r> {
    pub fn new(custom_fields: Option<&'r CustomFieldRegistry>) -> Self {
        MapContext {
            aliases: AliasManager::new(),
            custom_fields,
            depth: 0,
        }
    }

    /// Descend one relation level
    pub fn enter(&mut self, max_depth: u32) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > max_depth {
            return Err(CompileError::MaxDepthExceeded {
                depth: self.depth,
                max: max_depth,
            });
        }
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

pub struct Mapper<'a> {
    metadata: &'a dyn MetadataProvider,
    config: &'a CompilerConfig,
}

impl<'a> Mapper<'a> {
    pub fn new(metadata: &'a dyn MetadataProvider, config: &'a CompilerConfig) -> Self {
        Mapper { metadata, config }
    }

    pub fn metadata(&self) -> &'a dyn MetadataProvider {
        self.metadata
    }

    pub fn config(&self) -> &'a CompilerConfig {
        self.config
    }

    /// Compile one request into `{sql, bindings}`
    pub fn build_query_and_bindings_for(
        &self,
        input: &QueryInput<'_>,
    ) -> Result<CompiledQuery, CompileError> {
        let entity = self.metadata.get_metadata(input.entity)?;
        let mut ctx = MapContext::new(input.custom_fields);
        let alias = ctx.aliases.start(&self.config.alias_prefix);

        let mut mapping =
            self.recursive_map(&mut ctx, &entity, &alias, Some(input.fields), input.filter)?;
        if let Some(pagination) = input.pagination {
            mapping.merge(pagination_fragment(pagination))?;
        }

        let scope = FilterScope::new(&entity.table_name, &alias, &entity.primary_keys);
        let (filter_joins, conditions) = mapping.lower_filters(&scope);

        let mut parts = SelectParts::new(
            format!("{} AS val", self.node_object(&mapping, &alias)),
            scope.from.clone(),
        );
        parts.joins = filter_joins;
        parts.joins.extend(mapping.joins.iter().cloned());
        parts.conditions = conditions;
        parts.order_by = self.order_by_sql(&ctx, &entity, &alias, &mapping.order_by);
        parts.limit = mapping.limit;
        parts.offset = mapping.offset;

        let sql = parts.to_sql();
        log::debug!(
            "Compiled {} query with {} binding(s): {}",
            entity.name,
            mapping.values.len(),
            sql
        );
        Ok(CompiledQuery {
            sql,
            bindings: mapping.values,
        })
    }

    /// Walk one node: its selected fields, its `__arguments` and an optional filter, all at
    /// the same alias
    pub fn recursive_map(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        fields: Option<&FieldSelection>,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Mapping, CompileError> {
        let mut fragments = Vec::new();

        if let Some(selection) = fields {
            let defaulted;
            let selection = if selection.is_empty() {
                defaulted = primary_key_selection(entity, selection);
                &defaulted
            } else {
                selection
            };

            for (key, node) in &selection.fields {
                fragments.push(self.map_field(ctx, entity, alias, key, node)?);
            }

            if let Some(arguments) = &selection.arguments {
                if let Some(filter) = &arguments.filter {
                    let processor = FilterProcessor::new(self);
                    fragments.push(processor.map_filter(ctx, entity, alias, filter)?);
                }
                if let Some(pagination) = &arguments.pagination {
                    fragments.push(pagination_fragment(pagination));
                }
            }
        }

        if let Some(filter) = filter {
            fragments.push(FilterProcessor::new(self).map_filter(ctx, entity, alias, filter)?);
        }

        Mapping::reduce(fragments)
    }

    pub fn resolver<'e>(
        &self,
        ctx: &MapContext<'e>,
        entity: &'e EntityMetadata,
    ) -> FieldResolver<'e> {
        FieldResolver::new(entity, ctx.custom_fields, self.config.case_fallback)
    }

    fn map_field(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        key: &str,
        node: &FieldNode,
    ) -> Result<Mapping, CompileError> {
        let field = self
            .resolver(ctx, entity)
            .resolve(key)
            .ok_or_else(|| CompileError::unresolved_field(alias, key))?;

        match field {
            ResolvedField::Property(property) if property.is_relation() => {
                self.map_relation(ctx, entity, alias, key, property, node)
            }
            ResolvedField::Property(property) => {
                reject_nested(key, node)?;
                let mut fragment = Mapping::new();
                fragment.select.extend(property.columns.iter().cloned());
                fragment
                    .json
                    .push((key.to_string(), scalar_expr(alias, &property.columns)));
                Ok(fragment)
            }
            ResolvedField::Computed(custom) => {
                reject_nested(key, node)?;
                let mut fragment = Mapping::new();
                fragment.select.extend(custom.required_columns.iter().cloned());
                fragment.json.push((key.to_string(), "NULL".to_string()));
                fragment.has_computed = true;
                Ok(fragment)
            }
        }
    }

    fn map_relation(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        key: &str,
        property: &EntityProperty,
        node: &FieldNode,
    ) -> Result<Mapping, CompileError> {
        let child: Arc<EntityMetadata> = self.metadata.get_metadata(&property.type_name)?;
        let empty = FieldSelection::new();
        let selection = match node {
            FieldNode::Scalar => &empty,
            FieldNode::Nested(selection) => selection,
        };

        ctx.enter(self.config.max_nesting_depth)?;
        let child_alias = ctx.aliases.next(AliasKind::Entity, alias.prefix());
        let mut child_mapping =
            self.recursive_map(ctx, &child, &child_alias, Some(selection), None)?;
        ctx.leave();

        let scope = FilterScope::new(&child.table_name, &child_alias, &child.primary_keys);
        let (mut joins, conditions) = child_mapping.lower_filters(&scope);
        joins.extend(child_mapping.joins.iter().cloned());
        let body = ChildBody {
            object: self.node_object(&child_mapping, &child_alias),
            joins,
            conditions,
            order_by: self.order_by_sql(ctx, &child, &child_alias, &child_mapping.order_by),
            limit: child_mapping.limit,
            offset: child_mapping.offset,
        };

        let site = RelationSite {
            parent: entity,
            parent_alias: alias,
            property,
            child: &child,
            child_alias: &child_alias,
        };
        let rendered = RelationshipHandler::new(self.config).render(&mut ctx.aliases, &site, body)?;

        let mut fragment = Mapping::new();
        fragment.joins.push(rendered.join);
        fragment.json.push((key.to_string(), rendered.value));
        fragment.bind_all(std::mem::take(&mut child_mapping.values))?;
        Ok(fragment)
    }

    /// JSON object of a node; computed fields add the hidden raw-column object
    fn node_object(&self, mapping: &Mapping, alias: &Alias) -> String {
        let mut pairs = mapping.json.clone();
        if mapping.has_computed {
            let raw: Vec<(String, String)> = mapping
                .select
                .iter()
                .map(|column| (column.clone(), alias.column(column)))
                .collect();
            pairs.push((
                RAW_COLUMNS_KEY.to_string(),
                json_object(&raw, self.config.json_chunk_size),
            ));
        }
        json_object(&pairs, self.config.json_chunk_size)
    }

    fn order_by_sql(
        &self,
        ctx: &MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        order_by: &[OrderBy],
    ) -> Option<String> {
        let resolver = self.resolver(ctx, entity);
        build_order_by_sql(order_by, |field| {
            resolver
                .scalar_columns(field)
                .map(|columns| alias.columns(columns))
        })
    }
}

fn pagination_fragment(pagination: &Pagination) -> Mapping {
    Mapping {
        limit: pagination.limit,
        offset: pagination.offset,
        order_by: pagination.order_by.clone(),
        ..Default::default()
    }
}

/// A relation selected without sub-fields renders its primary key properties
fn primary_key_selection(entity: &EntityMetadata, selection: &FieldSelection) -> FieldSelection {
    let mut defaulted = FieldSelection {
        fields: Vec::new(),
        arguments: selection.arguments.clone(),
    };
    for property in entity.primary_key_properties() {
        defaulted = defaulted.field(property.name.clone());
    }
    defaulted
}

fn reject_nested(key: &str, node: &FieldNode) -> Result<(), CompileError> {
    match node {
        FieldNode::Nested(selection) if !selection.is_empty() => {
            Err(CompileError::InvalidSelection(format!(
                "'{}' is not a relation and takes no sub-fields",
                key
            )))
        }
        _ => Ok(()),
    }
}

/// A multi-column scalar renders as a JSON array of its columns
fn scalar_expr(alias: &Alias, columns: &[String]) -> String {
    match columns {
        [column] => alias.column(column),
        _ => format!("json_build_array({})", alias.columns(columns).join(", ")),
    }
}

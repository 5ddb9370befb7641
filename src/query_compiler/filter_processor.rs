//! Filter Processor
//!
//! Walks a filter expression against one entity and alias and produces a [`Mapping`] fragment:
//!
//! - `{"id": 1}` and `{"name_like": "F%"}` become predicates on the node's own columns,
//! - `{"age": {"_gte": 18, "_lt": 65}}` applies every operator of the object,
//! - `{"fellowship": {"name": "Company"}}` becomes an `INNER JOIN LATERAL` existence test,
//! - `_or`, `_and` and `_not` keep their children as separate fragments so the lowering pass
//!   can decide where joins go.
//!
//! Every literal is bound under a statement-unique parameter name.

use serde_json::{Map, Value};

use crate::entity_catalog::{EntityMetadata, EntityProperty};

use super::alias::{Alias, AliasKind};
use super::common::column_tuple;
use super::errors::CompileError;
use super::field_resolver::ResolvedField;
use super::mapper::{MapContext, Mapper};
use super::mapping::{FilterScope, Mapping};
use super::operations::{get_operation, split_operator_suffix, Operation};
use super::relationship_handler::{correlation_conditions, RelationSite};
use super::sql_builder::build_filter_join;

pub const OR_KEY: &str = "_or";
pub const AND_KEY: &str = "_and";
pub const NOT_KEY: &str = "_not";

pub struct FilterProcessor<'m, 'a> {
    mapper: &'m Mapper<'a>,
}

impl<'m, 'a> FilterProcessor<'m, 'a> {
    pub fn new(mapper: &'m Mapper<'a>) -> Self {
        FilterProcessor { mapper }
    }

    /// Map every key of `filter` at `alias` and reduce the results
    pub fn map_filter(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        filter: &Map<String, Value>,
    ) -> Result<Mapping, CompileError> {
        let mut fragments = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            let fragment = match key.as_str() {
                OR_KEY => self.map_or(ctx, entity, alias, value)?,
                AND_KEY => self.map_and(ctx, entity, alias, value)?,
                NOT_KEY => self.map_not(ctx, entity, alias, value)?,
                _ => self.map_key(ctx, entity, alias, key, value)?,
            };
            fragments.push(fragment);
        }
        Mapping::reduce(fragments)
    }

    /// Any of the siblings
    fn map_or(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        value: &Value,
    ) -> Result<Mapping, CompileError> {
        let mut siblings = self.map_siblings(ctx, entity, alias, OR_KEY, value)?;
        let mut group = Mapping::new();
        if siblings.is_empty() {
            log::debug!("{}: empty {} ignored", alias, OR_KEY);
            return Ok(group);
        }
        group.hoist_values(&mut siblings)?;
        group.or = siblings;
        Ok(group)
    }

    /// All of the siblings
    fn map_and(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        value: &Value,
    ) -> Result<Mapping, CompileError> {
        let mut siblings = self.map_siblings(ctx, entity, alias, AND_KEY, value)?;
        let mut group = Mapping::new();
        if siblings.is_empty() {
            log::debug!("{}: empty {} ignored", alias, AND_KEY);
            return Ok(group);
        }
        group.hoist_values(&mut siblings)?;
        group.and = siblings;
        Ok(group)
    }

    /// None of the siblings
    fn map_not(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        value: &Value,
    ) -> Result<Mapping, CompileError> {
        let mut siblings = self.map_siblings(ctx, entity, alias, NOT_KEY, value)?;
        let mut group = Mapping::new();
        if siblings.is_empty() {
            log::debug!("{}: empty {} ignored", alias, NOT_KEY);
            return Ok(group);
        }
        group.hoist_values(&mut siblings)?;
        group.not = vec![Mapping {
            or: siblings,
            ..Default::default()
        }];
        Ok(group)
    }

    /// Siblings are mapped at the same alias; nested relation aliases stay unique
    fn map_siblings(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        combinator: &str,
        value: &Value,
    ) -> Result<Vec<Mapping>, CompileError> {
        let filters: Vec<&Map<String, Value>> = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object().ok_or_else(|| {
                        CompileError::invalid_filter(
                            alias,
                            format!("{} elements must be objects, got {}", combinator, item),
                        )
                    })
                })
                .collect::<Result<_, _>>()?,
            Value::Object(map) => vec![map],
            other => {
                return Err(CompileError::invalid_filter(
                    alias,
                    format!("{} expects a list of filters, got {}", combinator, other),
                ))
            }
        };

        filters
            .into_iter()
            .map(|filter| self.map_filter(ctx, entity, alias, filter))
            .collect()
    }

    /// A field key, possibly carrying an operator suffix
    fn map_key(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        key: &str,
        value: &Value,
    ) -> Result<Mapping, CompileError> {
        let resolver = self.mapper.resolver(ctx, entity);

        if let Some(field) = resolver.resolve(key) {
            return match field {
                ResolvedField::Property(property) if property.is_relation() => {
                    self.map_relation_filter(ctx, entity, alias, property, value)
                }
                field => self.map_field_value(ctx, alias, key, field.columns(), value),
            };
        }

        if let Some((stem, operation)) = split_operator_suffix(key) {
            if let Some(field) = resolver.resolve(stem) {
                if field.is_relation() {
                    return Err(CompileError::invalid_filter(
                        alias,
                        format!("operator suffix on relation '{}'", stem),
                    ));
                }
                return self.map_operator(ctx, alias, stem, field.columns(), operation, value);
            }
        }

        Err(CompileError::unresolved_field(alias, key))
    }

    /// Bare value means `_eq`; an object applies each of its operators
    fn map_field_value(
        &self,
        ctx: &mut MapContext<'_>,
        alias: &Alias,
        field: &str,
        columns: &[String],
        value: &Value,
    ) -> Result<Mapping, CompileError> {
        let Value::Object(operators) = value else {
            let eq = get_operation("_eq").ok_or_else(|| CompileError::UnknownOperator {
                alias: alias.to_string(),
                operator: "_eq".to_string(),
            })?;
            return self.map_operator(ctx, alias, field, columns, eq, value);
        };

        let mut fragments = Vec::with_capacity(operators.len());
        for (name, operand) in operators {
            let operation = get_operation(name).ok_or_else(|| CompileError::UnknownOperator {
                alias: alias.to_string(),
                operator: name.clone(),
            })?;
            fragments.push(self.map_operator(ctx, alias, field, columns, operation, operand)?);
        }
        Mapping::reduce(fragments)
    }

    fn map_operator(
        &self,
        ctx: &mut MapContext<'_>,
        alias: &Alias,
        field: &str,
        columns: &[String],
        operation: &Operation,
        value: &Value,
    ) -> Result<Mapping, CompileError> {
        if columns.is_empty() {
            return Err(CompileError::invalid_filter(
                alias,
                format!("field '{}' has no backing columns", field),
            ));
        }

        let mut next_param = || ctx.aliases.next_param(alias, field);
        let mut fragment = Mapping::new();

        let set_operator = matches!(operation.name, "_in" | "_nin");
        let predicates = if columns.len() > 1 && set_operator {
            check_row_arity(field, columns.len(), value)?;
            let tuple = column_tuple(&alias.columns(columns));
            vec![operation.apply(&tuple, value, &mut next_param)?]
        } else {
            columns
                .iter()
                .map(|column| operation.apply(&alias.column(column), value, &mut next_param))
                .collect::<Result<Vec<_>, _>>()?
        };

        for predicate in predicates {
            fragment.conditions.push(predicate.sql);
            for (name, bound) in predicate.bindings {
                fragment.bind(name, bound)?;
            }
        }
        Ok(fragment)
    }

    /// Existence test against related rows: the parent row survives when at least one
    /// related row matches the nested filter
    fn map_relation_filter(
        &self,
        ctx: &mut MapContext<'_>,
        entity: &EntityMetadata,
        alias: &Alias,
        property: &EntityProperty,
        value: &Value,
    ) -> Result<Mapping, CompileError> {
        let child_filter = value.as_object().ok_or_else(|| {
            CompileError::invalid_filter(
                alias,
                format!(
                    "relation '{}' expects a nested filter object, got {}",
                    property.name, value
                ),
            )
        })?;
        let child = self.mapper.metadata().get_metadata(&property.type_name)?;
        let prefix = alias.prefix().to_string();

        ctx.enter(self.mapper.config().max_nesting_depth)?;
        let child_alias = ctx.aliases.next(AliasKind::Entity, &prefix);
        let mut child_mapping =
            self.mapper
                .recursive_map(ctx, &child, &child_alias, None, Some(child_filter))?;
        ctx.leave();

        let site = RelationSite {
            parent: entity,
            parent_alias: alias,
            property,
            child: &child,
            child_alias: &child_alias,
        };
        let spec = site.join_spec()?;
        let scope = FilterScope::new(&child.table_name, &child_alias, &child.primary_keys);
        let (joins, child_conditions) = child_mapping.lower_filters(&scope);

        let mut conditions = correlation_conditions(&mut ctx.aliases, &spec, alias, &child_alias);
        conditions.extend(child_conditions);

        let filter_alias = ctx.aliases.next(AliasKind::Filter, &prefix);
        let mut fragment = Mapping::new();
        fragment
            .filter_joins
            .push(build_filter_join(&site.child_from(), &joins, &conditions, &filter_alias));
        fragment.bind_all(std::mem::take(&mut child_mapping.values))?;
        Ok(fragment)
    }
}

/// Multi-column set membership needs one row value per element
fn check_row_arity(field: &str, columns: usize, value: &Value) -> Result<(), CompileError> {
    let Some(items) = value.as_array() else {
        return Ok(());
    };
    for item in items {
        let found = item.as_array().map_or(1, Vec::len);
        if found != columns {
            return Err(CompileError::ColumnArityMismatch {
                field: field.to_string(),
                columns,
                values: found,
            });
        }
    }
    Ok(())
}

//! Relationship Handler
//!
//! Renders one relation field of a parent node as a correlated `LEFT OUTER JOIN LATERAL`
//! subquery. The parent's JSON object then references `<subquery alias>.value`.
//!
//! Shapes per reference kind:
//!
//! | kind                | value                     | correlation                        |
//! |---------------------|---------------------------|------------------------------------|
//! | many-to-one         | object or `null`          | child key = parent join columns    |
//! | one-to-one, owning  | object or `null`          | child key = parent join columns    |
//! | one-to-one, inverse | object or `null`, LIMIT 1 | child join columns = parent key    |
//! | one-to-many         | array, `[]` when empty    | child join columns = parent key    |
//! | many-to-many        | array, `[]` when empty    | child key IN (pivot subquery)      |
//!
//! A plural relation carrying its own ordering or limits is nested one level deeper so that
//! `ORDER BY`/`LIMIT`/`OFFSET` apply before `json_agg`.

use crate::config::CompilerConfig;
use crate::entity_catalog::{resolve_join, EntityMetadata, EntityProperty, JoinSpec, ReferenceKind};

use super::alias::{Alias, AliasKind, AliasManager};
use super::common::{column_tuple, quote_table};
use super::errors::CompileError;
use super::sql_builder::{build_lateral_join, json_array, wrap_lateral, SelectParts};

/// Position of a row inside an ordered page subquery
const PAGE_POSITION: &str = "row_index";

/// One relation field being rendered
#[derive(Debug, Clone, Copy)]
pub struct RelationSite<'r> {
    pub parent: &'r EntityMetadata,
    pub parent_alias: &'r Alias,
    pub property: &'r EntityProperty,
    pub child: &'r EntityMetadata,
    pub child_alias: &'r Alias,
}

impl RelationSite<'_> {
    /// `"table" AS child_alias`
    pub fn child_from(&self) -> String {
        format!("{} AS {}", quote_table(&self.child.table_name), self.child_alias)
    }

    pub fn join_spec(&self) -> Result<JoinSpec, CompileError> {
        resolve_join(self.parent, self.property, self.child).map_err(|e| {
            CompileError::UnsupportedReference {
                entity: self.parent.name.clone(),
                field: self.property.name.clone(),
                reference: self.property.reference.to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn unsupported(&self, reason: &str) -> CompileError {
        CompileError::UnsupportedReference {
            entity: self.parent.name.clone(),
            field: self.property.name.clone(),
            reference: self.property.reference.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The child side of a relation, already mapped and reduced
#[derive(Debug, Clone, Default)]
pub struct ChildBody {
    /// The child's JSON object expression
    pub object: String,
    pub joins: Vec<String>,
    /// Child-local predicates (relation-scoped filter)
    pub conditions: Vec<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ChildBody {
    fn is_paginated(&self) -> bool {
        self.order_by.is_some() || self.limit.is_some() || self.offset.is_some()
    }
}

/// Rendered join plus the expression the parent object uses for the field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRelation {
    pub join: String,
    pub value: String,
}

/// Correlation predicates tying child rows to their parent row
pub fn correlation_conditions(
    aliases: &mut AliasManager,
    spec: &JoinSpec,
    parent_alias: &Alias,
    child_alias: &Alias,
) -> Vec<String> {
    match spec {
        JoinSpec::Direct {
            parent_columns,
            child_columns,
        } => child_columns
            .iter()
            .zip(parent_columns)
            .map(|(child, parent)| {
                format!("{} = {}", child_alias.column(child), parent_alias.column(parent))
            })
            .collect(),
        JoinSpec::Pivot {
            pivot_table,
            parent_columns,
            pivot_parent_columns,
            pivot_child_columns,
            child_columns,
        } => {
            let pivot_alias = aliases.next(AliasKind::Pivot, child_alias.prefix());
            let mut hop = SelectParts::new(
                pivot_alias.columns(pivot_child_columns).join(", "),
                format!("{} AS {}", quote_table(pivot_table), pivot_alias),
            );
            hop.conditions = pivot_parent_columns
                .iter()
                .zip(parent_columns)
                .map(|(pivot, parent)| {
                    format!("{} = {}", pivot_alias.column(pivot), parent_alias.column(parent))
                })
                .collect();
            vec![format!(
                "{} IN ({})",
                column_tuple(&child_alias.columns(child_columns)),
                hop.to_sql()
            )]
        }
    }
}

pub struct RelationshipHandler<'c> {
    config: &'c CompilerConfig,
}

impl<'c> RelationshipHandler<'c> {
    pub fn new(config: &'c CompilerConfig) -> Self {
        RelationshipHandler { config }
    }

    /// Dispatch on the property's reference kind
    pub fn render(
        &self,
        aliases: &mut AliasManager,
        site: &RelationSite<'_>,
        body: ChildBody,
    ) -> Result<RenderedRelation, CompileError> {
        match site.property.reference {
            ReferenceKind::OneToOne => self.one_to_one(aliases, site, body),
            ReferenceKind::OneToMany => self.one_to_many(aliases, site, body),
            ReferenceKind::ManyToOne => self.many_to_one(aliases, site, body),
            ReferenceKind::ManyToMany => self.many_to_many(aliases, site, body),
            ReferenceKind::Scalar => Err(site.unsupported("property is not a relation")),
        }
    }

    /// Owning side reads the parent's join columns; the inverse side keeps at most one row
    pub fn one_to_one(
        &self,
        aliases: &mut AliasManager,
        site: &RelationSite<'_>,
        body: ChildBody,
    ) -> Result<RenderedRelation, CompileError> {
        let inverse = site.property.mapped_by.is_some();
        self.singular(aliases, site, body, inverse)
    }

    pub fn many_to_one(
        &self,
        aliases: &mut AliasManager,
        site: &RelationSite<'_>,
        body: ChildBody,
    ) -> Result<RenderedRelation, CompileError> {
        if site.property.mapped_by.is_some() {
            return Err(site.unsupported("a many-to-one relation is always the owning side"));
        }
        self.singular(aliases, site, body, false)
    }

    pub fn one_to_many(
        &self,
        aliases: &mut AliasManager,
        site: &RelationSite<'_>,
        body: ChildBody,
    ) -> Result<RenderedRelation, CompileError> {
        if site.property.mapped_by.is_none() {
            return Err(site.unsupported("a one-to-many relation needs mappedBy"));
        }
        self.plural(aliases, site, body)
    }

    pub fn many_to_many(
        &self,
        aliases: &mut AliasManager,
        site: &RelationSite<'_>,
        body: ChildBody,
    ) -> Result<RenderedRelation, CompileError> {
        self.plural(aliases, site, body)
    }

    fn singular(
        &self,
        aliases: &mut AliasManager,
        site: &RelationSite<'_>,
        body: ChildBody,
        limit_one: bool,
    ) -> Result<RenderedRelation, CompileError> {
        let spec = site.join_spec()?;
        if body.limit.is_some() || body.offset.is_some() {
            log::debug!(
                "{}.{}: limit/offset ignored on a singular relation",
                site.parent.name,
                site.property.name
            );
        }

        let mut conditions =
            correlation_conditions(aliases, &spec, site.parent_alias, site.child_alias);
        conditions.extend(body.conditions);

        let mut subquery = SelectParts::new(format!("{} AS value", body.object), site.child_from());
        subquery.joins = body.joins;
        subquery.conditions = conditions;
        subquery.order_by = body.order_by;
        subquery.limit = limit_one.then_some(1);

        let alias = self.subquery_alias(aliases);
        Ok(RenderedRelation {
            join: wrap_lateral("LEFT OUTER", &subquery.to_sql(), &alias),
            value: format!("{}.value", alias),
        })
    }

    fn plural(
        &self,
        aliases: &mut AliasManager,
        site: &RelationSite<'_>,
        body: ChildBody,
    ) -> Result<RenderedRelation, CompileError> {
        let spec = site.join_spec()?;
        let mut conditions =
            correlation_conditions(aliases, &spec, site.parent_alias, site.child_alias);

        if !body.is_paginated() {
            conditions.extend(body.conditions);
            let alias = self.subquery_alias(aliases);
            let join = build_lateral_join(
                &json_array(&body.object),
                &site.child_from(),
                &body.joins,
                &conditions,
                &alias,
            );
            return Ok(RenderedRelation {
                join,
                value: format!("{}.value", alias),
            });
        }

        // Order and slice the child rows first, aggregate afterwards
        let page_alias = aliases.next(AliasKind::Page, &self.config.alias_prefix);
        let mut aggregated = format!("{}.value", page_alias);
        let mut select = format!("{} AS value", body.object);
        // json_agg only keeps the page order when told so explicitly
        if let Some(order_by) = &body.order_by {
            select.push_str(&format!(", row_number() OVER ({}) AS {}", order_by, PAGE_POSITION));
            aggregated.push_str(&format!(" ORDER BY {}", page_alias.column(PAGE_POSITION)));
        }

        conditions.extend(body.conditions);
        let mut page = SelectParts::new(select, site.child_from());
        page.joins = body.joins;
        page.conditions = conditions;
        page.order_by = body.order_by;
        page.limit = body.limit;
        page.offset = body.offset;

        let alias = self.subquery_alias(aliases);
        let join = build_lateral_join(
            &json_array(&aggregated),
            &format!("({}) AS {}", page.to_sql(), page_alias),
            &[],
            &[],
            &alias,
        );
        Ok(RenderedRelation {
            join,
            value: format!("{}.value", alias),
        })
    }

    fn subquery_alias(&self, aliases: &mut AliasManager) -> Alias {
        aliases.next(AliasKind::Subquery, &self.config.alias_prefix)
    }
}

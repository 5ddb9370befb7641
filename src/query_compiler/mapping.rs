//! Mapping fragments and the boolean-branch lowering pass
//!
//! A [`Mapping`] accumulates everything one visited tree node contributes to the statement.
//! Fragments are merged bottom-up by [`Mapping::merge`]; boolean combinators keep their
//! children as separate fragments (`and`, `or`, `not`) so that branches needing different
//! joins are never forced into one FROM clause.
//!
//! [`Mapping::branches`] lowers the filter part of a fragment into disjunctive branches, each a
//! join set plus a conjunction of predicates. A scope with a single branch puts its joins in
//! FROM and its predicates in WHERE; several branches that need joins become a primary-key
//! membership test over a `UNION ALL` of per-branch subqueries.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::alias::Alias;
use super::common::column_tuple;
use super::errors::CompileError;
use super::selection::OrderBy;
use super::sql_builder::{and_all, build_union_all, or_all, SelectParts};

/// Bound values of one statement, by parameter name
pub type Bindings = BTreeMap<String, Value>;

/// Accumulator for one visited node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    /// Physical columns read at this node's alias
    pub select: BTreeSet<String>,
    /// Ordered JSON (key, value expression) pairs of this node's object
    pub json: Vec<(String, String)>,
    /// Whether computed fields need the raw column object
    pub has_computed: bool,
    /// Existence-test joins
    pub filter_joins: Vec<String>,
    /// Display joins
    pub joins: Vec<String>,
    /// ANDed predicates
    pub conditions: Vec<String>,
    pub values: Bindings,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Vec<OrderBy>,
    /// Conjoined child fragments
    pub and: Vec<Mapping>,
    /// Disjoined child fragments (one OR group)
    pub or: Vec<Mapping>,
    /// Negated child fragments; each entry is negated as a whole
    pub not: Vec<Mapping>,
}

/// One disjunct of a lowered filter: joins plus ANDed predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branch {
    pub joins: Vec<String>,
    pub conditions: Vec<String>,
}

impl Branch {
    fn is_trivial(&self) -> bool {
        self.joins.is_empty() && self.conditions.is_empty()
    }

    fn combine(&self, other: &Branch) -> Branch {
        Branch {
            joins: self.joins.iter().chain(&other.joins).cloned().collect(),
            conditions: self
                .conditions
                .iter()
                .chain(&other.conditions)
                .cloned()
                .collect(),
        }
    }
}

/// The row source a filter applies to, used to build primary-key subqueries
#[derive(Debug, Clone)]
pub struct FilterScope {
    /// `"table" AS alias`
    pub from: String,
    pub alias: Alias,
    pub primary_keys: Vec<String>,
}

impl FilterScope {
    pub fn new(table: &str, alias: &Alias, primary_keys: &[String]) -> Self {
        FilterScope {
            from: format!("{} AS {}", super::common::quote_table(table), alias),
            alias: alias.clone(),
            primary_keys: primary_keys.to_vec(),
        }
    }

    fn key_tuple(&self) -> String {
        column_tuple(&self.alias.columns(&self.primary_keys))
    }

    /// One boolean expression equivalent to the OR of `branches`
    pub fn predicate(&self, branches: &[Branch]) -> String {
        if branches.iter().any(Branch::is_trivial) {
            return "TRUE".to_string();
        }
        if branches.iter().all(|b| b.joins.is_empty()) {
            let disjuncts: Vec<String> = branches.iter().map(|b| and_all(&b.conditions)).collect();
            return or_all(&disjuncts);
        }

        let key_columns = self.alias.columns(&self.primary_keys).join(", ");
        let union = build_union_all(branches, |branch| {
            let mut parts = SelectParts::new(key_columns.clone(), self.from.clone());
            parts.joins = branch.joins.clone();
            parts.conditions = branch.conditions.clone();
            parts.to_sql()
        });
        format!("{} IN ({})", self.key_tuple(), union)
    }
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bound value; a name may only be bound once per statement
    pub fn bind(&mut self, name: String, value: Value) -> Result<(), CompileError> {
        if self.values.contains_key(&name) {
            return Err(CompileError::DuplicateBinding(name));
        }
        self.values.insert(name, value);
        Ok(())
    }

    /// Move all values of `other` into this fragment
    pub fn bind_all(&mut self, other: Bindings) -> Result<(), CompileError> {
        for (name, value) in other {
            self.bind(name, value)?;
        }
        Ok(())
    }

    /// Move the values of child fragments up so `values` always covers the whole subtree
    pub fn hoist_values(&mut self, children: &mut [Mapping]) -> Result<(), CompileError> {
        for child in children.iter_mut() {
            let values = std::mem::take(&mut child.values);
            self.bind_all(values)?;
        }
        Ok(())
    }

    /// Merge `other` into this fragment
    pub fn merge(&mut self, other: Mapping) -> Result<(), CompileError> {
        let Mapping {
            select,
            json,
            has_computed,
            filter_joins,
            joins,
            conditions,
            values,
            limit,
            offset,
            order_by,
            and,
            or,
            not,
        } = other;

        self.select.extend(select);
        self.json.extend(json);
        self.has_computed |= has_computed;
        self.filter_joins.extend(filter_joins);
        self.joins.extend(joins);
        self.conditions.extend(conditions);
        self.bind_all(values)?;
        if limit.is_some() {
            self.limit = limit;
        }
        if offset.is_some() {
            self.offset = offset;
        }
        self.order_by.extend(order_by);
        self.and.extend(and);
        self.not.extend(not);

        // A fragment holds one OR group; a second group becomes a conjoined child
        if !or.is_empty() {
            if self.or.is_empty() {
                self.or = or;
            } else {
                self.and.push(Mapping {
                    or,
                    ..Default::default()
                });
            }
        }
        Ok(())
    }

    /// Reduce fragments into one
    pub fn reduce(fragments: impl IntoIterator<Item = Mapping>) -> Result<Mapping, CompileError> {
        let mut reduced = Mapping::new();
        for fragment in fragments {
            reduced.merge(fragment)?;
        }
        Ok(reduced)
    }

    /// Lower the filter part of this fragment into disjunctive branches
    pub fn branches(&self, scope: &FilterScope) -> Vec<Branch> {
        let mut base = Branch {
            joins: self.filter_joins.clone(),
            conditions: self.conditions.clone(),
        };
        for negated in &self.not {
            let inner = scope.predicate(&negated.branches(scope));
            base.conditions.push(format!("NOT ({})", inner));
        }

        let mut result = vec![base];
        for child in &self.and {
            result = cartesian(&result, &child.branches(scope));
        }

        if !self.or.is_empty() {
            let alternatives: Vec<Branch> = self
                .or
                .iter()
                .flat_map(|fragment| fragment.branches(scope))
                .collect();

            // Join-free alternatives collapse into one parenthesized OR predicate
            let group = if alternatives.iter().any(Branch::is_trivial) {
                vec![Branch::default()]
            } else if alternatives.iter().all(|b| b.joins.is_empty()) {
                vec![Branch {
                    joins: Vec::new(),
                    conditions: vec![scope.predicate(&alternatives)],
                }]
            } else {
                alternatives
            };
            result = cartesian(&result, &group);
        }

        result
    }

    /// Joins and WHERE predicates for a scope whose rows this filter restricts
    pub fn lower_filters(&self, scope: &FilterScope) -> (Vec<String>, Vec<String>) {
        let mut branches = self.branches(scope);
        if branches.len() == 1 {
            let branch = branches.remove(0);
            return (branch.joins, branch.conditions);
        }
        log::debug!(
            "{}: {} filter branches need distinct joins, lowering to UNION ALL",
            scope.alias,
            branches.len()
        );
        (Vec::new(), vec![scope.predicate(&branches)])
    }
}

fn cartesian(left: &[Branch], right: &[Branch]) -> Vec<Branch> {
    left.iter()
        .flat_map(|l| right.iter().map(move |r| l.combine(r)))
        .collect()
}

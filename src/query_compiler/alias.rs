//! Statement-scoped alias allocation
//!
//! Every descent into a relation, a filter join or a pivot hop opens a new correlated scope
//! that must not shadow an ancestor's alias. All aliases of one statement come from one
//! [`AliasManager`], which keeps a counter per (kind, prefix) pair, so uniqueness does not depend
//! on the shape of the request tree.
//!
//! Alias text is `{prefix}_{tag}{index}`, e.g. `t_e1` for the root entity, `t_s3` for the third
//! relation subquery. Parameter names extend the alias: `t_e1_name_4`.

use std::collections::HashMap;
use std::fmt;

use super::common::qualified_column;

/// Scope kind of an alias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AliasKind {
    /// A table row (root or related entity)
    Entity,
    /// A display-time lateral subquery
    Subquery,
    /// An existence-test lateral subquery
    Filter,
    /// A pivot table of a many-to-many relation
    Pivot,
    /// An inner paginated subquery
    Page,
}

impl AliasKind {
    fn tag(&self) -> char {
        match self {
            AliasKind::Entity => 'e',
            AliasKind::Subquery => 's',
            AliasKind::Filter => 'f',
            AliasKind::Pivot => 'j',
            AliasKind::Page => 'p',
        }
    }
}

/// Immutable identifier for one table or subquery in a statement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Alias {
    kind: AliasKind,
    prefix: String,
    index: u32,
}

impl Alias {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// `alias.column`, quoting the column if needed
    pub fn column(&self, column: &str) -> String {
        qualified_column(&self.to_string(), column)
    }

    /// Qualified references for a list of columns
    pub fn columns(&self, columns: &[String]) -> Vec<String> {
        columns.iter().map(|c| self.column(c)).collect()
    }

    /// `alias_name` (no statement-wide uniqueness; see [`AliasManager::next_param`])
    pub fn param(&self, name: &str) -> String {
        format!("{}_{}", self, sanitize_param(name))
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}{}", self.prefix, self.kind.tag(), self.index)
    }
}

/// Counter context for one statement. Never shared between statements.
#[derive(Debug, Default)]
pub struct AliasManager {
    counters: HashMap<(AliasKind, String), u32>,
    param_seq: u32,
}

impl AliasManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a statement: restart the entity counter for `prefix` and return the root alias
    pub fn start(&mut self, prefix: &str) -> Alias {
        self.reset(AliasKind::Entity, prefix);
        self.next(AliasKind::Entity, prefix)
    }

    /// Allocate the next alias for (kind, prefix); indices start at 1 and strictly increase
    pub fn next(&mut self, kind: AliasKind, prefix: &str) -> Alias {
        let counter = self
            .counters
            .entry((kind, prefix.to_string()))
            .or_insert(0);
        *counter += 1;
        Alias {
            kind,
            prefix: prefix.to_string(),
            index: *counter,
        }
    }

    /// Restart (kind, prefix) so the next allocation is index 1
    pub fn reset(&mut self, kind: AliasKind, prefix: &str) {
        self.counters.insert((kind, prefix.to_string()), 0);
    }

    /// Restart (kind, prefix) so the next allocation is `index`
    pub fn restart_from(&mut self, kind: AliasKind, prefix: &str, index: u32) {
        self.counters
            .insert((kind, prefix.to_string()), index.saturating_sub(1));
    }

    /// Allocate a parameter name unique within the statement: `{alias}_{name}_{n}`
    pub fn next_param(&mut self, alias: &Alias, name: &str) -> String {
        self.param_seq += 1;
        format!("{}_{}", alias.param(name), self.param_seq)
    }
}

/// Keep parameter names to `[A-Za-z0-9_]` so they survive placeholder scanning
fn sanitize_param(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

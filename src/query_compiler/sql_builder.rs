//! SQL Builder - stateless text assembly for PostgreSQL JSON queries
//!
//! Every relation renders through the same lateral-join template:
//!
//! ```sql
//! LEFT OUTER JOIN LATERAL (SELECT <json> AS value FROM <from> <joins> <where>) AS <alias> ON TRUE
//! ```
//!
//! and every node of the response tree becomes one `json_build_object(...)` expression, so a
//! nested request compiles to exactly one statement.
//!
//! All functions here are pure. Output has whitespace runs collapsed to single spaces so
//! generated statements can be compared textually.

use lazy_static::lazy_static;
use regex::Regex;

use super::alias::Alias;
use super::common::string_literal;
use super::selection::OrderBy;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Collapse whitespace runs to a single space and trim the ends
pub fn collapse_whitespace(sql: &str) -> String {
    WHITESPACE.replace_all(sql.trim(), " ").into_owned()
}

/// Build a JSON object expression from ordered (key, value expression) pairs.
///
/// PostgreSQL limits functions to 100 arguments, so objects wider than `chunk_size` pairs are
/// assembled from several `jsonb` objects concatenated with `||`.
///
/// ```
/// use nestql::query_compiler::sql_builder::json_object;
/// let pairs = vec![("id".to_string(), "t_e1.id".to_string())];
/// assert_eq!(json_object(&pairs, 50), "json_build_object('id', t_e1.id)");
/// ```
pub fn json_object(pairs: &[(String, String)], chunk_size: usize) -> String {
    let chunk_size = chunk_size.max(1);
    let render = |chunk: &[(String, String)]| {
        let args: Vec<String> = chunk
            .iter()
            .map(|(key, value)| format!("{}, {}", string_literal(key), value))
            .collect();
        format!("json_build_object({})", args.join(", "))
    };

    if pairs.len() <= chunk_size {
        return render(pairs);
    }

    let parts: Vec<String> = pairs
        .chunks(chunk_size)
        .map(|chunk| format!("{}::jsonb", render(chunk)))
        .collect();
    format!("({})::json", parts.join(" || "))
}

/// Aggregate per-row JSON objects into an array; no rows yields `[]`, never NULL
pub fn json_array(object_expr: &str) -> String {
    format!("coalesce(json_agg({}), '[]'::json)", object_expr)
}

/// AND a list of predicates; each compound operand is already parenthesized by its producer
pub fn and_all(conditions: &[String]) -> String {
    match conditions.len() {
        0 => "TRUE".to_string(),
        1 => conditions[0].clone(),
        _ => conditions
            .iter()
            .map(|c| format!("({})", c))
            .collect::<Vec<_>>()
            .join(" AND "),
    }
}

/// OR a list of predicates, each wrapped in parentheses
pub fn or_all(conditions: &[String]) -> String {
    match conditions.len() {
        0 => "FALSE".to_string(),
        1 => conditions[0].clone(),
        _ => conditions
            .iter()
            .map(|c| format!("({})", c))
            .collect::<Vec<_>>()
            .join(" OR "),
    }
}

/// `WHERE c1 AND c2`, or nothing
pub fn build_where(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", and_all(conditions))
    }
}

/// Components of one SELECT; rendered by [`SelectParts::to_sql`]
#[derive(Debug, Clone, Default)]
pub struct SelectParts {
    pub select: String,
    pub from: String,
    pub joins: Vec<String>,
    pub conditions: Vec<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectParts {
    pub fn new(select: impl Into<String>, from: impl Into<String>) -> Self {
        SelectParts {
            select: select.into(),
            from: from.into(),
            ..Default::default()
        }
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.select, self.from);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        let where_clause = build_where(&self.conditions);
        if !where_clause.is_empty() {
            sql.push(' ');
            sql.push_str(&where_clause);
        }
        if let Some(order_by) = &self.order_by {
            sql.push(' ');
            sql.push_str(order_by);
        }
        sql.push_str(&build_limit_offset(self.limit, self.offset));
        collapse_whitespace(&sql)
    }
}

/// ` LIMIT n OFFSET m` (leading space), either part optional
pub fn build_limit_offset(limit: Option<u64>, offset: Option<u64>) -> String {
    let mut sql = String::new();
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }
    sql
}

/// The canonical display join for every relationship
pub fn build_lateral_join(
    json_expr: &str,
    from_clause: &str,
    extra_joins: &[String],
    where_conditions: &[String],
    alias: &Alias,
) -> String {
    let mut body = SelectParts::new(format!("{} AS value", json_expr), from_clause);
    body.joins = extra_joins.to_vec();
    body.conditions = where_conditions.to_vec();
    wrap_lateral("LEFT OUTER", &body.to_sql(), alias)
}

/// Wrap a complete subquery as a lateral join
pub fn wrap_lateral(join_type: &str, subquery: &str, alias: &Alias) -> String {
    collapse_whitespace(&format!(
        "{} JOIN LATERAL ({}) AS {} ON TRUE",
        join_type, subquery, alias
    ))
}

/// Existence-test join: keeps the parent row only when the subquery yields a row.
/// `LIMIT 1` keeps the join from multiplying parent rows.
pub fn build_filter_join(
    from_clause: &str,
    extra_joins: &[String],
    where_conditions: &[String],
    alias: &Alias,
) -> String {
    let mut body = SelectParts::new("1 AS matched", from_clause);
    body.joins = extra_joins.to_vec();
    body.conditions = where_conditions.to_vec();
    body.limit = Some(1);
    wrap_lateral("INNER", &body.to_sql(), alias)
}

/// One subquery per branch, combined with UNION ALL
pub fn build_union_all<B>(branches: &[B], query_builder_fn: impl Fn(&B) -> String) -> String {
    let parts: Vec<String> = branches.iter().map(query_builder_fn).collect();
    collapse_whitespace(&parts.join(" UNION ALL "))
}

/// Map logical ordering fields to `ORDER BY` terms; unknown fields are dropped
pub fn build_order_by_sql(
    order_by: &[OrderBy],
    field_to_columns_fn: impl Fn(&str) -> Option<Vec<String>>,
) -> Option<String> {
    let mut terms = Vec::new();
    for item in order_by {
        match field_to_columns_fn(&item.field) {
            Some(columns) => {
                for column in columns {
                    terms.push(format!("{} {}", column, item.direction));
                }
            }
            None => log::debug!("order by: dropping unknown field '{}'", item.field),
        }
    }
    if terms.is_empty() {
        None
    } else {
        Some(format!("ORDER BY {}", terms.join(", ")))
    }
}

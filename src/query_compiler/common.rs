//! Common utilities for PostgreSQL text generation

/// Words PostgreSQL reserves that are plausible column names
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "both", "case", "cast",
    "check", "collate", "column", "constraint", "create", "default", "desc", "distinct", "do",
    "else", "end", "except", "false", "fetch", "for", "foreign", "from", "grant", "group",
    "having", "in", "initially", "intersect", "into", "lateral", "leading", "limit", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "some", "table", "then", "to", "trailing", "true", "union", "unique",
    "user", "using", "value", "when", "where", "window", "with",
];

/// Quote a PostgreSQL identifier (column name) if it needs quoting.
///
/// Unquoted identifiers are folded to lower case by PostgreSQL, so anything with upper-case
/// letters, unusual characters, or a reserved word is wrapped in double quotes.
///
/// # Examples
/// ```
/// use nestql::query_compiler::common::quote_identifier;
/// assert_eq!(quote_identifier("user_id"), "user_id");
/// assert_eq!(quote_identifier("firstName"), "\"firstName\"");
/// assert_eq!(quote_identifier("order"), "\"order\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED_WORDS.contains(&name);
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Always-quoted table reference; a `schema.table` name quotes each part.
///
/// # Examples
/// ```
/// use nestql::query_compiler::common::quote_table;
/// assert_eq!(quote_table("person"), "\"person\"");
/// assert_eq!(quote_table("public.person"), "\"public\".\"person\"");
/// ```
pub fn quote_table(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Format a qualified column reference: table_alias.column_name
///
/// # Examples
/// ```
/// use nestql::query_compiler::common::qualified_column;
/// assert_eq!(qualified_column("t_e1", "user_id"), "t_e1.user_id");
/// assert_eq!(qualified_column("t_e1", "userId"), "t_e1.\"userId\"");
/// ```
pub fn qualified_column(table_alias: &str, column_name: &str) -> String {
    format!("{}.{}", table_alias, quote_identifier(column_name))
}

/// Render a SQL string literal (used for JSON keys)
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render a column list, wrapped as a row value when it has more than one column
pub fn column_tuple(columns: &[String]) -> String {
    if columns.len() == 1 {
        columns[0].clone()
    } else {
        format!("({})", columns.join(", "))
    }
}

/// Placeholder conversion for positional drivers
///
/// Compiled statements use named `:param` placeholders. Drivers that only accept `$1, $2, ...`
/// get a rewritten statement plus the values in placeholder order. A name used several times
/// keeps a single position.
use std::collections::HashMap;

use serde_json::Value;

use super::mapper::CompiledQuery;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaceholderError {
    #[error("Missing binding for placeholder :{0}")]
    MissingBinding(String),

    #[error("Binding '{0}' is not referenced by the statement")]
    UnusedBinding(String),
}

/// Statement with `$n` placeholders and its ordered values
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

impl CompiledQuery {
    /// Rewrite `:name` placeholders as `$n`
    ///
    /// `::type` casts and text inside single quotes are left alone.
    ///
    /// # Example
    /// ```
    /// use nestql::query_compiler::CompiledQuery;
    /// use serde_json::json;
    ///
    /// let query = CompiledQuery {
    ///     sql: "SELECT '[]'::json WHERE a = :p AND b = :q OR c = :p".to_string(),
    ///     bindings: [("p".to_string(), json!(1)), ("q".to_string(), json!("x"))].into(),
    /// };
    /// let positional = query.to_positional().unwrap();
    /// assert_eq!(positional.sql, "SELECT '[]'::json WHERE a = $1 AND b = $2 OR c = $1");
    /// assert_eq!(positional.values, vec![json!(1), json!("x")]);
    /// ```
    pub fn to_positional(&self) -> Result<PositionalQuery, PlaceholderError> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut values = Vec::new();
        let mut chars = self.sql.chars().peekable();
        let mut in_literal = false;

        while let Some(ch) = chars.next() {
            if in_literal {
                sql.push(ch);
                if ch == '\'' {
                    // '' is an escaped quote and keeps the literal open
                    if chars.peek() == Some(&'\'') {
                        sql.push('\'');
                        chars.next();
                    } else {
                        in_literal = false;
                    }
                }
                continue;
            }

            match ch {
                '\'' => {
                    in_literal = true;
                    sql.push(ch);
                }
                ':' if chars.peek() == Some(&':') => {
                    // Type cast
                    sql.push_str("::");
                    chars.next();
                }
                ':' => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }

                    if name.is_empty() {
                        sql.push(':');
                        continue;
                    }

                    let position = match positions.get(&name) {
                        Some(position) => *position,
                        None => {
                            let value = self
                                .bindings
                                .get(&name)
                                .ok_or_else(|| PlaceholderError::MissingBinding(name.clone()))?;
                            values.push(value.clone());
                            positions.insert(name, values.len());
                            values.len()
                        }
                    };
                    sql.push_str(&format!("${}", position));
                }
                _ => sql.push(ch),
            }
        }

        if let Some(unused) = self.bindings.keys().find(|name| !positions.contains_key(*name)) {
            return Err(PlaceholderError::UnusedBinding(unused.clone()));
        }

        Ok(PositionalQuery { sql, values })
    }
}

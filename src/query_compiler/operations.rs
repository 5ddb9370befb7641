/// Filter operator catalog
///
/// Maps a filter operator name (`_eq`, `_in`, ...) to a PostgreSQL predicate template.
/// Templates receive an already-qualified column reference and already-rendered parameter
/// placeholders, so nothing from the request is ever spliced into SQL text.
use std::collections::HashMap;

use serde_json::Value;

use super::errors::CompileError;

/// What kind of value an operator accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// One bound parameter holding a non-array, non-object value
    Scalar,
    /// One bound parameter holding any JSON value (arrays bind as array parameters)
    Any,
    /// One bound parameter per array element
    Array,
    /// A boolean switch; binds nothing
    Flag,
}

/// Catalog entry
#[derive(Clone)]
pub struct Operation {
    pub name: &'static str,
    pub shape: ValueShape,
    /// (column, placeholders) -> predicate
    template: fn(&str, &[String]) -> String,
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// A rendered predicate and the values it binds
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub bindings: Vec<(String, Value)>,
}

/// Get the catalog entry for an operator name such as `_gte`
pub fn get_operation(name: &str) -> Option<&'static Operation> {
    OPERATIONS.get(name)
}

/// Split `field_op` into (`field`, operation) when the key ends in a known operator suffix.
/// Longer suffixes win, so `age_gte` never parses as `age_g` + `_te`.
pub fn split_operator_suffix(key: &str) -> Option<(&str, &'static Operation)> {
    SUFFIXES.iter().find_map(|suffix| {
        key.strip_suffix(suffix)
            .filter(|stem| !stem.is_empty())
            .and_then(|stem| get_operation(suffix).map(|op| (stem, op)))
    })
}

impl Operation {
    /// Render the predicate for `column` compared against `value`.
    /// `next_param` yields a fresh, statement-unique parameter name per call.
    pub fn apply(
        &self,
        column: &str,
        value: &Value,
        next_param: &mut dyn FnMut() -> String,
    ) -> Result<Predicate, CompileError> {
        // Null comparands never bind: `= NULL` is never true in SQL
        if value.is_null() {
            match self.name {
                "_eq" => return Ok(raw(format!("{} IS NULL", column))),
                "_ne" => return Ok(raw(format!("{} IS NOT NULL", column))),
                _ => {}
            }
        }

        match self.shape {
            ValueShape::Flag => {
                let flag = value
                    .as_bool()
                    .ok_or_else(|| CompileError::invalid_value(self.name, "a boolean", value))?;
                Ok(raw((self.template)(column, &[flag.to_string()])))
            }
            ValueShape::Scalar | ValueShape::Any => {
                if self.shape == ValueShape::Scalar && (value.is_array() || value.is_object()) {
                    return Err(CompileError::invalid_value(self.name, "a scalar", value));
                }
                if value.is_object() {
                    return Err(CompileError::invalid_value(self.name, "a scalar or array", value));
                }
                let name = next_param();
                let sql = (self.template)(column, &[placeholder(&name)]);
                Ok(Predicate {
                    sql,
                    bindings: vec![(name, value.clone())],
                })
            }
            ValueShape::Array => {
                let items = value
                    .as_array()
                    .ok_or_else(|| CompileError::invalid_value(self.name, "an array", value))?;

                if items.is_empty() {
                    return match self.name {
                        "_in" => Ok(raw("FALSE".to_string())),
                        "_nin" | "_contains" => Ok(raw("TRUE".to_string())),
                        _ => Err(CompileError::invalid_value(
                            self.name,
                            "a non-empty array",
                            value,
                        )),
                    };
                }
                if matches!(self.name, "_in" | "_nin") && items.iter().any(Value::is_null) {
                    return self.apply_with_nulls(column, items, next_param);
                }
                if self.name == "_between" && items.len() != 2 {
                    return Err(CompileError::invalid_value(
                        self.name,
                        "an array of exactly two bounds",
                        value,
                    ));
                }

                let mut bindings = Vec::new();
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(bind_element(self.name, item, next_param, &mut bindings)?);
                }
                Ok(Predicate {
                    sql: (self.template)(column, &rendered),
                    bindings,
                })
            }
        }
    }

    /// `NULL` never matches `IN`/`NOT IN`; test it with `IS [NOT] NULL` beside the list
    fn apply_with_nulls(
        &self,
        column: &str,
        items: &[Value],
        next_param: &mut dyn FnMut() -> String,
    ) -> Result<Predicate, CompileError> {
        let (null_test, joiner) = if self.name == "_in" {
            ("IS NULL", "OR")
        } else {
            ("IS NOT NULL", "AND")
        };
        let null_sql = format!("{} {}", column, null_test);

        let present: Vec<Value> = items.iter().filter(|item| !item.is_null()).cloned().collect();
        if present.is_empty() {
            return Ok(raw(null_sql));
        }
        let mut listed = self.apply(column, &Value::Array(present), next_param)?;
        listed.sql = format!("({} {} {})", listed.sql, joiner, null_sql);
        Ok(listed)
    }
}

/// Bind one array element; nested arrays become row values `(:a, :b)` for multi-column fields
fn bind_element(
    operator: &str,
    item: &Value,
    next_param: &mut dyn FnMut() -> String,
    bindings: &mut Vec<(String, Value)>,
) -> Result<String, CompileError> {
    match item {
        Value::Object(_) => Err(CompileError::invalid_value(
            operator.to_string(),
            "scalar elements",
            item,
        )),
        Value::Array(parts) => {
            let mut row = Vec::with_capacity(parts.len());
            for part in parts {
                if part.is_array() || part.is_object() {
                    return Err(CompileError::invalid_value(
                        operator.to_string(),
                        "scalar row elements",
                        item,
                    ));
                }
                let name = next_param();
                row.push(placeholder(&name));
                bindings.push((name, part.clone()));
            }
            Ok(format!("({})", row.join(", ")))
        }
        scalar => {
            let name = next_param();
            let rendered = placeholder(&name);
            bindings.push((name, scalar.clone()));
            Ok(rendered)
        }
    }
}

fn raw(sql: String) -> Predicate {
    Predicate {
        sql,
        bindings: Vec::new(),
    }
}

/// Named placeholder for a bound parameter
pub fn placeholder(name: &str) -> String {
    format!(":{}", name)
}

fn infix(column: &str, operator: &str, param: &str) -> String {
    format!("{} {} {}", column, operator, param)
}

// Static operator table
lazy_static::lazy_static! {
    static ref OPERATIONS: HashMap<&'static str, Operation> = {
        let mut m = HashMap::new();

        // ===== COMPARISON =====
        m.insert("_eq", Operation {
            name: "_eq",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, "=", &p[0]),
        });
        m.insert("_ne", Operation {
            name: "_ne",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, "<>", &p[0]),
        });
        m.insert("_gt", Operation {
            name: "_gt",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, ">", &p[0]),
        });
        m.insert("_gte", Operation {
            name: "_gte",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, ">=", &p[0]),
        });
        m.insert("_lt", Operation {
            name: "_lt",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, "<", &p[0]),
        });
        m.insert("_lte", Operation {
            name: "_lte",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, "<=", &p[0]),
        });

        // ===== TEXT =====
        m.insert("_like", Operation {
            name: "_like",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, "LIKE", &p[0]),
        });
        m.insert("_ilike", Operation {
            name: "_ilike",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, "ILIKE", &p[0]),
        });
        m.insert("_re", Operation {
            name: "_re",
            shape: ValueShape::Scalar,
            template: |c, p| infix(c, "~", &p[0]),
        });
        m.insert("_fulltext", Operation {
            name: "_fulltext",
            shape: ValueShape::Scalar,
            template: |c, p| format!("to_tsvector({}) @@ plainto_tsquery({})", c, p[0]),
        });

        // ===== SETS & ARRAYS =====
        m.insert("_in", Operation {
            name: "_in",
            shape: ValueShape::Array,
            template: |c, p| format!("{} IN ({})", c, p.join(", ")),
        });
        m.insert("_nin", Operation {
            name: "_nin",
            shape: ValueShape::Array,
            template: |c, p| format!("{} NOT IN ({})", c, p.join(", ")),
        });
        m.insert("_between", Operation {
            name: "_between",
            shape: ValueShape::Array,
            template: |c, p| format!("{} BETWEEN {} AND {}", c, p[0], p[1]),
        });
        m.insert("_contains", Operation {
            name: "_contains",
            shape: ValueShape::Array,
            template: |c, p| format!("{} @> ARRAY[{}]", c, p.join(", ")),
        });
        m.insert("_contained", Operation {
            name: "_contained",
            shape: ValueShape::Any,
            template: |c, p| infix(c, "<@", &p[0]),
        });
        m.insert("_overlap", Operation {
            name: "_overlap",
            shape: ValueShape::Any,
            template: |c, p| infix(c, "&&", &p[0]),
        });

        // ===== NULLNESS =====
        m.insert("_exists", Operation {
            name: "_exists",
            shape: ValueShape::Flag,
            template: |c, p| {
                if p[0] == "true" {
                    format!("{} IS NOT NULL", c)
                } else {
                    format!("{} IS NULL", c)
                }
            },
        });

        m
    };

    static ref SUFFIXES: Vec<&'static str> = {
        let mut names: Vec<&'static str> = OPERATIONS.keys().copied().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        names
    };
}

//! Computed fields
//!
//! A computed field has no backing column of its own. It declares the physical columns it
//! needs; the compiler selects those columns into a hidden `__raw` object next to the node's
//! regular keys and emits a `null` placeholder under the field name. After execution the
//! resolver turns the raw columns into the field value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Key of the hidden object carrying raw columns for computed fields
pub const RAW_COLUMNS_KEY: &str = "__raw";

pub type Resolver = Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct CustomField {
    pub name: String,
    pub required_columns: Vec<String>,
    resolver: Resolver,
}

impl fmt::Debug for CustomField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomField")
            .field("name", &self.name)
            .field("required_columns", &self.required_columns)
            .finish()
    }
}

impl CustomField {
    pub fn new<I, S, F>(name: impl Into<String>, required_columns: I, resolver: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        CustomField {
            name: name.into(),
            required_columns: required_columns.into_iter().map(Into::into).collect(),
            resolver: Arc::new(resolver),
        }
    }

    /// Compute the value from the raw column map (keys are column names)
    pub fn resolve(&self, raw_columns: &Map<String, Value>) -> Value {
        (self.resolver)(raw_columns)
    }
}

/// Computed fields by entity, then by field name
#[derive(Debug, Clone, Default)]
pub struct CustomFieldRegistry {
    entities: HashMap<String, HashMap<String, CustomField>>,
}

impl CustomFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: impl Into<String>, field: CustomField) -> &mut Self {
        self.entities
            .entry(entity.into())
            .or_default()
            .insert(field.name.clone(), field);
        self
    }

    pub fn get(&self, entity: &str, field: &str) -> Option<&CustomField> {
        self.entities.get(entity)?.get(field)
    }

    pub fn has_fields(&self, entity: &str) -> bool {
        self.entities.get(entity).is_some_and(|fields| !fields.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entities.values().all(HashMap::is_empty)
    }
}

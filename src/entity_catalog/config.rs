use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::entity::{EntityMetadata, EntityProperty, ReferenceKind};
use super::errors::MetadataError;

/// Entity metadata is described in YAML with the following structure:
///
/// ```yaml
/// entities:
///   - name: Fellowship          # Entity name used in requests
///     table: fellowship         # Physical table (optionally schema-qualified)
///     primary_keys: [id]
///     properties:
///       id: { type: number }    # Column defaults to the property name
///       name: { type: string, column: fellowship_name }
///       members:
///         type: Person
///         reference: 1:m
///         mapped_by: fellowship
///   - name: Person
///     table: person
///     primary_keys: [id]
///     properties:
///       id: { type: number }
///       fellowship:
///         type: Fellowship
///         reference: m:1
///         join_columns: [fellowship_id]
/// ```
///
/// Many-to-many owners declare `pivot_table`, `join_columns` (pivot -> owner) and
/// `inverse_join_columns` (pivot -> target); the inverse side declares only `mapped_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCatalogConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub entities: Vec<EntityDefinition>,
}

/// Entity definition in the metadata file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    /// Physical table name
    pub table: String,
    pub primary_keys: Vec<String>,
    pub properties: HashMap<String, PropertyDefinition>,
}

/// Property definition in the metadata file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Scalar type name or related entity name
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub reference: ReferenceKind,
    /// Single backing column (scalar shorthand)
    #[serde(default)]
    pub column: Option<String>,
    /// Multiple backing columns
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub join_columns: Vec<String>,
    #[serde(default)]
    pub referenced_columns: Vec<String>,
    #[serde(default)]
    pub inverse_join_columns: Vec<String>,
    #[serde(default)]
    pub pivot_table: Option<String>,
}

impl PropertyDefinition {
    /// Convert into runtime property metadata, filling column defaults
    pub fn to_property(&self, name: &str) -> EntityProperty {
        let mut columns: Vec<String> = self
            .column
            .iter()
            .cloned()
            .chain(self.columns.iter().cloned())
            .collect();

        match self.reference {
            ReferenceKind::Scalar if columns.is_empty() => columns.push(name.to_string()),
            ReferenceKind::ManyToOne | ReferenceKind::OneToOne
                if columns.is_empty() && self.mapped_by.is_none() =>
            {
                columns = self.join_columns.clone();
            }
            _ => {}
        }

        EntityProperty {
            name: name.to_string(),
            type_name: self.type_name.clone(),
            reference: self.reference,
            columns,
            mapped_by: self.mapped_by.clone(),
            join_columns: self.join_columns.clone(),
            referenced_columns: self.referenced_columns.clone(),
            inverse_join_columns: self.inverse_join_columns.clone(),
            pivot_table: self.pivot_table.clone(),
        }
    }
}

impl EntityDefinition {
    pub fn to_metadata(&self) -> EntityMetadata {
        let mut metadata = EntityMetadata::new(&self.name, &self.table, self.primary_keys.clone());
        for (name, definition) in &self.properties {
            metadata = metadata.with_property(definition.to_property(name));
        }
        metadata
    }
}

impl EntityCatalogConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MetadataError> {
        serde_yaml::from_str(yaml).map_err(|e| MetadataError::ParseError {
            error: e.to_string(),
        })
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| MetadataError::ReadError {
            error: format!("{}: {}", path.as_ref().display(), e),
        })?;
        Self::from_yaml_str(&content)
    }
}

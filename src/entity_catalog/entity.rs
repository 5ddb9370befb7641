use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::errors::MetadataError;

/// Relationship cardinality of a property, or `Scalar` for plain columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    #[default]
    #[serde(alias = "scalar")]
    Scalar,
    #[serde(alias = "1:1")]
    OneToOne,
    #[serde(alias = "1:m")]
    OneToMany,
    #[serde(alias = "m:1")]
    ManyToOne,
    #[serde(alias = "m:n")]
    ManyToMany,
}

impl ReferenceKind {
    /// True when the relation renders as a JSON array
    pub fn is_plural(&self) -> bool {
        matches!(self, ReferenceKind::OneToMany | ReferenceKind::ManyToMany)
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self, ReferenceKind::Scalar)
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReferenceKind::Scalar => "scalar",
            ReferenceKind::OneToOne => "1:1",
            ReferenceKind::OneToMany => "1:m",
            ReferenceKind::ManyToOne => "m:1",
            ReferenceKind::ManyToMany => "m:n",
        };
        write!(f, "{}", label)
    }
}

/// One logical field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProperty {
    pub name: String,
    /// Scalar type name, or the related entity name for relations
    pub type_name: String,
    pub reference: ReferenceKind,
    /// Backing physical columns; empty for inverse relations
    pub columns: Vec<String>,
    /// Owning-side property on the related entity (inverse 1:1, 1:m, inverse m:n)
    pub mapped_by: Option<String>,
    /// Forward foreign-key columns on this entity's table (m:1, owning 1:1)
    /// or pivot columns pointing at this entity (m:n)
    pub join_columns: Vec<String>,
    /// Columns of the related table referenced by `join_columns` (m:1, owning 1:1)
    pub referenced_columns: Vec<String>,
    /// Pivot columns pointing at the related entity (m:n)
    pub inverse_join_columns: Vec<String>,
    pub pivot_table: Option<String>,
}

impl EntityProperty {
    /// A plain column-backed property
    pub fn scalar(
        name: impl Into<String>,
        type_name: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        EntityProperty {
            name: name.into(),
            type_name: type_name.into(),
            reference: ReferenceKind::Scalar,
            columns: vec![column.into()],
            mapped_by: None,
            join_columns: Vec::new(),
            referenced_columns: Vec::new(),
            inverse_join_columns: Vec::new(),
            pivot_table: None,
        }
    }

    /// A relation property with no join details yet
    pub fn relation(
        name: impl Into<String>,
        target: impl Into<String>,
        reference: ReferenceKind,
    ) -> Self {
        EntityProperty {
            name: name.into(),
            type_name: target.into(),
            reference,
            columns: Vec::new(),
            mapped_by: None,
            join_columns: Vec::new(),
            referenced_columns: Vec::new(),
            inverse_join_columns: Vec::new(),
            pivot_table: None,
        }
    }

    pub fn with_mapped_by(mut self, mapped_by: impl Into<String>) -> Self {
        self.mapped_by = Some(mapped_by.into());
        self
    }

    pub fn with_join_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.join_columns = columns.into_iter().map(Into::into).collect();
        if !self.reference.is_plural() {
            self.columns = self.join_columns.clone();
        }
        self
    }

    pub fn with_referenced_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.referenced_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pivot<I, J, S, T>(mut self, table: impl Into<String>, join: I, inverse: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        self.pivot_table = Some(table.into());
        self.join_columns = join.into_iter().map(Into::into).collect();
        self.inverse_join_columns = inverse.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_relation(&self) -> bool {
        self.reference.is_relation()
    }

    /// Owning side of a singular relation (foreign key lives on this entity's table)
    pub fn is_owning_singular(&self) -> bool {
        match self.reference {
            ReferenceKind::ManyToOne => true,
            ReferenceKind::OneToOne => self.mapped_by.is_none(),
            _ => false,
        }
    }
}

/// Physical description of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    pub table_name: String,
    pub primary_keys: Vec<String>,
    pub properties: HashMap<String, EntityProperty>,
}

impl EntityMetadata {
    pub fn new<I, S>(
        name: impl Into<String>,
        table_name: impl Into<String>,
        primary_keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EntityMetadata {
            name: name.into(),
            table_name: table_name.into(),
            primary_keys: primary_keys.into_iter().map(Into::into).collect(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, property: EntityProperty) -> Self {
        self.properties.insert(property.name.clone(), property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&EntityProperty> {
        self.properties.get(name)
    }

    /// Property lookup that fails with a configuration error
    pub fn require_property(&self, name: &str) -> Result<&EntityProperty, MetadataError> {
        self.properties
            .get(name)
            .ok_or_else(|| MetadataError::UnknownProperty {
                entity: self.name.clone(),
                property: name.to_string(),
            })
    }

    /// Names of the properties backing the primary key columns, in key order
    pub fn primary_key_properties(&self) -> Vec<&EntityProperty> {
        let mut found: Vec<&EntityProperty> = Vec::new();
        for pk in &self.primary_keys {
            let property = self
                .properties
                .values()
                .find(|p| !p.is_relation() && p.columns.iter().any(|c| c == pk));
            if let Some(property) = property {
                if !found.iter().any(|f| f.name == property.name) {
                    found.push(property);
                }
            }
        }
        found
    }

    /// Check the entity-local invariants: a primary key exists and each key column backs a property
    pub fn validate_primary_keys(&self) -> Result<(), MetadataError> {
        if self.primary_keys.is_empty() {
            return Err(MetadataError::MissingPrimaryKey {
                entity: self.name.clone(),
            });
        }
        for pk in &self.primary_keys {
            let backed = self
                .properties
                .values()
                .any(|p| p.columns.iter().any(|c| c == pk));
            if !backed {
                return Err(MetadataError::PrimaryKeyWithoutProperty {
                    entity: self.name.clone(),
                    column: pk.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Fail with `ColumnCountMismatch` unless `found == expected`
pub fn check_column_count(
    entity: &str,
    property: &str,
    side: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), MetadataError> {
    if expected != found || found == 0 {
        return Err(MetadataError::column_count_mismatch(
            entity, property, side, expected, found,
        ));
    }
    Ok(())
}

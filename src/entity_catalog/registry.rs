//! Metadata registry and provider contract
//!
//! The compiler only ever reads metadata through [`MetadataProvider`]. The bundled
//! [`MetadataRegistry`] validates every entity when it is built, so a registry that loaded
//! successfully will not raise configuration errors for identifier shape, primary keys or
//! relation column counts later on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::config::EntityCatalogConfig;
use super::entity::EntityMetadata;
use super::errors::MetadataError;
use super::join_spec::{resolve_join, JoinSpec};

lazy_static! {
    static ref COLUMN_IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref TABLE_IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap();
}

/// Read access to entity metadata
pub trait MetadataProvider: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    fn get_metadata(&self, name: &str) -> Result<Arc<EntityMetadata>, MetadataError>;
}

/// In-memory, validated set of entities
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, Arc<EntityMetadata>>,
}

impl MetadataRegistry {
    /// Build and validate a registry from a list of entities
    pub fn new(entities: impl IntoIterator<Item = EntityMetadata>) -> Result<Self, MetadataError> {
        let mut registry = MetadataRegistry::default();
        for entity in entities {
            if registry.entities.contains_key(&entity.name) {
                return Err(MetadataError::DuplicateEntity {
                    entity: entity.name,
                });
            }
            registry
                .entities
                .insert(entity.name.clone(), Arc::new(entity));
        }
        registry.validate()?;
        log::info!("Metadata registry loaded {} entities", registry.entities.len());
        Ok(registry)
    }

    pub fn from_config(config: &EntityCatalogConfig) -> Result<Self, MetadataError> {
        Self::new(config.entities.iter().map(|e| e.to_metadata()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, MetadataError> {
        Self::from_config(&EntityCatalogConfig::from_yaml_str(yaml)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        Self::from_config(&EntityCatalogConfig::from_yaml_file(path)?)
    }

    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validate identifiers, primary keys and relation symmetry for every entity
    fn validate(&self) -> Result<(), MetadataError> {
        for entity in self.entities.values() {
            check_table_identifier(&entity.table_name, &entity.name)?;
            for pk in &entity.primary_keys {
                check_column_identifier(pk, &entity.name)?;
            }
            entity.validate_primary_keys()?;

            for property in entity.properties.values() {
                let context = format!("{}.{}", entity.name, property.name);
                for column in property
                    .columns
                    .iter()
                    .chain(&property.join_columns)
                    .chain(&property.referenced_columns)
                    .chain(&property.inverse_join_columns)
                {
                    check_column_identifier(column, &context)?;
                }
                if let Some(pivot) = &property.pivot_table {
                    check_table_identifier(pivot, &context)?;
                }

                if !property.is_relation() {
                    if property.columns.is_empty() {
                        return Err(MetadataError::incomplete_relation(
                            &entity.name,
                            &property.name,
                            "backing columns",
                        ));
                    }
                    continue;
                }

                let target = self.get_metadata(&property.type_name)?;
                let spec = resolve_join(entity, property, &target)?;
                if let JoinSpec::Pivot { .. } = spec {
                    log::debug!("{} resolves through pivot table", context);
                }
            }
        }
        Ok(())
    }
}

impl MetadataProvider for MetadataRegistry {
    fn exists(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    fn get_metadata(&self, name: &str) -> Result<Arc<EntityMetadata>, MetadataError> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| MetadataError::UnknownEntity {
                entity: name.to_string(),
            })
    }
}

fn check_column_identifier(identifier: &str, context: &str) -> Result<(), MetadataError> {
    if COLUMN_IDENTIFIER.is_match(identifier) {
        Ok(())
    } else {
        Err(MetadataError::InvalidIdentifier {
            identifier: identifier.to_string(),
            context: context.to_string(),
        })
    }
}

fn check_table_identifier(identifier: &str, context: &str) -> Result<(), MetadataError> {
    if TABLE_IDENTIFIER.is_match(identifier) {
        Ok(())
    } else {
        Err(MetadataError::InvalidIdentifier {
            identifier: identifier.to_string(),
            context: context.to_string(),
        })
    }
}

pub mod config;
pub mod entity;
pub mod errors;
pub mod join_spec;
pub mod registry;

pub use config::{EntityCatalogConfig, EntityDefinition, PropertyDefinition};
pub use entity::{EntityMetadata, EntityProperty, ReferenceKind};
pub use errors::MetadataError;
pub use join_spec::{resolve_join, JoinSpec};
pub use registry::{MetadataProvider, MetadataRegistry};

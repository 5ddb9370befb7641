//! nestql - nested selections compiled to single PostgreSQL JSON queries
//!
//! This crate turns a request into one parameterized statement through:
//! - Entity metadata loaded from YAML and validated up front
//! - A query compiler that maps selections and filters onto lateral joins
//! - A query manager that runs statements through an injected executor

pub mod config;
pub mod entity_catalog;
pub mod query_compiler;
pub mod query_manager;

pub use config::CompilerConfig;
pub use entity_catalog::{MetadataProvider, MetadataRegistry};
pub use query_compiler::{CompileError, CompiledQuery, FieldSelection, Mapper, QueryInput};
pub use query_manager::{QueryExecutor, QueryManager, QueryRequest};

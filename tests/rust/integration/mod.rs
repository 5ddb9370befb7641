//! Integration tests - the query manager end to end against a mocked executor
//!
//! No database is required; the executor double records the statement and returns canned rows.

mod query_manager_tests;

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;

use nestql::entity_catalog::{MetadataProvider, MetadataRegistry};
use nestql::query_compiler::Bindings;
use nestql::query_manager::{ExecutorError, QueryExecutor, Row, ROW_COLUMN};

mock! {
    pub Executor {}

    #[async_trait]
    impl QueryExecutor for Executor {
        async fn execute_query(
            &self,
            sql: &str,
            bindings: &Bindings,
        ) -> Result<Vec<Row>, ExecutorError>;
    }
}

pub fn middle_earth() -> Arc<dyn MetadataProvider> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/middle_earth.yaml");
    Arc::new(MetadataRegistry::from_yaml_file(path).expect("fixture metadata should load"))
}

/// A row whose `val` column holds the given document
pub fn row(value: Value) -> Row {
    let mut row = Row::new();
    row.insert(ROW_COLUMN.to_string(), value);
    row
}

//! Execution seam: the compiler never talks to a database itself

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::query_compiler::Bindings;

/// Errors raised by an executor; passed to callers unchanged
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// One result row, keyed by column name
pub type Row = Map<String, Value>;

/// Name of the JSON column every compiled statement returns
pub const ROW_COLUMN: &str = "val";

/// Runs a compiled statement with its named bindings
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_query(
        &self,
        sql: &str,
        bindings: &Bindings,
    ) -> Result<Vec<Row>, ExecutorError>;
}

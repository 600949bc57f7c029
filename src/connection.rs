use crate::error::Result;
use crate::query::QueryExp;
use crate::table::TableRep;
use async_trait::async_trait;

/// An evaluator of query expressions against a backing engine.
///
/// Calls are independent request/response cycles: any number may be in
/// flight at once over one connection, and none mutates shared state.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Compiles and runs `query`, returning every row or an error.
    async fn eval_query(&self, query: &QueryExp) -> Result<TableRep>;

    /// Number of rows `query` would return.
    async fn row_count(&self, query: &QueryExp) -> Result<usize>;

    /// `Table` leaf for a table known to this connection.
    async fn table_query(&self, table_name: &str) -> Result<QueryExp>;
}

// Backend query interface - the seam between the coordination core and
// whatever actually executes queries

pub mod http;
pub mod sqlite;

use async_trait::async_trait;

use crate::fetch::error::FetchError;
use crate::query::predicate::QueryPredicate;

pub use http::HttpBackend;
pub use sqlite::SqliteBackend;

/// One result row, as returned by the query collaborator
pub type RowRecord = serde_json::Map<String, serde_json::Value>;

/// Read-only query execution. The core never writes through this seam
/// and never owns schema or authentication; it hands over a table or
/// view identifier plus a parametrized predicate and expects an ordered
/// sequence of rows back.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Backend name for logging (e.g. "sqlite", "http")
    fn name(&self) -> &'static str;

    /// Execute `SELECT * FROM table WHERE predicate` and return the rows
    /// in backend order. Transport timeouts surface as
    /// `FetchError::Timeout`.
    async fn fetch_rows(
        &self,
        table: &str,
        predicate: &QueryPredicate,
    ) -> Result<Vec<RowRecord>, FetchError>;
}

//! SQLite query backend
//!
//! Runs the dashboard against a local snapshot dataset. Owns the
//! connection behind a mutex and binds every predicate parameter
//! positionally; the predicate text never contains user values.

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{QueryBackend, RowRecord};
use crate::fetch::error::FetchError;
use crate::query::builder::is_identifier;
use crate::query::predicate::QueryPredicate;

/// Query backend over a local SQLite database
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database at the given path
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&db_path).context("Failed to open database")?;
        log::info!("sqlite backend opened at: {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests and demos
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a function with access to the connection (seeding tables,
    /// maintenance)
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock database connection: {}", e))?;
        f(&conn)
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        // Analytics views hold no blobs; anything unexpected maps to null
        ValueRef::Blob(_) => Value::Null,
    }
}

#[async_trait]
impl QueryBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch_rows(
        &self,
        table: &str,
        predicate: &QueryPredicate,
    ) -> Result<Vec<RowRecord>, FetchError> {
        if !is_identifier(table) {
            return Err(FetchError::Backend(format!("invalid table name: {table:?}")));
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Backend(format!("connection lock failed: {e}")))?;

        let sql = format!("SELECT * FROM {} WHERE {}", table, predicate.clauses());
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| FetchError::Backend(e.to_string()))?;

        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(predicate.params().iter()))
            .map_err(|e| FetchError::Backend(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| FetchError::Backend(e.to_string()))? {
            let mut record = RowRecord::new();
            for (index, column) in columns.iter().enumerate() {
                let value = row
                    .get_ref(index)
                    .map_err(|e| FetchError::Decode(e.to_string()))?;
                record.insert(column.clone(), value_to_json(value));
            }
            out.push(record);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::snapshot::{DateRange, FilterSnapshot};
    use crate::query::builder::build_predicate;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seeded_backend() -> SqliteBackend {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .with_connection(|conn| {
                conn.execute_batch(
                    r#"
                    CREATE TABLE brand_sales (
                        transaction_date TEXT NOT NULL,
                        brand TEXT NOT NULL,
                        region TEXT NOT NULL,
                        confidence REAL,
                        total_amount REAL NOT NULL
                    );
                    INSERT INTO brand_sales VALUES
                        ('2024-01-10', 'Oishi',  'NCR',     0.95, 120.0),
                        ('2024-01-20', 'Alaska', 'NCR',     0.80, 310.5),
                        ('2024-02-05', 'Oishi',  'Visayas', 0.40,  75.0);
                    "#,
                )?;
                Ok(())
            })
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn unconditional_predicate_returns_every_row() {
        let backend = seeded_backend();
        let rows = backend
            .fetch_rows("brand_sales", &QueryPredicate::unconditional())
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["brand"], "Oishi");
        assert_eq!(rows[0]["total_amount"], 120.0);
    }

    #[tokio::test]
    async fn snapshot_predicate_filters_rows() {
        let backend = seeded_backend();
        let mut snapshot = FilterSnapshot::default();
        snapshot.date_range = DateRange::new(Some(date("2024-01-01")), Some(date("2024-01-31")));
        snapshot.brands.insert("Oishi".to_string());

        let rows = backend
            .fetch_rows("brand_sales", &build_predicate(&snapshot))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["transaction_date"], "2024-01-10");
    }

    #[tokio::test]
    async fn hostile_brand_value_is_bound_not_executed() {
        let backend = seeded_backend();
        let mut snapshot = FilterSnapshot::default();
        snapshot
            .brands
            .insert("Oishi'); DROP TABLE brand_sales; --".to_string());

        let rows = backend
            .fetch_rows("brand_sales", &build_predicate(&snapshot))
            .await
            .unwrap();
        assert!(rows.is_empty());

        // The table survived the attempt
        let count: i64 = backend
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM brand_sales", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn invalid_table_name_is_rejected() {
        let backend = seeded_backend();
        let result = backend
            .fetch_rows("brand_sales; --", &QueryPredicate::unconditional())
            .await;
        assert!(matches!(result, Err(FetchError::Backend(_))));
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("analytics.db");
        let _backend = SqliteBackend::open(path.clone()).unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn inverted_range_yields_an_empty_result_not_an_error() {
        let backend = seeded_backend();
        let mut snapshot = FilterSnapshot::default();
        snapshot.date_range = DateRange::new(Some(date("2024-03-01")), Some(date("2024-01-01")));

        let rows = backend
            .fetch_rows("brand_sales", &build_predicate(&snapshot))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}

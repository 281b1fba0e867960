//! Parametrized query predicates
//!
//! A predicate is a `?`-placeholder SQL fragment plus the ordered values
//! that bind to it. User-supplied content only ever travels in the
//! parameter list, never in the fragment text.

use chrono::NaiveDate;
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// A single bound value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueryParam {
    Text(String),
    Date(NaiveDate),
    Real(f64),
}

impl ToSql for QueryParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            QueryParam::Text(s) => Ok(ToSqlOutput::Borrowed(s.as_str().into())),
            QueryParam::Date(d) => Ok(ToSqlOutput::Owned(SqlValue::Text(
                d.format("%Y-%m-%d").to_string(),
            ))),
            QueryParam::Real(v) => Ok(ToSqlOutput::Owned(SqlValue::Real(*v))),
        }
    }
}

/// Derived, read-only filter expression for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPredicate {
    clauses: String,
    params: Vec<QueryParam>,
}

impl QueryPredicate {
    pub(crate) fn new(clauses: String, params: Vec<QueryParam>) -> Self {
        Self { clauses, params }
    }

    /// Matches every row; produced by an empty snapshot
    pub fn unconditional() -> Self {
        Self {
            clauses: "1 = 1".to_string(),
            params: Vec::new(),
        }
    }

    /// Matches no row; produced by an inverted date range
    pub fn never() -> Self {
        Self {
            clauses: "0 = 1".to_string(),
            params: Vec::new(),
        }
    }

    /// The `?`-parametrized WHERE fragment (without the WHERE keyword)
    pub fn clauses(&self) -> &str {
        &self.clauses
    }

    /// Values bound to the placeholders, in order
    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    pub fn is_unconditional(&self) -> bool {
        self.clauses == "1 = 1"
    }
}

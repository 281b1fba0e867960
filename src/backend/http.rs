//! Hosted query backend
//!
//! Posts the predicate to the data service's read-only query endpoint
//! and decodes the row payload. The transport timeout lives here (the
//! coordinator has none of its own) and surfaces as a fetch error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{QueryBackend, RowRecord};
use crate::fetch::error::FetchError;
use crate::query::predicate::{QueryParam, QueryPredicate};

/// Wire format for a query request
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    table: &'a str,
    clauses: &'a str,
    params: &'a [QueryParam],
}

/// Wire format for a query response
#[derive(Debug, Deserialize)]
struct QueryResponse {
    rows: Vec<RowRecord>,
}

/// Query backend over the hosted data service's REST endpoint
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client against `base_url` (e.g. "https://data.example.com")
    /// with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_rows(
        &self,
        table: &str,
        predicate: &QueryPredicate,
    ) -> Result<Vec<RowRecord>, FetchError> {
        let request = QueryRequest {
            table,
            clauses: predicate.clauses(),
            params: predicate.params(),
        };

        let response = self
            .client
            .post(self.query_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(e.to_string())
                } else {
                    FetchError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Backend(format!(
                "query endpoint returned {status}"
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        log::debug!("http backend returned {} rows for {}", body.rows.len(), table);
        Ok(body.rows)
    }
}

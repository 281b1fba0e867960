//! Error types for data fetches

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error surfaced by a section fetch. Recorded on the owning cache entry
/// and section view only; never propagated across sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FetchError {
    /// Backend rejected or failed the query
    Backend(String),
    /// Transport-level timeout
    Timeout(String),
    /// Response arrived but could not be decoded
    Decode(String),
    /// Result superseded by a newer request for the same section
    Cancelled,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Backend(msg) => write!(f, "Backend error: {}", msg),
            FetchError::Timeout(msg) => write!(f, "Request timed out: {}", msg),
            FetchError::Decode(msg) => write!(f, "Failed to decode response: {}", msg),
            FetchError::Cancelled => write!(f, "Request superseded by a newer one"),
        }
    }
}

impl std::error::Error for FetchError {}

//! Snapshot to predicate translation
//!
//! Pure and deterministic: the same snapshot always yields a
//! byte-identical predicate. Clause order is fixed: date range, brand
//! set, region set, confidence threshold, then refinements in their
//! stored order, joined with AND. Values are always bound as parameters;
//! refinement keys name columns, so they are validated as identifiers
//! and skipped (with a warning) when they are not.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::filters::snapshot::FilterSnapshot;
use crate::sections::Section;
use super::predicate::{QueryParam, QueryPredicate};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

/// Whether `name` is safe to splice as a column or table name
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

/// Translate a filter snapshot into a parametrized predicate.
///
/// Degradations instead of errors: an inverted date range yields the
/// always-false predicate (empty result, page stays alive), an
/// out-of-range confidence threshold is clamped to [0, 1], and a
/// refinement with a non-identifier key is dropped.
pub fn build_predicate(snapshot: &FilterSnapshot) -> QueryPredicate {
    if snapshot.date_range.is_inverted() {
        log::debug!(
            "inverted date range at revision {}, degrading to empty result",
            snapshot.revision
        );
        return QueryPredicate::never();
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<QueryParam> = Vec::new();

    match (snapshot.date_range.start, snapshot.date_range.end) {
        (Some(start), Some(end)) => {
            clauses.push("transaction_date BETWEEN ? AND ?".to_string());
            params.push(QueryParam::Date(start));
            params.push(QueryParam::Date(end));
        }
        (Some(start), None) => {
            clauses.push("transaction_date >= ?".to_string());
            params.push(QueryParam::Date(start));
        }
        (None, Some(end)) => {
            clauses.push("transaction_date <= ?".to_string());
            params.push(QueryParam::Date(end));
        }
        (None, None) => {}
    }

    if !snapshot.brands.is_empty() {
        clauses.push(format!("brand IN ({})", placeholders(snapshot.brands.len())));
        for brand in &snapshot.brands {
            params.push(QueryParam::Text(brand.clone()));
        }
    }

    if !snapshot.regions.is_empty() {
        clauses.push(format!("region IN ({})", placeholders(snapshot.regions.len())));
        for region in &snapshot.regions {
            params.push(QueryParam::Text(region.clone()));
        }
    }

    if let Some(threshold) = snapshot.min_confidence {
        clauses.push("confidence >= ?".to_string());
        params.push(QueryParam::Real(threshold.clamp(0.0, 1.0)));
    }

    for refinement in &snapshot.refinements {
        if !is_identifier(&refinement.key) {
            log::warn!(
                "dropping refinement with non-identifier key: {:?}",
                refinement.key
            );
            continue;
        }
        clauses.push(format!("{} = ?", refinement.key));
        params.push(QueryParam::Text(refinement.value.clone()));
    }

    if clauses.is_empty() {
        return QueryPredicate::unconditional();
    }

    QueryPredicate::new(clauses.join(" AND "), params)
}

/// Revision-keyed memo over `build_predicate`, one entry per section.
/// Each section's predicate is built from the snapshot projected onto
/// its `fields_used`, so a section is never filtered by a field its
/// cache key ignores.
pub struct PredicateCache {
    inner: Mutex<HashMap<Section, (u64, QueryPredicate)>>,
}

impl PredicateCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, section: Section, snapshot: &FilterSnapshot) -> QueryPredicate {
        let mut memo = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((revision, predicate)) = memo.get(&section) {
            if *revision == snapshot.revision {
                return predicate.clone();
            }
        }
        let predicate = build_predicate(&snapshot.project(section.fields_used()));
        memo.insert(section, (snapshot.revision, predicate.clone()));
        predicate
    }
}

impl Default for PredicateCache {
    fn default() -> Self {
        Self::new()
    }
}

//! Immutable filter snapshots
//!
//! A `FilterSnapshot` is a point-in-time capture of every active filter
//! selection. Snapshots are never mutated in place; the store replaces the
//! whole value and bumps `revision`, so consumers detect change with a
//! single integer comparison.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::sections::FilterField;

/// Calendar date range, either bound optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Both bounds present
    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Both bounds present and start is after end. The store accepts this
    /// shape; the query builder degrades it to an empty result.
    pub fn is_inverted(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start > end,
            _ => false,
        }
    }

    /// Whether any bound is set
    pub fn is_active(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// The trailing N-day window ending at `today`, the preset the filter
    /// bar offers as "last 30 days" etc.
    pub fn trailing_days(today: NaiveDate, days: i64) -> Self {
        Self {
            start: Some(today - chrono::Duration::days(days)),
            end: Some(today),
        }
    }
}

/// A section-specific refinement: an extra column/value pair appended to
/// the predicate after the global filters. Order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refinement {
    pub key: String,
    pub value: String,
}

impl Refinement {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Point-in-time capture of all active filter selections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    /// Monotonically increasing update counter. Two snapshots from the
    /// same store never share a revision, even when their fields are equal.
    pub revision: u64,
    pub date_range: DateRange,
    pub brands: BTreeSet<String>,
    pub regions: BTreeSet<String>,
    pub min_confidence: Option<f64>,
    pub refinements: Vec<Refinement>,
}

impl Default for FilterSnapshot {
    fn default() -> Self {
        Self {
            revision: 0,
            date_range: DateRange::default(),
            brands: BTreeSet::new(),
            regions: BTreeSet::new(),
            min_confidence: None,
            refinements: Vec::new(),
        }
    }
}

impl FilterSnapshot {
    /// Number of filter groups with an active selection, for the filter
    /// bar badge
    pub fn active_filter_count(&self) -> usize {
        let mut count = 0;
        if self.date_range.is_active() {
            count += 1;
        }
        if !self.brands.is_empty() {
            count += 1;
        }
        if !self.regions.is_empty() {
            count += 1;
        }
        if self.min_confidence.is_some() {
            count += 1;
        }
        if !self.refinements.is_empty() {
            count += 1;
        }
        count
    }

    /// True when no filter group is active
    pub fn is_unfiltered(&self) -> bool {
        self.active_filter_count() == 0
    }

    /// Projection onto a declared field subset. Fields outside `fields`
    /// come back at their default (inactive) value; the revision is
    /// preserved. Sections use this so both their cache key and their
    /// query depend on exactly the same filters.
    pub fn project(&self, fields: &[FilterField]) -> FilterSnapshot {
        let mut projected = FilterSnapshot {
            revision: self.revision,
            ..FilterSnapshot::default()
        };
        for field in fields {
            match field {
                FilterField::DateRange => projected.date_range = self.date_range.clone(),
                FilterField::Brands => projected.brands = self.brands.clone(),
                FilterField::Regions => projected.regions = self.regions.clone(),
                FilterField::MinConfidence => projected.min_confidence = self.min_confidence,
                FilterField::Refinements => projected.refinements = self.refinements.clone(),
            }
        }
        projected
    }

    /// Human-readable chips describing the active filters
    pub fn summary(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if let (Some(start), Some(end)) = (self.date_range.start, self.date_range.end) {
            parts.push(format!("Date: {} to {}", start, end));
        }
        if !self.brands.is_empty() {
            parts.push(format!(
                "{} brand{}",
                self.brands.len(),
                if self.brands.len() == 1 { "" } else { "s" }
            ));
        }
        if !self.regions.is_empty() {
            parts.push(format!(
                "{} region{}",
                self.regions.len(),
                if self.regions.len() == 1 { "" } else { "s" }
            ));
        }
        if let Some(threshold) = self.min_confidence {
            parts.push(format!("Confidence >= {:.2}", threshold));
        }
        if !self.refinements.is_empty() {
            parts.push(format!("{} refinements", self.refinements.len()));
        }
        parts
    }
}

//! Dashboard sections and the filter fields each one consumes
//!
//! A section is one independently fetched, independently error-isolated
//! area of the dashboard. The `fields_used` projection is what keeps cache
//! keys narrow: a section only re-fetches when a filter it actually reads
//! has changed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dashboard sections, each backed by its own table or view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Overview,
    BrandPerformance,
    Trends,
    BehavioralInsights,
    RegionalSales,
}

/// Filter snapshot fields a section can depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    DateRange,
    Brands,
    Regions,
    MinConfidence,
    Refinements,
}

impl Section {
    /// All sections, in dashboard layout order
    pub const ALL: [Section; 5] = [
        Section::Overview,
        Section::BrandPerformance,
        Section::Trends,
        Section::BehavioralInsights,
        Section::RegionalSales,
    ];

    /// Stable identifier used in cache keys and logs
    pub fn key(&self) -> &'static str {
        match self {
            Section::Overview => "overview",
            Section::BrandPerformance => "brand_performance",
            Section::Trends => "trends",
            Section::BehavioralInsights => "behavioral_insights",
            Section::RegionalSales => "regional_sales",
        }
    }

    /// Backend table or view this section queries
    pub fn table(&self) -> &'static str {
        match self {
            Section::Overview => "transactions_summary",
            Section::BrandPerformance => "brand_sales",
            Section::Trends => "sales_trend",
            Section::BehavioralInsights => "consumer_insights",
            Section::RegionalSales => "regional_sales",
        }
    }

    /// Snapshot fields this section's query depends on. The cache key is
    /// built from exactly these, so edits to irrelevant filters do not
    /// invalidate the section.
    pub fn fields_used(&self) -> &'static [FilterField] {
        use FilterField::*;
        match self {
            Section::Overview => &[DateRange, Brands, Regions],
            Section::BrandPerformance => &[DateRange, Brands, Regions, Refinements],
            Section::Trends => &[DateRange, Regions],
            Section::BehavioralInsights => &[DateRange, Brands, Regions, MinConfidence, Refinements],
            Section::RegionalSales => &[DateRange, Brands, Regions],
        }
    }

    /// Whether this section's query reads the given field
    pub fn uses(&self, field: FilterField) -> bool {
        self.fields_used().contains(&field)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

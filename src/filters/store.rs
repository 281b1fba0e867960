//! Filter state store
//!
//! The single writer for filter state. Every mutation path replaces the
//! whole snapshot and bumps its revision, then publishes on a watch
//! channel so the debounce coordinator (and anything else subscribed)
//! sees each change exactly once. Store operations are total: invalid
//! combinations such as an inverted date range are accepted here and
//! handled defensively by the query builder.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use tokio::sync::watch;

use super::snapshot::{DateRange, FilterSnapshot, Refinement};

/// Partial update merged over the previous snapshot. `None` fields keep
/// their previous value; `min_confidence` is doubly optional so callers
/// can clear the threshold (`Some(None)`) or leave it alone (`None`).
#[derive(Debug, Clone, Default)]
pub struct FilterUpdate {
    pub date_range: Option<DateRange>,
    pub brands: Option<BTreeSet<String>>,
    pub regions: Option<BTreeSet<String>>,
    pub min_confidence: Option<Option<f64>>,
    pub refinements: Option<Vec<Refinement>>,
}

/// Owns the canonical filter snapshot and publishes every update
pub struct FilterStore {
    tx: watch::Sender<FilterSnapshot>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::with_initial(FilterSnapshot::default())
    }

    pub fn with_initial(initial: FilterSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current snapshot (cheap clone)
    pub fn snapshot(&self) -> FilterSnapshot {
        self.tx.borrow().clone()
    }

    /// Subscribe to snapshot updates. The receiver immediately sees the
    /// current value.
    pub fn subscribe(&self) -> watch::Receiver<FilterSnapshot> {
        self.tx.subscribe()
    }

    /// Replace the snapshot via a pure function of the previous one.
    /// The revision is managed here; whatever the closure sets is
    /// overwritten with `previous + 1`.
    pub fn set_filters_with<F>(&self, f: F)
    where
        F: FnOnce(&FilterSnapshot) -> FilterSnapshot,
    {
        self.tx.send_modify(|current| {
            let mut next = f(current);
            next.revision = current.revision + 1;
            log::debug!("filters updated to revision {}", next.revision);
            *current = next;
        });
    }

    /// Merge a partial update over the previous snapshot
    pub fn set_filters(&self, update: FilterUpdate) {
        self.set_filters_with(|previous| {
            let mut next = previous.clone();
            if let Some(date_range) = update.date_range {
                next.date_range = date_range;
            }
            if let Some(brands) = update.brands {
                next.brands = brands;
            }
            if let Some(regions) = update.regions {
                next.regions = regions;
            }
            if let Some(min_confidence) = update.min_confidence {
                next.min_confidence = min_confidence;
            }
            if let Some(refinements) = update.refinements {
                next.refinements = refinements;
            }
            next
        });
    }

    /// Restore the documented default snapshot
    pub fn reset_filters(&self) {
        self.set_filters_with(|_| FilterSnapshot::default());
        log::info!("filters reset to defaults");
    }

    pub fn set_date_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        self.set_filters_with(|previous| {
            let mut next = previous.clone();
            next.date_range = DateRange::new(start, end);
            next
        });
    }

    /// Apply the trailing N-day preset the filter bar offers ("last 30
    /// days" etc.), anchored at the caller's notion of today
    pub fn set_trailing_days(&self, today: NaiveDate, days: i64) {
        self.set_filters_with(|previous| {
            let mut next = previous.clone();
            next.date_range = DateRange::trailing_days(today, days);
            next
        });
    }

    pub fn set_brands(&self, brands: BTreeSet<String>) {
        self.set_filters(FilterUpdate {
            brands: Some(brands),
            ..Default::default()
        });
    }

    pub fn set_regions(&self, regions: BTreeSet<String>) {
        self.set_filters(FilterUpdate {
            regions: Some(regions),
            ..Default::default()
        });
    }

    pub fn set_min_confidence(&self, threshold: Option<f64>) {
        self.set_filters(FilterUpdate {
            min_confidence: Some(threshold),
            ..Default::default()
        });
    }

    /// Append a section refinement, preserving insertion order
    pub fn push_refinement(&self, refinement: Refinement) {
        self.set_filters_with(|previous| {
            let mut next = previous.clone();
            next.refinements.push(refinement.clone());
            next
        });
    }

    /// Add the brand if absent, remove it if present
    pub fn toggle_brand(&self, brand: &str) {
        self.set_filters_with(|previous| {
            let mut next = previous.clone();
            if !next.brands.remove(brand) {
                next.brands.insert(brand.to_string());
            }
            next
        });
    }

    /// Add the region if absent, remove it if present
    pub fn toggle_region(&self, region: &str) {
        self.set_filters_with(|previous| {
            let mut next = previous.clone();
            if !next.regions.remove(region) {
                next.regions.insert(region.to_string());
            }
            next
        });
    }
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new()
    }
}

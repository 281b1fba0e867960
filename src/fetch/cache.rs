//! Fetch result cache
//!
//! Entries are keyed by (section, projected snapshot): only the filter
//! fields a section actually uses go into its key, so edits to
//! irrelevant filters neither miss nor invalidate. Freshness is
//! time-based; error entries are kept for display but never count as
//! fresh, so the next snapshot or refetch goes back to the backend.

use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use crate::backend::RowRecord;
use crate::filters::snapshot::FilterSnapshot;
use crate::sections::{FilterField, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    Success,
    Error,
}

/// One cached fetch result
#[derive(Debug, Clone)]
pub struct FetchCacheEntry {
    pub status: FetchStatus,
    pub rows: Option<Vec<RowRecord>>,
    pub error: Option<String>,
    pub fetched_at: Instant,
}

impl FetchCacheEntry {
    fn pending() -> Self {
        Self {
            status: FetchStatus::Pending,
            rows: None,
            error: None,
            fetched_at: Instant::now(),
        }
    }

    /// Fresh means a successful result younger than the freshness window
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.status == FetchStatus::Success && self.fetched_at.elapsed() < ttl
    }
}

/// Stable cache key for a (section, snapshot) pair. The section key is a
/// literal prefix, followed by the snapshot projected onto the section's
/// `fields_used`; sets are BTreeSets and the map is serialized in sorted
/// key order, so equal projections always serialize identically.
pub fn cache_key(section: Section, snapshot: &FilterSnapshot) -> String {
    let mut projected = serde_json::Map::new();
    for field in section.fields_used() {
        match field {
            FilterField::DateRange => {
                let value = serde_json::to_value(&snapshot.date_range).unwrap_or(Value::Null);
                projected.insert("date_range".to_string(), value);
            }
            FilterField::Brands => {
                let value = serde_json::to_value(&snapshot.brands).unwrap_or(Value::Null);
                projected.insert("brands".to_string(), value);
            }
            FilterField::Regions => {
                let value = serde_json::to_value(&snapshot.regions).unwrap_or(Value::Null);
                projected.insert("regions".to_string(), value);
            }
            FilterField::MinConfidence => {
                let value = serde_json::to_value(snapshot.min_confidence).unwrap_or(Value::Null);
                projected.insert("min_confidence".to_string(), value);
            }
            FilterField::Refinements => {
                let value = serde_json::to_value(&snapshot.refinements).unwrap_or(Value::Null);
                projected.insert("refinements".to_string(), value);
            }
        }
    }
    format!("{}|{}", section.key(), Value::Object(projected))
}

/// Owns all cache entries. Only the fetch coordinator writes here.
pub struct FetchCache {
    entries: DashMap<String, FetchCacheEntry>,
    ttl: Duration,
}

impl FetchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<FetchCacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Entry for the key, only if it is still fresh
    pub fn fresh(&self, key: &str) -> Option<FetchCacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.clone())
    }

    pub fn insert_pending(&self, key: &str) {
        self.entries.insert(key.to_string(), FetchCacheEntry::pending());
    }

    pub fn complete(&self, key: &str, rows: Vec<RowRecord>) {
        self.entries.insert(
            key.to_string(),
            FetchCacheEntry {
                status: FetchStatus::Success,
                rows: Some(rows),
                error: None,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn fail(&self, key: &str, error: String) {
        self.entries.insert(
            key.to_string(),
            FetchCacheEntry {
                status: FetchStatus::Error,
                rows: None,
                error: Some(error),
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove a pending marker. A superseded request never completes its
    /// entry, and a stale Pending would wrongly dedup the next identical
    /// request.
    pub fn clear_pending(&self, key: &str) {
        self.entries
            .remove_if(key, |_, entry| entry.status == FetchStatus::Pending);
    }

    /// Drop every entry belonging to a section (explicit invalidation on
    /// manual refetch). Matches on the key prefix, which user-supplied
    /// filter values can never reach.
    pub fn invalidate_section(&self, section: Section) {
        let prefix = format!("{}|", section.key());
        self.entries.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn snapshot_with_brand(brand: &str) -> FilterSnapshot {
        let mut snapshot = FilterSnapshot::default();
        snapshot.brands = BTreeSet::from([brand.to_string()]);
        snapshot
    }

    #[test]
    fn key_ignores_fields_the_section_does_not_use() {
        // Trends reads only date range and regions
        let mut a = FilterSnapshot::default();
        let mut b = FilterSnapshot::default();
        b.min_confidence = Some(0.9);
        b.brands.insert("Oishi".to_string());
        b.revision = 42;

        assert_eq!(cache_key(Section::Trends, &a), cache_key(Section::Trends, &b));

        a.regions.insert("NCR".to_string());
        assert_ne!(cache_key(Section::Trends, &a), cache_key(Section::Trends, &b));
    }

    #[test]
    fn key_distinguishes_sections_and_used_fields() {
        let snapshot = snapshot_with_brand("Oishi");
        let overview = cache_key(Section::Overview, &snapshot);
        let brands = cache_key(Section::BrandPerformance, &snapshot);
        assert_ne!(overview, brands);

        let other = snapshot_with_brand("Alaska");
        assert_ne!(overview, cache_key(Section::Overview, &other));
    }

    #[test]
    fn key_is_stable_across_calls() {
        let snapshot = snapshot_with_brand("Oishi");
        assert_eq!(
            cache_key(Section::Overview, &snapshot),
            cache_key(Section::Overview, &snapshot)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn entries_age_out_of_freshness() {
        let cache = FetchCache::new(Duration::from_secs(300));
        cache.complete("k", Vec::new());

        // Scenario from the design review: a 2 minute old entry inside a
        // 5 minute window is still fresh
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(cache.fresh("k").is_some());

        tokio::time::advance(Duration::from_secs(240)).await;
        assert!(cache.fresh("k").is_none());
        assert!(cache.get("k").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn error_entries_are_never_fresh() {
        let cache = FetchCache::new(Duration::from_secs(300));
        cache.fail("k", "network error".to_string());
        assert!(cache.fresh("k").is_none());
        let entry = cache.get("k").expect("entry retained");
        assert_eq!(entry.status, FetchStatus::Error);
        assert_eq!(entry.error.as_deref(), Some("network error"));
    }

    #[test]
    fn section_invalidation_only_touches_that_section() {
        let cache = FetchCache::new(Duration::from_secs(300));
        let snapshot = FilterSnapshot::default();
        let overview_key = cache_key(Section::Overview, &snapshot);
        let trends_key = cache_key(Section::Trends, &snapshot);
        cache.complete(&overview_key, Vec::new());
        cache.complete(&trends_key, Vec::new());

        cache.invalidate_section(Section::Overview);
        assert!(cache.get(&overview_key).is_none());
        assert!(cache.get(&trends_key).is_some());
    }

    #[test]
    fn hostile_values_cannot_widen_section_invalidation() {
        let cache = FetchCache::new(Duration::from_secs(300));
        let mut snapshot = FilterSnapshot::default();
        // A region value imitating another section's key material
        snapshot
            .regions
            .insert(r#"x","section":"overview"#.to_string());
        let trends_key = cache_key(Section::Trends, &snapshot);
        let overview_key = cache_key(Section::Overview, &snapshot);
        cache.complete(&trends_key, Vec::new());
        cache.complete(&overview_key, Vec::new());

        cache.invalidate_section(Section::Overview);
        assert!(cache.get(&trends_key).is_some());
        assert!(cache.get(&overview_key).is_none());
    }
}

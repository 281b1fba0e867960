//! Fetch coordinator
//!
//! Drives every dashboard section from the debounced filter snapshot.
//! Guarantees per (section, projected snapshot): at most one in-flight
//! request, fresh cache hits short-circuit the backend, and a late
//! result from a superseded request never overwrites newer state.
//! Failures stay on the owning section; siblings keep rendering.

use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{QueryBackend, RowRecord};
use crate::config::DashboardConfig;
use crate::filters::snapshot::FilterSnapshot;
use crate::query::builder::PredicateCache;
use crate::sections::Section;

use super::cache::{cache_key, FetchCache, FetchStatus};
use super::error::FetchError;
use super::retry;

/// Read-only per-section surface consumed by UI components
#[derive(Debug, Clone, Default)]
pub struct SectionView {
    /// Last successful payload. Kept on error so the section can show
    /// stale data next to the error message.
    pub rows: Arc<Vec<RowRecord>>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct SectionState {
    view: SectionView,
    /// Issue-ordered request counter. A result only lands if its
    /// generation still matches; anything older was superseded.
    generation: u64,
}

/// Orchestrates all section fetches against one backend
pub struct FetchCoordinator {
    backend: Arc<dyn QueryBackend>,
    cache: FetchCache,
    config: DashboardConfig,
    sections: DashMap<Section, SectionState>,
    predicates: PredicateCache,
    last_snapshot: RwLock<FilterSnapshot>,
}

impl FetchCoordinator {
    pub fn new(backend: Arc<dyn QueryBackend>, config: DashboardConfig) -> Self {
        let sections = DashMap::new();
        for section in Section::ALL {
            sections.insert(section, SectionState::default());
        }
        Self {
            backend,
            cache: FetchCache::new(config.cache_ttl()),
            config,
            sections,
            predicates: PredicateCache::new(),
            last_snapshot: RwLock::new(FilterSnapshot::default()),
        }
    }

    /// Current view for a section (cheap clone)
    pub fn view(&self, section: Section) -> SectionView {
        self.sections
            .get(&section)
            .map(|state| state.view.clone())
            .unwrap_or_default()
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    fn current_snapshot(&self) -> FilterSnapshot {
        self.last_snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Bump the section's generation and mark it loading. Returns the
    /// generation the caller's request must match to land its result.
    fn begin_request(&self, section: Section, key: &str) -> u64 {
        let mut state = self.sections.entry(section).or_default();
        state.generation += 1;
        state.view.loading = true;
        self.cache.insert_pending(key);
        state.generation
    }

    fn apply_result(
        &self,
        section: Section,
        key: &str,
        generation: u64,
        result: Result<Vec<RowRecord>, FetchError>,
    ) -> Result<(), FetchError> {
        let mut state = self.sections.entry(section).or_default();
        if state.generation != generation {
            log::debug!("{section}: discarding superseded result (gen {generation})");
            self.cache.clear_pending(key);
            return Err(FetchError::Cancelled);
        }

        match result {
            Ok(rows) => {
                self.cache.complete(key, rows.clone());
                state.view = SectionView {
                    rows: Arc::new(rows),
                    loading: false,
                    error: None,
                };
                log::debug!("{section}: fetch complete");
                Ok(())
            }
            Err(e) => {
                self.cache.fail(key, e.to_string());
                state.view.loading = false;
                state.view.error = Some(e.to_string());
                log::error!("{section}: fetch failed: {e}");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        section: Section,
        key: String,
        snapshot: FilterSnapshot,
        generation: u64,
    ) -> Result<(), FetchError> {
        let predicate = self.predicates.get(section, &snapshot);
        log::debug!(
            "{section}: fetching from {} (revision {})",
            self.backend.name(),
            snapshot.revision
        );
        let result = self.backend.fetch_rows(section.table(), &predicate).await;
        self.apply_result(section, &key, generation, result)
    }

    /// React to a settled snapshot: serve each section from fresh cache
    /// where possible, otherwise issue one fetch per section. Fetches run
    /// concurrently; failures land on their own section only.
    pub fn apply_snapshot(self: &Arc<Self>, snapshot: &FilterSnapshot) {
        {
            let mut last = self
                .last_snapshot
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *last = snapshot.clone();
        }

        for section in Section::ALL {
            let key = cache_key(section, snapshot);

            if let Some(entry) = self.cache.fresh(&key) {
                // Serve from cache; still supersede any older request so
                // its late result cannot overwrite this newer state
                let mut state = self.sections.entry(section).or_default();
                state.generation += 1;
                state.view = SectionView {
                    rows: Arc::new(entry.rows.unwrap_or_default()),
                    loading: false,
                    error: None,
                };
                log::debug!("{section}: cache hit");
                continue;
            }

            if matches!(
                self.cache.get(&key).map(|entry| entry.status),
                Some(FetchStatus::Pending)
            ) {
                // Identical request already in flight
                log::debug!("{section}: fetch already pending");
                continue;
            }

            // Generations are assigned here, synchronously, so results
            // land in the order requests were issued
            let generation = self.begin_request(section, &key);
            let this = Arc::clone(self);
            let task_snapshot = snapshot.clone();
            tokio::spawn(async move {
                // Outcome already recorded on the section view
                let _ = this.execute(section, key, task_snapshot, generation).await;
            });
        }
    }

    /// Manual retry for one section. Bypasses freshness, invalidates the
    /// section's cache entries and retries transient failures up to the
    /// configured cap. Filter-driven fetches never come through here.
    pub async fn refetch(&self, section: Section) -> Result<(), FetchError> {
        let snapshot = self.current_snapshot();
        self.cache.invalidate_section(section);
        log::info!("{section}: manual refetch requested");

        retry::with_attempts(self.config.max_retry_attempts, || {
            let key = cache_key(section, &snapshot);
            let generation = self.begin_request(section, &key);
            self.execute(section, key, snapshot.clone(), generation)
        })
        .await
    }

    /// Drive the coordinator from a stream of settled snapshots until
    /// cancelled. Applies the current value immediately so the dashboard
    /// populates on startup.
    pub fn spawn_driver(
        self: &Arc<Self>,
        mut settled: watch::Receiver<FilterSnapshot>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let initial = settled.borrow_and_update().clone();
            this.apply_snapshot(&initial);

            loop {
                // Biased so a cancellation that raced a final snapshot
                // wins; otherwise the select could still start one more
                // round of fetches
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = settled.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = settled.borrow_and_update().clone();
                        this.apply_snapshot(&snapshot);
                    }
                }
            }
            log::info!("fetch driver stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::{QueryParam, QueryPredicate};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Test backend: echoes the bound text params back as a row, with a
    /// per-call delay derived from the params ("slow" brands are slow)
    /// and a configurable set of failing tables.
    struct StubBackend {
        calls: AtomicUsize,
        failing_tables: Mutex<HashSet<&'static str>>,
        fail_next: AtomicUsize,
    }

    impl StubBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing_tables: Mutex::new(HashSet::new()),
                fail_next: AtomicUsize::new(0),
            }
        }

        fn fail_table(&self, table: &'static str) {
            self.failing_tables.lock().unwrap().insert(table);
        }

        fn fail_next_calls(&self, n: usize) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch_rows(
            &self,
            table: &str,
            predicate: &QueryPredicate,
        ) -> Result<Vec<RowRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let texts: Vec<&str> = predicate
                .params()
                .iter()
                .filter_map(|p| match p {
                    QueryParam::Text(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect();

            let delay = if texts.iter().any(|t| t.contains("slow")) {
                Duration::from_millis(500)
            } else {
                Duration::from_millis(5)
            };
            tokio::time::sleep(delay).await;

            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(FetchError::Backend("transient failure".to_string()));
            }
            if self.failing_tables.lock().unwrap().contains(table) {
                return Err(FetchError::Backend("network error".to_string()));
            }

            let mut row = RowRecord::new();
            row.insert("table".to_string(), json!(table));
            row.insert("brands".to_string(), json!(texts));
            Ok(vec![row])
        }
    }

    fn coordinator_with(backend: Arc<StubBackend>) -> Arc<FetchCoordinator> {
        Arc::new(FetchCoordinator::new(backend, DashboardConfig::default()))
    }

    fn snapshot_with_brand(brand: &str, revision: u64) -> FilterSnapshot {
        let mut snapshot = FilterSnapshot::default();
        snapshot.brands.insert(brand.to_string());
        snapshot.revision = revision;
        snapshot
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn sections_populate_from_a_snapshot() {
        let backend = Arc::new(StubBackend::new());
        let coordinator = coordinator_with(backend.clone());

        coordinator.apply_snapshot(&snapshot_with_brand("Oishi", 1));
        settle().await;

        for section in Section::ALL {
            let view = coordinator.view(section);
            assert!(!view.loading, "{section}");
            assert!(view.error.is_none(), "{section}");
            assert_eq!(view.rows[0]["table"], section.table(), "{section}");
        }
        assert_eq!(backend.calls(), Section::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_hits_skip_the_backend() {
        let backend = Arc::new(StubBackend::new());
        let coordinator = coordinator_with(backend.clone());
        let snapshot = snapshot_with_brand("Oishi", 1);

        coordinator.apply_snapshot(&snapshot);
        settle().await;
        let first_round = backend.calls();

        // Same filters, two minutes later: everything is still fresh
        tokio::time::advance(Duration::from_secs(120)).await;
        let mut again = snapshot.clone();
        again.revision = 2;
        coordinator.apply_snapshot(&again);
        settle().await;

        assert_eq!(backend.calls(), first_round);
        assert!(coordinator.view(Section::Overview).error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_trigger_a_new_fetch() {
        let backend = Arc::new(StubBackend::new());
        let coordinator = coordinator_with(backend.clone());
        let snapshot = snapshot_with_brand("Oishi", 1);

        coordinator.apply_snapshot(&snapshot);
        settle().await;
        let first_round = backend.calls();

        tokio::time::advance(Duration::from_secs(600)).await;
        let mut again = snapshot.clone();
        again.revision = 2;
        coordinator.apply_snapshot(&again);
        settle().await;

        assert_eq!(backend.calls(), first_round * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_superseded_result_never_overwrites_the_newer_one() {
        let backend = Arc::new(StubBackend::new());
        let coordinator = coordinator_with(backend.clone());

        // Request A is slow; request B supersedes it and lands first
        coordinator.apply_snapshot(&snapshot_with_brand("slow-brand", 1));
        tokio::time::sleep(Duration::from_millis(1)).await;
        coordinator.apply_snapshot(&snapshot_with_brand("Oishi", 2));
        settle().await;

        let view = coordinator.view(Section::BrandPerformance);
        assert!(!view.loading);
        assert_eq!(view.rows[0]["brands"], json!(["Oishi"]));
    }

    #[tokio::test(start_paused = true)]
    async fn sections_are_not_filtered_by_fields_they_ignore() {
        let backend = Arc::new(StubBackend::new());
        let coordinator = coordinator_with(backend.clone());

        // Trends ignores the brand filter; its query must not carry it
        coordinator.apply_snapshot(&snapshot_with_brand("Oishi", 1));
        settle().await;
        assert_eq!(coordinator.view(Section::Trends).rows[0]["brands"], json!([]));
        assert_eq!(
            coordinator.view(Section::BrandPerformance).rows[0]["brands"],
            json!(["Oishi"])
        );

        // Clearing the brand leaves Trends' projected key unchanged, and
        // the cache hit it gets was never brand-filtered to begin with
        let mut cleared = FilterSnapshot::default();
        cleared.revision = 2;
        coordinator.apply_snapshot(&cleared);
        settle().await;
        assert_eq!(coordinator.view(Section::Trends).rows[0]["brands"], json!([]));
        assert_eq!(
            coordinator.view(Section::BrandPerformance).rows[0]["brands"],
            json!([])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_stay_on_the_owning_section() {
        let backend = Arc::new(StubBackend::new());
        backend.fail_table("brand_sales");
        let coordinator = coordinator_with(backend.clone());

        coordinator.apply_snapshot(&snapshot_with_brand("Oishi", 1));
        settle().await;

        let failed = coordinator.view(Section::BrandPerformance);
        assert!(!failed.loading);
        assert!(failed.error.as_deref().unwrap().contains("network error"));

        let sibling = coordinator.view(Section::Trends);
        assert!(!sibling.loading);
        assert!(sibling.error.is_none());
        assert_eq!(sibling.rows.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_driven_fetches_do_not_retry() {
        let backend = Arc::new(StubBackend::new());
        backend.fail_table("sales_trend");
        let coordinator = coordinator_with(backend.clone());

        coordinator.apply_snapshot(&snapshot_with_brand("Oishi", 1));
        settle().await;

        // One attempt per section, no retry storm
        assert_eq!(backend.calls(), Section::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refetch_retries_transient_failures() {
        let backend = Arc::new(StubBackend::new());
        let coordinator = coordinator_with(backend.clone());

        coordinator.apply_snapshot(&FilterSnapshot::default());
        settle().await;
        let baseline = backend.calls();

        backend.fail_next_calls(2);
        let result = coordinator.refetch(Section::Overview).await;
        assert!(result.is_ok());
        // Two failed attempts plus the successful third
        assert_eq!(backend.calls(), baseline + 3);
        assert!(coordinator.view(Section::Overview).error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refetch_gives_up_after_the_cap() {
        let backend = Arc::new(StubBackend::new());
        backend.fail_table("transactions_summary");
        let coordinator = coordinator_with(backend.clone());

        coordinator.apply_snapshot(&FilterSnapshot::default());
        settle().await;
        let baseline = backend.calls();

        let result = coordinator.refetch(Section::Overview).await;
        assert!(matches!(result, Err(FetchError::Backend(_))));
        assert_eq!(backend.calls(), baseline + 3);

        let view = coordinator.view(Section::Overview);
        assert!(view.error.is_some());
        assert!(!view.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_follows_the_settled_stream_until_cancelled() {
        let backend = Arc::new(StubBackend::new());
        let coordinator = coordinator_with(backend.clone());
        let (tx, rx) = watch::channel(FilterSnapshot::default());
        let cancel = CancellationToken::new();

        let handle = coordinator.spawn_driver(rx, cancel.clone());
        settle().await;
        let initial_calls = backend.calls();
        assert_eq!(initial_calls, Section::ALL.len());

        tx.send_replace(snapshot_with_brand("Oishi", 1));
        settle().await;
        assert!(backend.calls() > initial_calls);

        cancel.cancel();
        let after_cancel = backend.calls();
        tx.send_replace(snapshot_with_brand("Alaska", 2));
        settle().await;
        assert_eq!(backend.calls(), after_cancel);
        assert!(handle.is_finished());
    }
}

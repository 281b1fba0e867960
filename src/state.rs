// Dashboard state - wires the filter store, debounce coordinator, fetch
// coordinator and section boundaries into one owned container

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backend::QueryBackend;
use crate::boundary::SectionBoundary;
use crate::config::DashboardConfig;
use crate::fetch::coordinator::{FetchCoordinator, SectionView};
use crate::fetch::error::FetchError;
use crate::filters::debounce::DebounceCoordinator;
use crate::filters::store::FilterStore;
use crate::sections::Section;

/// Owns the whole coordination core. UI components reach filters through
/// `filters()` and section data through `view`/`refetch`; nothing else
/// mutates shared state.
pub struct DashboardState {
    filters: Arc<FilterStore>,
    debounce: DebounceCoordinator,
    coordinator: Arc<FetchCoordinator>,
    boundary: SectionBoundary,
    cancel: CancellationToken,
}

impl DashboardState {
    /// Build and start the core. Must be called within a tokio runtime;
    /// the debounce and fetch-driver tasks spawn here. The dashboard
    /// populates immediately with the default (unfiltered) snapshot.
    pub fn new(backend: Arc<dyn QueryBackend>, config: DashboardConfig) -> Self {
        log::info!(
            "starting dashboard core (backend: {}, debounce: {}ms, cache ttl: {}ms)",
            backend.name(),
            config.debounce_ms,
            config.cache_ttl_ms
        );

        let filters = Arc::new(FilterStore::new());
        let debounce = DebounceCoordinator::spawn(filters.subscribe(), config.debounce());
        let coordinator = Arc::new(FetchCoordinator::new(backend, config));
        let cancel = CancellationToken::new();
        coordinator.spawn_driver(debounce.subscribe(), cancel.clone());

        Self {
            filters,
            debounce,
            coordinator,
            boundary: SectionBoundary::new(),
            cancel,
        }
    }

    /// Shared filter surface: `snapshot`, `set_filters`, `reset_filters`
    /// and the narrow setters
    pub fn filters(&self) -> &FilterStore {
        &self.filters
    }

    /// Whether filter edits are still settling (for UI feedback)
    pub fn is_debouncing(&self) -> bool {
        self.debounce.is_debouncing()
    }

    /// Read-only view for one section
    pub fn view(&self, section: Section) -> SectionView {
        self.coordinator.view(section)
    }

    /// Manual retry for one section's data
    pub async fn refetch(&self, section: Section) -> Result<(), FetchError> {
        self.coordinator.refetch(section).await
    }

    /// Render-failure isolation per section
    pub fn boundary(&self) -> &SectionBoundary {
        &self.boundary
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    /// Stop the background tasks. Pending debounce timers are dropped
    /// without emitting; in-flight results are ignored.
    pub fn shutdown(&self) {
        log::info!("shutting down dashboard core");
        self.cancel.cancel();
        self.debounce.shutdown();
    }
}

impl Drop for DashboardState {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

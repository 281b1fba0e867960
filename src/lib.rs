// Dashboard core - the filter and query-coordination layer of the
// retail analytics dashboard
//
// What lives here:
// - Filter state (snapshots, the store, the debounce coordinator)
// - Query building (filter snapshot -> parametrized predicate)
// - Fetch orchestration (per-section caching, cancellation, retry)
// - Per-section error isolation
//
// Rendering, routing, auth and the data store itself are collaborators;
// the backend is reached only through the QueryBackend trait.

pub mod backend;
pub mod boundary;
pub mod config;
pub mod fetch;
pub mod filters;
pub mod query;
pub mod sections;
pub mod state;

pub use backend::{HttpBackend, QueryBackend, RowRecord, SqliteBackend};
pub use boundary::{RenderOutcome, SectionBoundary};
pub use config::DashboardConfig;
pub use fetch::{FetchCache, FetchCacheEntry, FetchCoordinator, FetchError, FetchStatus, SectionView};
pub use filters::{
    DateRange, DebounceCoordinator, DebouncePhase, FilterSnapshot, FilterStore, FilterUpdate,
    Refinement,
};
pub use query::{build_predicate, PredicateCache, QueryParam, QueryPredicate};
pub use sections::{FilterField, Section};
pub use state::DashboardState;

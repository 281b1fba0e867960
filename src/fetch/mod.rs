// Fetch orchestration - per-section data loading with caching, logical
// cancellation and capped manual retry

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod retry;

pub use cache::{cache_key, FetchCache, FetchCacheEntry, FetchStatus};
pub use coordinator::{FetchCoordinator, SectionView};
pub use error::FetchError;

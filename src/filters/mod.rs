// Filter state - canonical snapshots, the store that owns them, and the
// debounce coordinator that settles rapid edits before queries fire

pub mod debounce;
pub mod snapshot;
pub mod store;

pub use debounce::{DebounceCoordinator, DebouncePhase};
pub use snapshot::{DateRange, FilterSnapshot, Refinement};
pub use store::{FilterStore, FilterUpdate};

// Query fragment building - turns a filter snapshot into a parametrized
// predicate the backend can execute safely

pub mod builder;
pub mod predicate;

pub use builder::{build_predicate, is_identifier, PredicateCache};
pub use predicate::{QueryParam, QueryPredicate};

//! Local order store abstraction.
//!
//! The schema and queries live with the persistence layer; the pipeline only
//! sees the `Repository` trait and the record types defined here.

mod traits;
mod types;

pub use traits::{AliasLookup, Repository, RepositoryError};
pub use types::{AliasDefinition, LocalOrderRecord, OrderState, ProductType, StateKind};

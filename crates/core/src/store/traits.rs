//! Storage traits for the local order store.

use std::collections::HashMap;

use thiserror::Error;

use super::types::{AliasDefinition, LocalOrderRecord, OrderState};

/// Error type for repository operations.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// Order not found.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// The repository was closed.
    #[error("Repository is closed")]
    Closed,
}

/// Read access to the alias catalog.
pub trait AliasLookup: Send + Sync {
    /// Looks up an alias definition by SKU alias string.
    fn load_alias(&self, alias: &str) -> Result<Option<AliasDefinition>, RepositoryError>;
}

impl AliasLookup for HashMap<String, AliasDefinition> {
    fn load_alias(&self, alias: &str) -> Result<Option<AliasDefinition>, RepositoryError> {
        Ok(self.get(alias).cloned())
    }
}

/// Local order store used by the transform engine.
pub trait Repository: AliasLookup {
    /// Creates the record if it is new, otherwise returns the stored one
    /// unchanged (state, group and folder are preserved).
    fn create_order(&self, record: LocalOrderRecord) -> Result<LocalOrderRecord, RepositoryError>;

    /// Loads a record by local id.
    fn load_order(&self, id: &str) -> Result<Option<LocalOrderRecord>, RepositoryError>;

    /// Saves the mutable fields of a record (has-cover flag, sheet count).
    fn save_order(&self, record: &LocalOrderRecord) -> Result<(), RepositoryError>;

    /// Sets a record's state and stamps its state-change time.
    fn set_order_state(&self, id: &str, state: OrderState) -> Result<(), RepositoryError>;

    /// Appends an entry to the order's state history.
    fn log_state(&self, id: &str, state: OrderState, message: &str)
        -> Result<(), RepositoryError>;

    /// Detaches every member of a group and forgets the group's state.
    fn clear_group(&self, group_id: i64) -> Result<(), RepositoryError>;

    /// Sets the shared state of a production group.
    fn set_group_state(&self, group_id: i64, state: OrderState) -> Result<(), RepositoryError>;

    /// Reads the shared state of a production group.
    fn get_group_state(&self, group_id: i64) -> Result<Option<OrderState>, RepositoryError>;

    /// Attaches a key/value note to the order.
    fn add_extra_info(
        &self,
        id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), RepositoryError>;

    /// Loads up to `limit` records whose own state is `state`, oldest first.
    fn load_base_order_by_state(
        &self,
        state: OrderState,
        limit: usize,
    ) -> Result<Vec<LocalOrderRecord>, RepositoryError>;

    /// Loads up to `limit` group base records (lowest id of each group) whose
    /// group state is `state`.
    fn load_base_order_by_child_state(
        &self,
        state: OrderState,
        limit: usize,
    ) -> Result<Vec<LocalOrderRecord>, RepositoryError>;

    /// Loads the stored records for the given local ids; unknown ids are
    /// left out.
    fn fill_orders(&self, ids: &[String]) -> Result<Vec<LocalOrderRecord>, RepositoryError>;

    /// Releases the underlying connection; later calls fail with `Closed`.
    fn close(&self) -> Result<(), RepositoryError>;
}

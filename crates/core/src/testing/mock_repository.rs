//! In-memory order repository for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::store::{
    AliasDefinition, AliasLookup, LocalOrderRecord, OrderState, Repository, RepositoryError,
};

/// A recorded `log_state` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLogEntry {
    pub order_id: String,
    pub state: OrderState,
    pub message: String,
}

#[derive(Debug, Default)]
struct Store {
    orders: BTreeMap<String, LocalOrderRecord>,
    aliases: HashMap<String, AliasDefinition>,
    groups: HashMap<i64, OrderState>,
    extra_info: HashMap<String, BTreeMap<String, serde_json::Value>>,
    history: Vec<(String, OrderState)>,
    logs: Vec<StateLogEntry>,
    fail_writes: bool,
    closed: bool,
}

/// Mock implementation of the Repository trait.
///
/// Keeps everything in memory:
/// - Records every state change so tests can assert the transition path
/// - Records `log_state` entries and extra info
/// - Can be switched to fail every write
#[derive(Debug, Default)]
pub struct MockRepository {
    store: Mutex<Store>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writable(&self) -> Result<MutexGuard<'_, Store>, RepositoryError> {
        let store = self.store();
        if store.closed {
            return Err(RepositoryError::Closed);
        }
        if store.fail_writes {
            return Err(RepositoryError::Database("writes disabled".to_string()));
        }
        Ok(store)
    }

    /// Adds an alias to the catalog.
    pub fn add_alias(&self, alias: AliasDefinition) {
        self.store().aliases.insert(alias.alias.clone(), alias);
    }

    /// Stores a record as-is, replacing any existing one.
    pub fn insert_order(&self, record: LocalOrderRecord) {
        self.store().orders.insert(record.id.clone(), record);
    }

    /// Makes every following write fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.store().fail_writes = fail;
    }

    pub fn order(&self, id: &str) -> Option<LocalOrderRecord> {
        self.store().orders.get(id).cloned()
    }

    /// States set on `id`, in order.
    pub fn state_history(&self, id: &str) -> Vec<OrderState> {
        self.store()
            .history
            .iter()
            .filter(|(order_id, _)| order_id == id)
            .map(|(_, state)| *state)
            .collect()
    }

    pub fn logs(&self) -> Vec<StateLogEntry> {
        self.store().logs.clone()
    }

    pub fn extra_info(&self, id: &str, key: &str) -> Option<serde_json::Value> {
        self.store()
            .extra_info
            .get(id)
            .and_then(|info| info.get(key))
            .cloned()
    }

    pub fn group_state(&self, group_id: i64) -> Option<OrderState> {
        self.store().groups.get(&group_id).copied()
    }

    pub fn is_closed(&self) -> bool {
        self.store().closed
    }
}

impl AliasLookup for MockRepository {
    fn load_alias(&self, alias: &str) -> Result<Option<AliasDefinition>, RepositoryError> {
        let store = self.store();
        if store.closed {
            return Err(RepositoryError::Closed);
        }
        Ok(store.aliases.get(alias).cloned())
    }
}

impl Repository for MockRepository {
    fn create_order(&self, record: LocalOrderRecord) -> Result<LocalOrderRecord, RepositoryError> {
        let mut store = self.writable()?;
        Ok(store
            .orders
            .entry(record.id.clone())
            .or_insert(record)
            .clone())
    }

    fn load_order(&self, id: &str) -> Result<Option<LocalOrderRecord>, RepositoryError> {
        let store = self.store();
        if store.closed {
            return Err(RepositoryError::Closed);
        }
        Ok(store.orders.get(id).cloned())
    }

    fn save_order(&self, record: &LocalOrderRecord) -> Result<(), RepositoryError> {
        let mut store = self.writable()?;
        let stored = store
            .orders
            .get_mut(&record.id)
            .ok_or_else(|| RepositoryError::NotFound(record.id.clone()))?;
        stored.has_cover = record.has_cover;
        stored.sheet_count = record.sheet_count;
        stored.updated_at = Utc::now();
        Ok(())
    }

    fn set_order_state(&self, id: &str, state: OrderState) -> Result<(), RepositoryError> {
        let mut store = self.writable()?;
        let now = Utc::now();
        let stored = store
            .orders
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        stored.state = state;
        stored.state_changed_at = now;
        stored.updated_at = now;
        store.history.push((id.to_string(), state));
        Ok(())
    }

    fn log_state(&self, id: &str, state: OrderState, message: &str) -> Result<(), RepositoryError> {
        let mut store = self.writable()?;
        store.logs.push(StateLogEntry {
            order_id: id.to_string(),
            state,
            message: message.to_string(),
        });
        Ok(())
    }

    fn clear_group(&self, group_id: i64) -> Result<(), RepositoryError> {
        let mut store = self.writable()?;
        for record in store.orders.values_mut() {
            if record.group_id == group_id {
                record.group_id = 0;
            }
        }
        store.groups.remove(&group_id);
        Ok(())
    }

    fn set_group_state(&self, group_id: i64, state: OrderState) -> Result<(), RepositoryError> {
        let mut store = self.writable()?;
        store.groups.insert(group_id, state);
        Ok(())
    }

    fn get_group_state(&self, group_id: i64) -> Result<Option<OrderState>, RepositoryError> {
        Ok(self.store().groups.get(&group_id).copied())
    }

    fn add_extra_info(
        &self,
        id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut store = self.writable()?;
        store
            .extra_info
            .entry(id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn load_base_order_by_state(
        &self,
        state: OrderState,
        limit: usize,
    ) -> Result<Vec<LocalOrderRecord>, RepositoryError> {
        let store = self.store();
        let mut records: Vec<LocalOrderRecord> = store
            .orders
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.state_changed_at.cmp(&b.state_changed_at));
        records.truncate(limit);
        Ok(records)
    }

    fn load_base_order_by_child_state(
        &self,
        state: OrderState,
        limit: usize,
    ) -> Result<Vec<LocalOrderRecord>, RepositoryError> {
        let store = self.store();
        let mut groups: Vec<i64> = store
            .groups
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(group, _)| *group)
            .collect();
        groups.sort_unstable();

        // Orders are keyed by id, so the first member found is the base.
        let records = groups
            .into_iter()
            .filter_map(|group| store.orders.values().find(|r| r.group_id == group).cloned())
            .take(limit)
            .collect();
        Ok(records)
    }

    fn fill_orders(&self, ids: &[String]) -> Result<Vec<LocalOrderRecord>, RepositoryError> {
        let store = self.store();
        Ok(ids
            .iter()
            .filter_map(|id| store.orders.get(id).cloned())
            .collect())
    }

    fn close(&self) -> Result<(), RepositoryError> {
        self.store().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_order_preserves_existing_record() {
        let repo = MockRepository::new();
        let mut record = LocalOrderRecord::new(1, "42", "");
        record.state = OrderState::Cancelled;
        repo.insert_order(record);

        let stored = repo.create_order(LocalOrderRecord::new(1, "42", "")).unwrap();
        assert_eq!(stored.state, OrderState::Cancelled);
    }

    #[test]
    fn test_state_history_and_lookup() {
        let repo = MockRepository::new();
        repo.create_order(LocalOrderRecord::new(1, "42", "")).unwrap();
        repo.set_order_state("1_42", OrderState::LoadStarted).unwrap();
        repo.set_order_state("1_42", OrderState::TransformWait).unwrap();

        assert_eq!(
            repo.state_history("1_42"),
            vec![OrderState::LoadStarted, OrderState::TransformWait]
        );
        let waiting = repo
            .load_base_order_by_state(OrderState::TransformWait, 10)
            .unwrap();
        assert_eq!(waiting.len(), 1);
        assert!(repo.set_order_state("1_99", OrderState::Ready).is_err());
    }

    #[test]
    fn test_groups() {
        let repo = MockRepository::new();
        for (vendor_id, group) in [("2", 7), ("1", 7), ("3", 0)] {
            let mut record = LocalOrderRecord::new(1, vendor_id, "");
            record.group_id = group;
            repo.insert_order(record);
        }
        repo.set_group_state(7, OrderState::FinalizeWait).unwrap();

        let bases = repo
            .load_base_order_by_child_state(OrderState::FinalizeWait, 10)
            .unwrap();
        assert_eq!(bases.len(), 1);
        assert_eq!(bases[0].id, "1_1");

        repo.clear_group(7).unwrap();
        assert_eq!(repo.get_group_state(7).unwrap(), None);
        assert_eq!(repo.order("1_2").unwrap().group_id, 0);
    }

    #[test]
    fn test_closed_repository_rejects_calls() {
        let repo = MockRepository::new();
        repo.close().unwrap();
        assert!(repo.is_closed());
        assert!(matches!(
            repo.load_order("1_1"),
            Err(RepositoryError::Closed)
        ));
        assert!(matches!(
            repo.create_order(LocalOrderRecord::new(1, "1", "")),
            Err(RepositoryError::Closed)
        ));
    }

    #[test]
    fn test_fill_orders_skips_unknown_ids() {
        let repo = MockRepository::new();
        repo.insert_order(LocalOrderRecord::new(1, "5", ""));
        let filled = repo
            .fill_orders(&["1_5".to_string(), "1_6".to_string()])
            .unwrap();
        assert_eq!(filled.len(), 1);
    }
}

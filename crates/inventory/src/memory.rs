use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ItemId;
use tokio::sync::RwLock;

use crate::{InventoryError, InventoryItem, Result, store::InventoryStore};

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    items: HashMap<ItemId, InventoryItem>,
    fail_reads: bool,
    fail_decrement_for: HashSet<ItemId>,
    fail_restore: bool,
    decrement_delay: Option<Duration>,
    decrement_calls: u64,
}

/// In-memory inventory store.
///
/// Every mutation happens inside one write-lock critical section, so
/// `decrement_if_available` is atomic with respect to concurrent callers.
/// The failure switches exist so tests can drive the error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty in-memory inventory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given items.
    pub async fn with_items(items: impl IntoIterator<Item = InventoryItem>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().await;
            for item in items {
                state.items.insert(item.id.clone(), item);
            }
        }
        store
    }

    /// Returns the available quantity of an item, if present.
    pub async fn quantity(&self, id: &ItemId) -> Option<u32> {
        self.state.read().await.items.get(id).map(|i| i.quantity)
    }

    /// Returns how many times `decrement_if_available` has been called.
    pub async fn decrement_calls(&self) -> u64 {
        self.state.read().await.decrement_calls
    }

    /// Makes every `get_item` call fail.
    pub async fn set_fail_reads(&self, fail: bool) {
        self.state.write().await.fail_reads = fail;
    }

    /// Makes `decrement_if_available` fail for one item.
    pub async fn fail_decrement_for(&self, id: impl Into<ItemId>) {
        self.state.write().await.fail_decrement_for.insert(id.into());
    }

    /// Makes every `restore` call fail.
    pub async fn set_fail_restore(&self, fail: bool) {
        self.state.write().await.fail_restore = fail;
    }

    /// Delays every `decrement_if_available` call before it takes effect.
    pub async fn set_decrement_delay(&self, delay: Option<Duration>) {
        self.state.write().await.decrement_delay = delay;
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_item(&self, id: &ItemId) -> Result<Option<InventoryItem>> {
        let state = self.state.read().await;
        if state.fail_reads {
            return Err(InventoryError::Unavailable("reads disabled".to_string()));
        }
        Ok(state.items.get(id).cloned())
    }

    async fn put_item(&self, item: InventoryItem) -> Result<()> {
        self.state.write().await.items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn update_quantity(&self, id: &ItemId, new_quantity: u32) -> Result<()> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| InventoryError::ItemNotFound(id.clone()))?;
        item.quantity = new_quantity;
        Ok(())
    }

    async fn decrement_if_available(&self, id: &ItemId, amount: u32) -> Result<bool> {
        if amount == 0 {
            return Err(InventoryError::InvalidQuantity {
                item_id: id.clone(),
                quantity: amount,
            });
        }

        // Sleep outside the lock so a slow call doesn't block other items.
        let delay = self.state.read().await.decrement_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        state.decrement_calls += 1;

        if state.fail_decrement_for.contains(id) {
            return Err(InventoryError::Unavailable(format!(
                "decrement disabled for {id}"
            )));
        }

        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| InventoryError::ItemNotFound(id.clone()))?;

        if item.quantity < amount {
            return Ok(false);
        }
        item.quantity -= amount;
        Ok(true)
    }

    async fn restore(&self, id: &ItemId, amount: u32) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_restore {
            return Err(InventoryError::Unavailable("restore disabled".to_string()));
        }
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| InventoryError::ItemNotFound(id.clone()))?;
        item.quantity = item.quantity.saturating_add(amount);
        Ok(())
    }
}

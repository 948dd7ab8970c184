use async_trait::async_trait;
use common::ItemId;

use crate::{InventoryItem, Result};

/// Core trait for inventory store implementations.
///
/// All implementations must be thread-safe (Send + Sync); a single store is
/// shared by every concurrently running fulfillment handler.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reads an item.
    ///
    /// Returns None if the item doesn't exist.
    async fn get_item(&self, id: &ItemId) -> Result<Option<InventoryItem>>;

    /// Inserts or replaces an item.
    async fn put_item(&self, item: InventoryItem) -> Result<()>;

    /// Overwrites the available quantity of an item.
    ///
    /// This is a plain write: callers that read, compute and then write race
    /// with each other. Reservations must use [`decrement_if_available`] instead.
    ///
    /// [`decrement_if_available`]: InventoryStore::decrement_if_available
    async fn update_quantity(&self, id: &ItemId, new_quantity: u32) -> Result<()>;

    /// Atomically removes `amount` units if at least that many are available.
    ///
    /// Returns `Ok(true)` if the units were taken and `Ok(false)` if stock was
    /// insufficient, in which case nothing changes. Fails with
    /// `ItemNotFound` when the item doesn't exist.
    async fn decrement_if_available(&self, id: &ItemId, amount: u32) -> Result<bool>;

    /// Returns `amount` units to an item. Used to compensate a reservation.
    async fn restore(&self, id: &ItemId, amount: u32) -> Result<()>;
}

#[async_trait]
impl<T: InventoryStore + ?Sized> InventoryStore for std::sync::Arc<T> {
    async fn get_item(&self, id: &ItemId) -> Result<Option<InventoryItem>> {
        (**self).get_item(id).await
    }

    async fn put_item(&self, item: InventoryItem) -> Result<()> {
        (**self).put_item(item).await
    }

    async fn update_quantity(&self, id: &ItemId, new_quantity: u32) -> Result<()> {
        (**self).update_quantity(id, new_quantity).await
    }

    async fn decrement_if_available(&self, id: &ItemId, amount: u32) -> Result<bool> {
        (**self).decrement_if_available(id, amount).await
    }

    async fn restore(&self, id: &ItemId, amount: u32) -> Result<()> {
        (**self).restore(id, amount).await
    }
}

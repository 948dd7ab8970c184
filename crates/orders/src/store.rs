use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;

use crate::{NewOrder, Order, OrderStatus, Result};

/// Core trait for order store implementations.
///
/// The store enforces the status state machine: any write that would move an
/// order backwards or out of a terminal status is rejected with
/// `InvalidStatusTransition`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates a pending order, assigning its id and timestamps.
    async fn create(&self, new_order: NewOrder) -> Result<Order>;

    /// Loads an order by id.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Lists pending, not yet published orders created at or after `created_after`.
    ///
    /// Oldest first, at most `limit` orders.
    async fn list_pending(&self, created_after: DateTime<Utc>, limit: usize) -> Result<Vec<Order>>;

    /// Moves an order to `status`, recording `reason` and bumping `updated_at`.
    ///
    /// Returns the updated order.
    async fn set_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<Order>;

    /// Atomically moves a pending order to `Reserving`.
    ///
    /// Returns false if the order was not pending, meaning another delivery
    /// already owns (or finished) its fulfillment.
    async fn claim_for_fulfillment(&self, id: &OrderId) -> Result<bool>;

    /// Records that the order has been handed to the event channel.
    ///
    /// Idempotent: the first timestamp wins.
    async fn mark_published(&self, id: &OrderId) -> Result<()>;

    /// Removes the publish marker of a still pending order so the feed
    /// announces it again.
    ///
    /// Orders that have left `pending` keep their marker.
    async fn clear_published(&self, id: &OrderId) -> Result<()>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for std::sync::Arc<T> {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        (**self).create(new_order).await
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        (**self).get_order(id).await
    }

    async fn list_pending(&self, created_after: DateTime<Utc>, limit: usize) -> Result<Vec<Order>> {
        (**self).list_pending(created_after, limit).await
    }

    async fn set_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<Order> {
        (**self).set_status(id, status, reason).await
    }

    async fn claim_for_fulfillment(&self, id: &OrderId) -> Result<bool> {
        (**self).claim_for_fulfillment(id).await
    }

    async fn mark_published(&self, id: &OrderId) -> Result<()> {
        (**self).mark_published(id).await
    }

    async fn clear_published(&self, id: &OrderId) -> Result<()> {
        (**self).clear_published(id).await
    }
}

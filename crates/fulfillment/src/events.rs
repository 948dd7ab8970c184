//! The event published for every newly discovered order.

use common::{OrderId, UserId};
use orders::{Order, OrderItem, OrderStatus};
use serde::{Deserialize, Serialize};

/// Subject on which new orders are announced.
pub const ORDER_CREATED_SUBJECT: &str = "order.created";

/// Snapshot of an order as carried on the event channel.
///
/// The snapshot is a hint. Status and stock are always re-read from the
/// stores; only the requested quantities are taken from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentEvent {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
}

impl FulfillmentEvent {
    /// Captures an order.
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: order.id.clone(),
            user_id: order.user_id.clone(),
            items: order.items.clone(),
            status: order.status,
        }
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes an event from its JSON wire form.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

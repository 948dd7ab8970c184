//! Order record and creation input.

use chrono::{DateTime, Utc};
use common::{ItemId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::status::OrderStatus;

/// A line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The inventory item being ordered.
    pub item_id: ItemId,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit captured when the order was placed.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(item_id: impl Into<ItemId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total price for this item (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An order as held by the Order Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub status: OrderStatus,
    /// Why the order reached its current status, set by the status finalizer.
    pub status_reason: Option<String>,
    /// When the order was handed to the event channel, if ever.
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns true if the discovery feed should still publish this order.
    pub fn awaits_publish(&self) -> bool {
        self.status == OrderStatus::Pending && self.published_at.is_none()
    }
}

/// Input for creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    /// Explicit total; computed from the items when None.
    pub total: Option<Money>,
}

impl NewOrder {
    pub fn new(user_id: impl Into<UserId>, items: Vec<OrderItem>) -> Self {
        Self {
            user_id: user_id.into(),
            items,
            total: None,
        }
    }

    /// Overrides the computed total.
    pub fn with_total(mut self, total: Money) -> Self {
        self.total = Some(total);
        self
    }

    /// Checks quantities, prices and the total override.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        for item in &self.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    item_id: item.item_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    item_id: item.item_id.to_string(),
                    price: item.unit_price.cents(),
                });
            }
        }

        if let Some(total) = self.total
            && total.is_negative()
        {
            return Err(OrderError::NegativeTotal(total.cents()));
        }

        Ok(())
    }

    /// Builds the pending order record. Validates first.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderError> {
        self.validate()?;

        let total = self
            .total
            .unwrap_or_else(|| self.items.iter().map(OrderItem::total_price).sum());

        Ok(Order {
            id,
            user_id: self.user_id,
            items: self.items,
            total,
            status: OrderStatus::Pending,
            status_reason: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}

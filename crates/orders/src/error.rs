//! Order store error types.

use common::OrderId;
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order not found.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The requested status change would move the order backwards or out of a terminal state.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidStatusTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Invalid quantity.
    #[error("Invalid quantity for item {item_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { item_id: String, quantity: u32 },

    /// Invalid price.
    #[error("Invalid price for item {item_id}: {price} (must not be negative)")]
    InvalidPrice { item_id: String, price: i64 },

    /// An explicit total override was negative.
    #[error("Order total must not be negative: {0}")]
    NegativeTotal(i64),

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// A stored status string is not part of the enumeration.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Line items could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The in-memory store was told to fail (tests only).
    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, OrderError>;

use common::ItemId;
use thiserror::Error;

/// Errors that can occur when interacting with the inventory store.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The item does not exist in the store.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// A zero quantity was requested where at least one unit is required.
    #[error("Invalid quantity for item {item_id}: {quantity}")]
    InvalidQuantity { item_id: ItemId, quantity: u32 },

    /// A stored row could not be mapped back to an item.
    #[error("Invalid inventory row for item {item_id}: {reason}")]
    InvalidRow { item_id: String, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The in-memory store was told to fail (tests only).
    #[error("Inventory store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for inventory store operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

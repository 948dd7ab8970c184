//! Inventory store for the order fulfillment pipeline.
//!
//! The store is the single authority on available stock. Fulfillment reads it
//! to validate orders and reserves stock through [`InventoryStore::decrement_if_available`],
//! which never drives a quantity below zero even when many workers race on the
//! same item.

pub mod error;
pub mod item;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::ItemId;
pub use error::{InventoryError, Result};
pub use item::InventoryItem;
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use store::InventoryStore;

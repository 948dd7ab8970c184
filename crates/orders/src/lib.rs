//! Order store for the fulfillment pipeline.
//!
//! This crate provides:
//! - The order record and its line items
//! - The canonical status enumeration with its monotonic transition rules
//! - The `OrderStore` trait with in-memory and PostgreSQL implementations

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod status;
pub mod store;

pub use common::{ItemId, Money, OrderId, UserId};
pub use error::{OrderError, Result};
pub use memory::InMemoryOrderStore;
pub use order::{NewOrder, Order, OrderItem};
pub use postgres::PostgresOrderStore;
pub use status::OrderStatus;
pub use store::OrderStore;

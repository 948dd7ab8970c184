//! Shared identifiers and value types used across the fulfillment services.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{ItemId, OrderId, UserId};

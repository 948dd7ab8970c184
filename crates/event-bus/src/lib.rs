//! Event channel abstraction for the fulfillment pipeline.
//!
//! The channel is a transport, not a store:
//! - Delivery is at-least-once: a message may arrive more than once
//! - There is no ordering guarantee across subjects or publishers
//! - A message published while nobody is subscribed may be lost
//!
//! Consumers must therefore be idempotent. The Order Store, not the channel,
//! is the source of truth.

pub mod channel;
pub mod error;
pub mod memory;
pub mod message;
#[cfg(feature = "redis")]
pub mod redis_pubsub;

pub use channel::{EventChannel, Subscription};
pub use error::{ChannelError, Result};
pub use memory::InMemoryEventChannel;
pub use message::Message;
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisEventChannel;

//! Asynchronous order fulfillment.
//!
//! The pipeline moves a freshly created order to a terminal status:
//! 1. The discovery feed polls the order store and publishes new orders
//! 2. The worker claims each delivered order and reserves its inventory
//! 3. The status finalizer records the outcome
//!
//! Delivery is at-least-once. Duplicates are absorbed by the order claim and
//! the inventory store's atomic decrement; a failed reservation is undone by
//! replaying the reservation ledger in reverse.

pub mod dedup;
pub mod error;
pub mod events;
pub mod feed;
pub mod finalizer;
pub mod ledger;
pub mod worker;

pub use dedup::PublishDeduplicator;
pub use error::{FulfillmentError, Result};
pub use events::{FulfillmentEvent, ORDER_CREATED_SUBJECT};
pub use feed::{DiscoveryFeed, FeedConfig, TickReport};
pub use finalizer::StatusFinalizer;
pub use ledger::{CompensationReport, ReservationLedger};
pub use worker::{FulfillmentWorker, HandleOutcome, WorkerConfig};

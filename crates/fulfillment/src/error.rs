//! Fulfillment error types.

use orders::OrderError;
use thiserror::Error;

/// Errors surfaced by feed ticks.
///
/// Per-order failures never show up here: they end as a `failed` order with a
/// reason, or as a log line and a counter.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Order store error.
    #[error("Order store error: {0}")]
    Orders(#[from] OrderError),
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

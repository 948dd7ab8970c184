//! Single write point for an order's outcome.

use std::sync::Arc;

use common::OrderId;
use orders::{OrderStatus, OrderStore};

/// Writes an order's final status and reason.
///
/// Failures are logged and counted but never retried or returned: the
/// caller has nothing useful to do with them, and the order store rejects
/// any write that would move an order out of a terminal status.
pub struct StatusFinalizer<O: ?Sized> {
    orders: Arc<O>,
}

impl<O: ?Sized> Clone for StatusFinalizer<O> {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
        }
    }
}

impl<O: OrderStore + ?Sized> StatusFinalizer<O> {
    pub fn new(orders: Arc<O>) -> Self {
        Self { orders }
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %order_id, status = %status))]
    pub async fn finalize(&self, order_id: &OrderId, status: OrderStatus, reason: Option<String>) {
        match &reason {
            Some(reason) => tracing::info!(%reason, "finalizing order"),
            None => tracing::info!("finalizing order"),
        }

        if let Err(e) = self.orders.set_status(order_id, status, reason).await {
            metrics::counter!("status_finalizer_errors_total").increment(1);
            tracing::error!(error = %e, "failed to finalize order status");
        }
    }
}

//! Fulfillment worker.
//!
//! Consumes `order.created` deliveries and drives each order to `completed`
//! or `failed`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::OrderId;
use event_bus::Subscription;
use futures_util::StreamExt;
use inventory::InventoryStore;
use orders::{OrderError, OrderStatus, OrderStore};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::events::FulfillmentEvent;
use crate::finalizer::StatusFinalizer;
use crate::ledger::ReservationLedger;

/// Reason stored when the deadline expires.
pub const TIMEOUT_REASON: &str = "fulfillment timed out";

const MAX_CLAIM_BACKOFF: Duration = Duration::from_secs(1);

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Deadline for validating and reserving one order. Claim retries get a
    /// deadline of the same length.
    pub timeout: Duration,
    /// Deadline for undoing a partial reservation.
    pub compensation_timeout: Duration,
    /// Deliveries handled at the same time.
    pub max_in_flight: usize,
    /// First pause after a failed claim; doubles up to one second.
    pub claim_retry_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            compensation_timeout: Duration::from_secs(5),
            max_in_flight: 64,
            claim_retry_backoff: Duration::from_millis(100),
        }
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Every item reserved; the order is `completed`.
    Completed,
    /// The order is `failed` with this reason.
    Failed(String),
    /// The order was no longer pending, typically a repeated delivery.
    Skipped,
    /// The delivery was unusable and has been discarded.
    Dropped,
    /// The order could not be claimed and was handed back to the feed.
    Requeued,
}

enum Claim {
    Owned,
    NotPending,
    Unknown,
    Unavailable,
}

/// Reserves inventory for delivered orders.
///
/// Deliveries run concurrently with no lock per item; the inventory store's
/// conditional decrement keeps stock from going negative, and the order claim
/// (`pending` to `reserving`) makes a repeated delivery a no-op.
pub struct FulfillmentWorker<O: ?Sized, I: ?Sized> {
    orders: Arc<O>,
    inventory: Arc<I>,
    finalizer: StatusFinalizer<O>,
    config: WorkerConfig,
}

impl<O, I> FulfillmentWorker<O, I>
where
    O: OrderStore + ?Sized,
    I: InventoryStore + ?Sized,
{
    pub fn new(orders: Arc<O>, inventory: Arc<I>, config: WorkerConfig) -> Self {
        let finalizer = StatusFinalizer::new(Arc::clone(&orders));
        Self {
            orders,
            inventory,
            finalizer,
            config,
        }
    }

    /// Handles one raw delivery.
    pub async fn handle_message(&self, payload: &[u8]) -> HandleOutcome {
        metrics::counter!("fulfillment_messages_total").increment(1);

        match FulfillmentEvent::from_slice(payload) {
            Ok(event) => self.fulfill(&event).await,
            Err(e) => {
                metrics::counter!("fulfillment_decode_failures_total").increment(1);
                tracing::warn!(error = %e, "dropping undecodable fulfillment event");
                HandleOutcome::Dropped
            }
        }
    }

    /// Claims, reserves and finalizes one order.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.id))]
    pub async fn fulfill(&self, event: &FulfillmentEvent) -> HandleOutcome {
        let started = Instant::now();

        match self.claim(&event.id).await {
            Claim::Owned => {}
            Claim::NotPending => {
                metrics::counter!("fulfillment_duplicates_skipped_total").increment(1);
                tracing::info!("order is no longer pending, skipping delivery");
                return HandleOutcome::Skipped;
            }
            Claim::Unknown => {
                tracing::warn!("dropping event for unknown order");
                return HandleOutcome::Dropped;
            }
            Claim::Unavailable => {
                metrics::counter!("fulfillment_claims_abandoned_total").increment(1);
                self.requeue(&event.id).await;
                return HandleOutcome::Requeued;
            }
        }

        let mut ledger = ReservationLedger::new();
        let result =
            tokio::time::timeout(self.config.timeout, self.reserve(event, &mut ledger)).await;

        let outcome = match result {
            Ok(Ok(())) => {
                self.finalizer
                    .finalize(&event.id, OrderStatus::Completed, None)
                    .await;
                metrics::counter!("fulfillment_orders_completed_total").increment(1);
                HandleOutcome::Completed
            }
            Ok(Err(reason)) => self.fail(&event.id, &mut ledger, reason).await,
            Err(_) => {
                metrics::counter!("fulfillment_timeouts_total").increment(1);
                tracing::warn!(
                    reserved = ledger.len(),
                    timeout = ?self.config.timeout,
                    "fulfillment deadline expired"
                );
                self.fail(&event.id, &mut ledger, TIMEOUT_REASON.to_string())
                    .await
            }
        };

        metrics::histogram!("fulfillment_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    /// Claims the order, retrying store errors with backoff until the deadline.
    async fn claim(&self, order_id: &OrderId) -> Claim {
        let attempts = async {
            let mut backoff = self.config.claim_retry_backoff;
            loop {
                match self.orders.claim_for_fulfillment(order_id).await {
                    Ok(true) => return Claim::Owned,
                    Ok(false) => return Claim::NotPending,
                    Err(OrderError::NotFound(_)) => return Claim::Unknown,
                    Err(e) => {
                        metrics::counter!("fulfillment_claim_retries_total").increment(1);
                        tracing::warn!(error = %e, retry_in = ?backoff, "failed to claim order");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_CLAIM_BACKOFF);
                    }
                }
            }
        };

        tokio::time::timeout(self.config.timeout, attempts)
            .await
            .unwrap_or(Claim::Unavailable)
    }

    /// Clears the publish marker so the feed announces the order again.
    async fn requeue(&self, order_id: &OrderId) {
        match self.orders.clear_published(order_id).await {
            Ok(()) => tracing::warn!(%order_id, "order handed back to the feed"),
            Err(e) => {
                tracing::error!(%order_id, error = %e, "failed to hand order back to the feed");
            }
        }
    }

    /// Validates every line item, then takes stock item by item.
    ///
    /// Returns the failure reason. Each successful decrement is recorded in
    /// `ledger` before the next one starts.
    async fn reserve(
        &self,
        event: &FulfillmentEvent,
        ledger: &mut ReservationLedger,
    ) -> Result<(), String> {
        let mut insufficient = Vec::new();
        for item in &event.items {
            match self.inventory.get_item(&item.item_id).await {
                Ok(Some(stock)) if stock.has_available(item.quantity) => {}
                Ok(Some(stock)) => {
                    tracing::debug!(
                        item_id = %item.item_id,
                        requested = item.quantity,
                        available = stock.quantity,
                        "insufficient stock"
                    );
                    insufficient.push(item.item_id.as_str());
                }
                Ok(None) => {
                    tracing::debug!(item_id = %item.item_id, "item not found");
                    insufficient.push(item.item_id.as_str());
                }
                Err(e) => {
                    tracing::warn!(item_id = %item.item_id, error = %e, "failed to read item");
                    insufficient.push(item.item_id.as_str());
                }
            }
        }

        if !insufficient.is_empty() {
            return Err(format!("insufficient stock for: {}", insufficient.join(",")));
        }

        for item in &event.items {
            match self
                .inventory
                .decrement_if_available(&item.item_id, item.quantity)
                .await
            {
                Ok(true) => ledger.record(item.item_id.clone(), item.quantity),
                Ok(false) => return Err(format!("inventory conflict for {}", item.item_id)),
                Err(e) => {
                    tracing::warn!(item_id = %item.item_id, error = %e, "failed to reserve item");
                    return Err(format!("update failed for {}", item.item_id));
                }
            }
        }

        Ok(())
    }

    async fn fail(
        &self,
        order_id: &OrderId,
        ledger: &mut ReservationLedger,
        reason: String,
    ) -> HandleOutcome {
        self.compensate(order_id, ledger).await;
        self.finalizer
            .finalize(order_id, OrderStatus::Failed, Some(reason.clone()))
            .await;
        metrics::counter!("fulfillment_orders_failed_total").increment(1);
        HandleOutcome::Failed(reason)
    }

    async fn compensate(&self, order_id: &OrderId, ledger: &mut ReservationLedger) {
        if ledger.is_empty() {
            return;
        }

        let result = tokio::time::timeout(
            self.config.compensation_timeout,
            ledger.compensate(&*self.inventory, order_id),
        )
        .await;

        match result {
            Ok(report) if report.failed.is_empty() => {
                tracing::info!(restored = report.restored, "reservation compensated");
            }
            Ok(report) => {
                tracing::error!(
                    restored = report.restored,
                    failed = report.failed.len(),
                    "reservation only partially compensated"
                );
            }
            Err(_) => {
                for (item_id, quantity) in ledger.pending() {
                    metrics::counter!("inventory_compensation_failures_total").increment(1);
                    tracing::error!(%item_id, quantity, "compensation timed out, stock not restored");
                }
            }
        }
    }
}

impl<O, I> FulfillmentWorker<O, I>
where
    O: OrderStore + ?Sized + 'static,
    I: InventoryStore + ?Sized + 'static,
{
    /// Handles deliveries from `subscription` until shutdown is signalled or
    /// the subscription ends.
    ///
    /// Each delivery runs in its own task, at most `max_in_flight` at a time.
    /// On shutdown no new delivery is taken and running ones are awaited.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        tracing::info!(
            subject = subscription.subject(),
            max_in_flight = self.config.max_in_flight,
            "fulfillment worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                message = subscription.next() => {
                    let Some(message) = message else {
                        tracing::warn!("subscription closed");
                        break;
                    };
                    let permit = tokio::select! {
                        permit = Arc::clone(&semaphore).acquire_owned() => permit,
                        _ = stop_requested(&mut shutdown) => {
                            if let Ok(event) = FulfillmentEvent::from_slice(&message.payload) {
                                self.requeue(&event.id).await;
                            }
                            break;
                        }
                    };
                    let Ok(permit) = permit else {
                        break;
                    };
                    let worker = Arc::clone(&self);
                    tasks.spawn(async move {
                        let _permit = permit;
                        worker.handle_message(&message.payload).await;
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "fulfillment task panicked");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "fulfillment worker draining");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "fulfillment task panicked");
            }
        }
        tracing::info!("fulfillment worker stopped");
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

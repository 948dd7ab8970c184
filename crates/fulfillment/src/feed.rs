//! Order discovery feed.
//!
//! Polls the order store for orders that have not been announced yet and
//! publishes a [`FulfillmentEvent`] for each on [`ORDER_CREATED_SUBJECT`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use common::OrderId;
use event_bus::EventChannel;
use orders::{Order, OrderStore};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::dedup::PublishDeduplicator;
use crate::error::Result;
use crate::events::{FulfillmentEvent, ORDER_CREATED_SUBJECT};

/// Feed tuning.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Time between ticks.
    pub poll_interval: Duration,
    /// Maximum orders fetched per tick.
    pub batch_limit: usize,
    /// How far before startup the first tick looks.
    pub initial_lookback: Duration,
    /// Lifetime of dedup entries; `None` keeps them for the whole process.
    pub dedup_ttl: Option<Duration>,
    /// Every this many ticks, also fetch pending unpublished orders older
    /// than the watermark. Zero disables the sweep.
    pub backlog_sweep_every: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_limit: 100,
            initial_lookback: Duration::from_secs(60),
            dedup_ttl: Some(Duration::from_secs(3600)),
            backlog_sweep_every: 12,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Orders considered, retries included.
    pub fetched: usize,
    pub published: usize,
    /// Orders another tick had already handed to the channel.
    pub skipped_duplicates: usize,
    pub failed: usize,
    /// Orders found behind the watermark by the backlog sweep.
    pub swept: usize,
    /// The batch was full and ended at the watermark, so the window did not move.
    pub stalled: bool,
}

#[derive(Debug)]
struct FeedState {
    watermark: DateTime<Utc>,
    retry: Vec<OrderId>,
    ticks: u64,
}

enum PublishOutcome {
    Published,
    Duplicate,
    Failed,
}

/// Periodic producer of fulfillment events.
///
/// The watermark moves to the start of every tick. Orders whose publish
/// failed are kept on a retry list and re-read on the next tick, so they are
/// not lost once the watermark has passed them. A periodic backlog sweep
/// picks up orders whose publish marker was cleared after the watermark
/// passed them, such as deliveries a worker could not claim.
pub struct DiscoveryFeed<O: ?Sized, C: ?Sized> {
    orders: Arc<O>,
    channel: Arc<C>,
    dedup: PublishDeduplicator,
    config: FeedConfig,
    state: Mutex<FeedState>,
}

impl<O, C> DiscoveryFeed<O, C>
where
    O: OrderStore + ?Sized,
    C: EventChannel + ?Sized,
{
    pub fn new(orders: Arc<O>, channel: Arc<C>, config: FeedConfig) -> Self {
        let dedup = match config.dedup_ttl {
            Some(ttl) => PublishDeduplicator::with_ttl(ttl),
            None => PublishDeduplicator::new(),
        };
        let lookback = TimeDelta::from_std(config.initial_lookback).unwrap_or(TimeDelta::zero());

        Self {
            orders,
            channel,
            dedup,
            state: Mutex::new(FeedState {
                watermark: Utc::now() - lookback,
                retry: Vec::new(),
                ticks: 0,
            }),
            config,
        }
    }

    /// The dedup set shared by every tick of this feed.
    pub fn deduplicator(&self) -> &PublishDeduplicator {
        &self.dedup
    }

    /// The lower `created_at` bound the next tick will query with.
    pub fn watermark(&self) -> DateTime<Utc> {
        self.lock_state().watermark
    }

    /// Orders waiting to be retried on the next tick.
    pub fn retry_len(&self) -> usize {
        self.lock_state().retry.len()
    }

    /// Runs ticks until shutdown is signalled.
    ///
    /// Ticks never overlap: a slow tick delays the next one.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            batch_limit = self.config.batch_limit,
            "discovery feed started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report.fetched > 0 => {
                            tracing::info!(
                                fetched = report.fetched,
                                published = report.published,
                                skipped = report.skipped_duplicates,
                                failed = report.failed,
                                "feed tick finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "feed tick failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("discovery feed stopped");
    }

    /// Runs one poll-and-publish cycle.
    ///
    /// Fails only when the pending-order query fails; the window is then
    /// queried again on the next tick.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport> {
        metrics::counter!("feed_ticks_total").increment(1);

        let tick_start = Utc::now();
        let (watermark, retry, sweep) = {
            let mut state = self.lock_state();
            state.ticks += 1;
            let every = u64::from(self.config.backlog_sweep_every);
            let sweep = every > 0 && state.ticks % every == 0;
            let watermark = std::mem::replace(&mut state.watermark, tick_start);
            (watermark, std::mem::take(&mut state.retry), sweep)
        };

        let evicted = self.dedup.evict_expired();
        if evicted > 0 {
            tracing::debug!(evicted, "expired dedup entries evicted");
        }

        let mut batch = match self
            .orders
            .list_pending(watermark, self.config.batch_limit)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                let mut state = self.lock_state();
                state.watermark = state.watermark.min(watermark);
                state.retry.extend(retry);
                return Err(e.into());
            }
        };

        // A full batch may have left orders behind; resume from the newest one
        // fetched instead of skipping to this tick's start.
        let mut stalled = false;
        if batch.len() >= self.config.batch_limit
            && let Some(last) = batch.last()
        {
            let mut state = self.lock_state();
            state.watermark = state.watermark.min(last.created_at);
            stalled = last.created_at <= watermark;
        }

        // Dedup-skipped orders sharing one timestamp can fill every batch;
        // newer orders then wait for those entries to be published or expire.
        if stalled {
            metrics::counter!("feed_watermark_stalled_total").increment(1);
            tracing::warn!(
                %watermark,
                batch_limit = self.config.batch_limit,
                "feed window did not advance, full batch at the watermark"
            );
        }

        let swept = if sweep {
            self.sweep_backlog(watermark, &mut batch).await
        } else {
            0
        };

        let mut still_failing = self.reload_retries(retry, &mut batch).await;

        let mut report = TickReport {
            fetched: batch.len(),
            swept,
            stalled,
            ..TickReport::default()
        };

        for order in &batch {
            match self.publish_one(order).await {
                PublishOutcome::Published => report.published += 1,
                PublishOutcome::Duplicate => report.skipped_duplicates += 1,
                PublishOutcome::Failed => {
                    report.failed += 1;
                    still_failing.push(order.id.clone());
                }
            }
        }

        if !still_failing.is_empty() {
            let mut state = self.lock_state();
            for id in still_failing {
                if !state.retry.contains(&id) {
                    state.retry.push(id);
                }
            }
        }

        Ok(report)
    }

    /// Adds pending unpublished orders created before `watermark` to the batch.
    ///
    /// Their dedup entries are dropped first: the store says they are not
    /// published, so a leftover entry is stale.
    async fn sweep_backlog(&self, watermark: DateTime<Utc>, batch: &mut Vec<Order>) -> usize {
        let backlog = match self
            .orders
            .list_pending(DateTime::<Utc>::MIN_UTC, self.config.batch_limit)
            .await
        {
            Ok(backlog) => backlog,
            Err(e) => {
                tracing::warn!(error = %e, "backlog sweep failed");
                return 0;
            }
        };

        let mut swept = 0;
        for order in backlog {
            if order.created_at >= watermark || batch.iter().any(|o| o.id == order.id) {
                continue;
            }
            self.dedup.unmark(&order.id);
            batch.push(order);
            swept += 1;
        }

        if swept > 0 {
            metrics::counter!("feed_backlog_swept_total").increment(swept as u64);
            tracing::info!(swept, "backlog sweep found unpublished orders");
        }
        swept
    }

    /// Adds still-unpublished retry orders to the batch.
    ///
    /// Returns the ids that could not be re-read.
    async fn reload_retries(&self, retry: Vec<OrderId>, batch: &mut Vec<Order>) -> Vec<OrderId> {
        let mut unreadable = Vec::new();

        for id in retry {
            if batch.iter().any(|o| o.id == id) {
                continue;
            }
            match self.orders.get_order(&id).await {
                Ok(Some(order)) if order.awaits_publish() => batch.push(order),
                Ok(_) => tracing::debug!(order_id = %id, "retry no longer needed"),
                Err(e) => {
                    tracing::warn!(order_id = %id, error = %e, "failed to reload order for retry");
                    unreadable.push(id);
                }
            }
        }

        unreadable
    }

    async fn publish_one(&self, order: &Order) -> PublishOutcome {
        if !self.dedup.mark_if_absent(&order.id) {
            tracing::debug!(order_id = %order.id, "order already published, skipping");
            return PublishOutcome::Duplicate;
        }

        let payload = match FulfillmentEvent::from_order(order).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                self.dedup.unmark(&order.id);
                metrics::counter!("feed_publish_failures_total").increment(1);
                tracing::warn!(order_id = %order.id, error = %e, "failed to serialize order");
                return PublishOutcome::Failed;
            }
        };

        if let Err(e) = self.channel.publish(ORDER_CREATED_SUBJECT, payload).await {
            self.dedup.unmark(&order.id);
            metrics::counter!("feed_publish_failures_total").increment(1);
            tracing::warn!(order_id = %order.id, error = %e, "failed to publish order");
            return PublishOutcome::Failed;
        }

        metrics::counter!("feed_orders_published_total").increment(1);
        tracing::debug!(order_id = %order.id, "order published");

        if let Err(e) = self.orders.mark_published(&order.id).await {
            tracing::warn!(order_id = %order.id, error = %e, "failed to record publish marker");
        }

        PublishOutcome::Published
    }

    fn lock_state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Backend selection and pipeline task startup.

use std::sync::Arc;

use event_bus::{EventChannel, InMemoryEventChannel};
use fulfillment::{DiscoveryFeed, FulfillmentWorker, ORDER_CREATED_SUBJECT};
use inventory::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore};
use orders::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::StartupError;

/// The stores and channel the pipeline runs against.
#[derive(Clone)]
pub struct Backends {
    pub orders: Arc<dyn OrderStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub channel: Arc<dyn EventChannel>,
}

impl Backends {
    /// Process-local stores and channel.
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(InMemoryOrderStore::new()),
            inventory: Arc::new(InMemoryInventoryStore::new()),
            channel: Arc::new(InMemoryEventChannel::new()),
        }
    }

    /// Picks PostgreSQL and Redis when configured, in-memory otherwise.
    ///
    /// Runs the database migrations before returning.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let mut backends = Self::in_memory();

        if let Some(url) = &config.database_url {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let orders = PostgresOrderStore::new(pool.clone());
            orders.run_migrations().await?;
            backends.orders = Arc::new(orders);
            backends.inventory = Arc::new(PostgresInventoryStore::new(pool));
            tracing::info!("using PostgreSQL stores");
        } else {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
        }

        if let Some(url) = &config.redis_url {
            backends.channel = redis_channel(url)?;
            tracing::info!("using Redis event channel");
        }

        Ok(backends)
    }

    /// Starts the feed and/or worker for the configured role.
    ///
    /// The worker subscribes before the feed starts, so nothing the feed
    /// publishes from this process is missed. Every task stops when
    /// `shutdown` turns true.
    pub async fn spawn_pipeline(
        &self,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinSet<()>, StartupError> {
        let mut tasks = JoinSet::new();

        if config.role.runs_worker() {
            let subscription = self.channel.subscribe(ORDER_CREATED_SUBJECT).await?;
            let worker = Arc::new(FulfillmentWorker::new(
                Arc::clone(&self.orders),
                Arc::clone(&self.inventory),
                config.worker.clone(),
            ));
            tasks.spawn(worker.run(subscription, shutdown.clone()));
        }

        if config.role.runs_feed() {
            let feed = DiscoveryFeed::new(
                Arc::clone(&self.orders),
                Arc::clone(&self.channel),
                config.feed.clone(),
            );
            tasks.spawn(async move { feed.run(shutdown).await });
        }

        Ok(tasks)
    }
}

#[cfg(feature = "redis")]
fn redis_channel(url: &str) -> Result<Arc<dyn EventChannel>, StartupError> {
    Ok(Arc::new(event_bus::RedisEventChannel::new(url)?))
}

#[cfg(not(feature = "redis"))]
fn redis_channel(_url: &str) -> Result<Arc<dyn EventChannel>, StartupError> {
    Err(StartupError::RedisUnsupported)
}

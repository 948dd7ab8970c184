//! PostgreSQL integration tests for the order store.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p orders --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use orders::{
    Money, NewOrder, OrderError, OrderId, OrderItem, OrderStatus, OrderStore, PostgresOrderStore,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn new_order() -> NewOrder {
    NewOrder::new(
        "user-1",
        vec![
            OrderItem::new("SKU-001", 2, Money::from_cents(1000)),
            OrderItem::new("SKU-002", 1, Money::from_cents(2500)),
        ],
    )
}

#[tokio::test]
#[serial]
async fn create_and_get_order() {
    let store = get_test_store().await;
    let created = store.create(new_order()).await.unwrap();

    let loaded = store.get_order(&created.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.items, created.items);
    assert_eq!(loaded.total.cents(), 4500);
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert!(loaded.published_at.is_none());

    let missing = store.get_order(&OrderId::new("nope")).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
async fn list_pending_skips_published_and_claimed() {
    let store = get_test_store().await;
    let before = Utc::now() - chrono::Duration::seconds(5);

    let a = store.create(new_order()).await.unwrap();
    let b = store.create(new_order()).await.unwrap();
    let c = store.create(new_order()).await.unwrap();

    store.mark_published(&b.id).await.unwrap();
    store.claim_for_fulfillment(&c.id).await.unwrap();

    let pending = store.list_pending(before, 100).await.unwrap();
    let ids: Vec<_> = pending.into_iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![a.id]);

    let later = store
        .list_pending(Utc::now() + chrono::Duration::seconds(60), 100)
        .await
        .unwrap();
    assert!(later.is_empty());
}

#[tokio::test]
#[serial]
async fn claim_is_exclusive_under_concurrency() {
    let store = get_test_store().await;
    let order = store.create(new_order()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let id = order.id.clone();
        handles.push(tokio::spawn(async move {
            store.claim_for_fulfillment(&id).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
#[serial]
async fn set_status_is_monotonic() {
    let store = get_test_store().await;
    let order = store.create(new_order()).await.unwrap();
    store.claim_for_fulfillment(&order.id).await.unwrap();

    let completed = store
        .set_status(&order.id, OrderStatus::Completed, None)
        .await
        .unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    let stale = store
        .set_status(
            &order.id,
            OrderStatus::Failed,
            Some("inventory conflict for SKU-001".to_string()),
        )
        .await;
    assert!(matches!(
        stale,
        Err(OrderError::InvalidStatusTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Failed,
            ..
        })
    ));

    let missing = store
        .set_status(&OrderId::new("nope"), OrderStatus::Failed, None)
        .await;
    assert!(matches!(missing, Err(OrderError::NotFound(_))));
}

#[tokio::test]
#[serial]
async fn failure_reason_is_stored() {
    let store = get_test_store().await;
    let order = store.create(new_order()).await.unwrap();

    store
        .set_status(
            &order.id,
            OrderStatus::Failed,
            Some("insufficient stock for: SKU-002".to_string()),
        )
        .await
        .unwrap();

    let loaded = store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Failed);
    assert_eq!(
        loaded.status_reason.as_deref(),
        Some("insufficient stock for: SKU-002")
    );
}

#[tokio::test]
#[serial]
async fn clear_published_requeues_pending_order() {
    let store = get_test_store().await;
    let before = Utc::now() - chrono::Duration::seconds(5);

    let a = store.create(new_order()).await.unwrap();
    let b = store.create(new_order()).await.unwrap();
    store.mark_published(&a.id).await.unwrap();
    store.mark_published(&b.id).await.unwrap();
    store.claim_for_fulfillment(&b.id).await.unwrap();

    store.clear_published(&a.id).await.unwrap();
    store.clear_published(&b.id).await.unwrap();

    let pending = store.list_pending(before, 100).await.unwrap();
    let ids: Vec<_> = pending.into_iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![a.id]);

    let missing = store.clear_published(&OrderId::new("nope")).await;
    assert!(matches!(missing, Err(OrderError::NotFound(_))));
}

//! PostgreSQL integration tests for the inventory store.
//!
//! These tests share one PostgreSQL container and truncate between tests.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration
//! ```

use std::sync::Arc;

use common::Money;
use inventory::{InventoryError, InventoryItem, InventoryStore, ItemId, PostgresInventoryStore};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
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
            PostgresInventoryStore::new(temp_pool.clone())
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

async fn get_test_store() -> PostgresInventoryStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE inventory_items")
        .execute(&pool)
        .await
        .unwrap();

    PostgresInventoryStore::new(pool)
}

fn widget(quantity: u32) -> InventoryItem {
    InventoryItem::new("SKU-001", "Widget", Money::from_cents(1000), quantity)
        .with_category("widgets")
}

#[tokio::test]
#[serial]
async fn put_and_get_item() {
    let store = get_test_store().await;
    store.put_item(widget(7)).await.unwrap();

    let item = store
        .get_item(&ItemId::new("SKU-001"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item, widget(7));

    let missing = store.get_item(&ItemId::new("nope")).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
async fn conditional_decrement() {
    let store = get_test_store().await;
    store.put_item(widget(5)).await.unwrap();
    let id = ItemId::new("SKU-001");

    assert!(store.decrement_if_available(&id, 3).await.unwrap());
    assert!(!store.decrement_if_available(&id, 3).await.unwrap());

    let item = store.get_item(&id).await.unwrap().unwrap();
    assert_eq!(item.quantity, 2);
}

#[tokio::test]
#[serial]
async fn decrement_missing_item_is_not_found() {
    let store = get_test_store().await;
    let result = store.decrement_if_available(&ItemId::new("nope"), 1).await;
    assert!(matches!(result, Err(InventoryError::ItemNotFound(_))));
}

#[tokio::test]
#[serial]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    store.put_item(widget(10)).await.unwrap();
    let id = ItemId::new("SKU-001");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            store.decrement_if_available(&id, 1).await.unwrap()
        }));
    }

    let mut taken = 0;
    for handle in handles {
        if handle.await.unwrap() {
            taken += 1;
        }
    }

    assert_eq!(taken, 10);
    let item = store.get_item(&id).await.unwrap().unwrap();
    assert_eq!(item.quantity, 0);
}

#[tokio::test]
#[serial]
async fn restore_and_update_quantity() {
    let store = get_test_store().await;
    store.put_item(widget(1)).await.unwrap();
    let id = ItemId::new("SKU-001");

    store.restore(&id, 2).await.unwrap();
    assert_eq!(store.get_item(&id).await.unwrap().unwrap().quantity, 3);

    store.update_quantity(&id, 9).await.unwrap();
    assert_eq!(store.get_item(&id).await.unwrap().unwrap().quantity, 9);

    let missing = store.restore(&ItemId::new("nope"), 1).await;
    assert!(matches!(missing, Err(InventoryError::ItemNotFound(_))));
}

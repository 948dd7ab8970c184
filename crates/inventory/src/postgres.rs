use async_trait::async_trait;
use common::{ItemId, Money};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{InventoryError, InventoryItem, Result, store::InventoryStore};

/// PostgreSQL-backed inventory store.
///
/// Reservations are a single conditional `UPDATE`, so the database row lock
/// serializes competing decrements of the same item.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_item(row: PgRow) -> Result<InventoryItem> {
        let id: String = row.try_get("id")?;
        let quantity: i64 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| InventoryError::InvalidRow {
            item_id: id.clone(),
            reason: format!("quantity {quantity} out of range"),
        })?;

        Ok(InventoryItem {
            id: ItemId::new(id),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            category: row.try_get("category")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            quantity,
        })
    }

    async fn exists(&self, id: &ItemId) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM inventory_items WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[tracing::instrument(skip(self), fields(item_id = %id))]
    async fn get_item(&self, id: &ItemId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, category, unit_price_cents, quantity
            FROM inventory_items
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_item).transpose()
    }

    async fn put_item(&self, item: InventoryItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (id, name, description, category, unit_price_cents, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                unit_price_cents = EXCLUDED.unit_price_cents,
                quantity = EXCLUDED.quantity
            "#,
        )
        .bind(item.id.as_str())
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.category)
        .bind(item.unit_price.cents())
        .bind(i64::from(item.quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_quantity(&self, id: &ItemId, new_quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE inventory_items SET quantity = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(i64::from(new_quantity))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::ItemNotFound(id.clone()));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(item_id = %id))]
    async fn decrement_if_available(&self, id: &ItemId, amount: u32) -> Result<bool> {
        if amount == 0 {
            return Err(InventoryError::InvalidQuantity {
                item_id: id.clone(),
                quantity: amount,
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity = quantity - $2
            WHERE id = $1 AND quantity >= $2
            "#,
        )
        .bind(id.as_str())
        .bind(i64::from(amount))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Zero rows: either the item is gone or stock was short.
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(InventoryError::ItemNotFound(id.clone()))
        }
    }

    #[tracing::instrument(skip(self), fields(item_id = %id))]
    async fn restore(&self, id: &ItemId, amount: u32) -> Result<()> {
        let result =
            sqlx::query("UPDATE inventory_items SET quantity = quantity + $2 WHERE id = $1")
                .bind(id.as_str())
                .bind(i64::from(amount))
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::ItemNotFound(id.clone()));
        }
        Ok(())
    }
}

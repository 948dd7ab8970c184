use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{NewOrder, Order, OrderError, OrderItem, OrderStatus, Result, store::OrderStore};

const ORDER_COLUMNS: &str = "id, user_id, items, total_cents, status, status_reason, \
                             published_at, created_at, updated_at";

/// PostgreSQL-backed order store.
///
/// Status changes are conditional updates on the current status, so the
/// monotonic state machine holds even with several writers.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
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

    fn row_to_order(row: PgRow) -> Result<Order> {
        let items_json: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items_json)?;
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::new(row.try_get::<String, _>("id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            items,
            total: Money::from_cents(row.try_get("total_cents")?),
            status: status.parse()?,
            status_reason: row.try_get("status_reason")?,
            published_at: row.try_get("published_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, new_order))]
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        let order = new_order.into_order(OrderId::generate(), Utc::now())?;
        let items_json = serde_json::to_value(&order.items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, items, total_cents, status, status_reason,
                                published_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.user_id.as_str())
        .bind(items_json)
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(&order.status_reason)
        .bind(order.published_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(order)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_pending(&self, created_after: DateTime<Utc>, limit: usize) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status = 'pending' AND published_at IS NULL AND created_at >= $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(created_after)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self, reason), fields(order_id = %id, status = %status))]
    async fn set_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<Order> {
        let allowed: Vec<String> = OrderStatus::predecessors(status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $2, status_reason = $3, updated_at = $4
            WHERE id = $1 AND status = ANY($5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(reason)
        .bind(Utc::now())
        .bind(allowed)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_order(row);
        }

        // Nothing updated: tell a missing order apart from a rejected transition.
        match self.get_order(id).await? {
            Some(current) => Err(OrderError::InvalidStatusTransition {
                order_id: id.clone(),
                from: current.status,
                to: status,
            }),
            None => Err(OrderError::NotFound(id.clone())),
        }
    }

    #[tracing::instrument(skip(self), fields(order_id = %id))]
    async fn claim_for_fulfillment(&self, id: &OrderId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'reserving', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.get_order(id).await? {
            Some(_) => Ok(false),
            None => Err(OrderError::NotFound(id.clone())),
        }
    }

    async fn mark_published(&self, id: &OrderId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET published_at = COALESCE(published_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrderError::NotFound(id.clone()));
        }
        Ok(())
    }
    #[tracing::instrument(skip(self), fields(order_id = %id))]
    async fn clear_published(&self, id: &OrderId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET published_at = NULL
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.get_order(id).await?.is_none() {
            return Err(OrderError::NotFound(id.clone()));
        }
        Ok(())
    }
}

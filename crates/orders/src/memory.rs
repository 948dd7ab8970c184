use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use tokio::sync::RwLock;

use crate::{NewOrder, Order, OrderError, OrderStatus, Result, store::OrderStore};

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, Order>,
    fail_list: bool,
    fail_set_status: bool,
    fail_mark_published: bool,
    fail_claim: bool,
    fail_next_claims: usize,
}

/// In-memory order store for tests and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an order as-is, bypassing validation and timestamping.
    ///
    /// Lets tests place orders at chosen creation times.
    pub async fn insert(&self, order: Order) {
        self.state
            .write()
            .await
            .orders
            .insert(order.id.clone(), order);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Makes every `list_pending` call fail.
    pub async fn set_fail_list(&self, fail: bool) {
        self.state.write().await.fail_list = fail;
    }

    /// Makes every `set_status` call fail.
    pub async fn set_fail_set_status(&self, fail: bool) {
        self.state.write().await.fail_set_status = fail;
    }

    /// Makes every `mark_published` call fail.
    pub async fn set_fail_mark_published(&self, fail: bool) {
        self.state.write().await.fail_mark_published = fail;
    }

    /// Makes every `claim_for_fulfillment` call fail until switched off.
    pub async fn set_fail_claim(&self, fail: bool) {
        self.state.write().await.fail_claim = fail;
    }

    /// Makes the next `n` `claim_for_fulfillment` calls fail.
    pub async fn fail_next_claims(&self, n: usize) {
        self.state.write().await.fail_next_claims = n;
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        let order = new_order.into_order(OrderId::generate(), Utc::now())?;
        self.insert(order.clone()).await;
        Ok(order)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(id).cloned())
    }

    async fn list_pending(&self, created_after: DateTime<Utc>, limit: usize) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        if state.fail_list {
            return Err(OrderError::Unavailable("list disabled".to_string()));
        }

        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.awaits_publish() && o.created_at >= created_after)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn set_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.fail_set_status {
            return Err(OrderError::Unavailable("status writes disabled".to_string()));
        }

        let order = state
            .orders
            .get_mut(id)
            .ok_or_else(|| OrderError::NotFound(id.clone()))?;

        if !order.status.can_transition_to(status) {
            return Err(OrderError::InvalidStatusTransition {
                order_id: id.clone(),
                from: order.status,
                to: status,
            });
        }

        order.status = status;
        order.status_reason = reason;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn claim_for_fulfillment(&self, id: &OrderId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.fail_claim || state.fail_next_claims > 0 {
            state.fail_next_claims = state.fail_next_claims.saturating_sub(1);
            return Err(OrderError::Unavailable("claims disabled".to_string()));
        }

        let order = state
            .orders
            .get_mut(id)
            .ok_or_else(|| OrderError::NotFound(id.clone()))?;

        if !order.status.can_claim() {
            return Ok(false);
        }
        order.status = OrderStatus::Reserving;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_published(&self, id: &OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_mark_published {
            return Err(OrderError::Unavailable("publish marker disabled".to_string()));
        }

        let order = state
            .orders
            .get_mut(id)
            .ok_or_else(|| OrderError::NotFound(id.clone()))?;
        if order.published_at.is_none() {
            order.published_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn clear_published(&self, id: &OrderId) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(id)
            .ok_or_else(|| OrderError::NotFound(id.clone()))?;
        if order.status == OrderStatus::Pending {
            order.published_at = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrderItem;
    use chrono::Duration;
    use common::Money;

    fn new_order() -> NewOrder {
        NewOrder::new(
            "user-1",
            vec![OrderItem::new("SKU-001", 2, Money::from_cents(1000))],
        )
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_pending_status() {
        let store = InMemoryOrderStore::new();
        let order = store.create(new_order()).await.unwrap();

        assert!(!order.id.as_str().is_empty());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total.cents(), 2000);

        let loaded = store.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded, order);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_order() {
        let store = InMemoryOrderStore::new();
        let result = store.create(NewOrder::new("user-1", vec![])).await;
        assert!(matches!(result, Err(OrderError::NoItems)));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_pending_respects_watermark_limit_and_order() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();

        for (i, offset) in [-30, 10, 5, 20].into_iter().enumerate() {
            let mut order = new_order()
                .into_order(OrderId::new(format!("o-{i}")), now + Duration::seconds(offset))
                .unwrap();
            if i == 3 {
                order.published_at = Some(now);
            }
            store.insert(order).await;
        }

        let pending = store.list_pending(now, 10).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["o-2", "o-1"]);

        let limited = store.list_pending(now, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id.as_str(), "o-2");
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = InMemoryOrderStore::new();
        let order = store.create(new_order()).await.unwrap();

        assert!(store.claim_for_fulfillment(&order.id).await.unwrap());
        assert!(!store.claim_for_fulfillment(&order.id).await.unwrap());

        let loaded = store.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Reserving);
    }

    #[tokio::test]
    async fn test_claim_missing_order() {
        let store = InMemoryOrderStore::new();
        let result = store.claim_for_fulfillment(&OrderId::new("nope")).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_status_records_reason_and_is_monotonic() {
        let store = InMemoryOrderStore::new();
        let order = store.create(new_order()).await.unwrap();
        store.claim_for_fulfillment(&order.id).await.unwrap();

        let failed = store
            .set_status(
                &order.id,
                OrderStatus::Failed,
                Some("insufficient stock for: SKU-001".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(failed.status, OrderStatus::Failed);
        assert_eq!(
            failed.status_reason.as_deref(),
            Some("insufficient stock for: SKU-001")
        );
        assert!(failed.updated_at >= order.updated_at);

        let result = store
            .set_status(&order.id, OrderStatus::Completed, None)
            .await;
        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition {
                from: OrderStatus::Failed,
                to: OrderStatus::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_mark_published_keeps_first_timestamp() {
        let store = InMemoryOrderStore::new();
        let order = store.create(new_order()).await.unwrap();

        store.mark_published(&order.id).await.unwrap();
        let first = store
            .get_order(&order.id)
            .await
            .unwrap()
            .unwrap()
            .published_at;
        store.mark_published(&order.id).await.unwrap();
        let second = store
            .get_order(&order.id)
            .await
            .unwrap()
            .unwrap()
            .published_at;

        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(
            store
                .list_pending(order.created_at, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_clear_published_requeues_only_pending_orders() {
        let store = InMemoryOrderStore::new();
        let pending = store.create(new_order()).await.unwrap();
        let claimed = store.create(new_order()).await.unwrap();
        store.mark_published(&pending.id).await.unwrap();
        store.mark_published(&claimed.id).await.unwrap();
        store.claim_for_fulfillment(&claimed.id).await.unwrap();

        store.clear_published(&pending.id).await.unwrap();
        store.clear_published(&claimed.id).await.unwrap();

        let pending = store.get_order(&pending.id).await.unwrap().unwrap();
        let claimed = store.get_order(&claimed.id).await.unwrap().unwrap();
        assert!(pending.awaits_publish());
        assert!(claimed.published_at.is_some());

        let missing = store.clear_published(&OrderId::new("nope")).await;
        assert!(matches!(missing, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fail_next_claims() {
        let store = InMemoryOrderStore::new();
        let order = store.create(new_order()).await.unwrap();
        store.fail_next_claims(1).await;

        assert!(matches!(
            store.claim_for_fulfillment(&order.id).await,
            Err(OrderError::Unavailable(_))
        ));
        assert!(store.claim_for_fulfillment(&order.id).await.unwrap());
    }
}

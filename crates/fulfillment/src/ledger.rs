//! Record of inventory taken for one order, and its undo.

use common::{ItemId, OrderId};
use inventory::InventoryStore;

/// Outcome of replaying a ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompensationReport {
    /// Decrements given back.
    pub restored: usize,
    /// Items whose restore failed; their stock stays reduced.
    pub failed: Vec<ItemId>,
}

/// Decrements performed while reserving an order, in the order they happened.
///
/// The ledger lives outside the fulfillment deadline so a timed-out
/// reservation can still be undone.
#[derive(Debug, Default)]
pub struct ReservationLedger {
    entries: Vec<(ItemId, u32)>,
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful decrement.
    pub fn record(&mut self, item_id: ItemId, quantity: u32) {
        self.entries.push((item_id, quantity));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns every recorded decrement, newest first.
    ///
    /// Each entry leaves the ledger as soon as its restore has been attempted,
    /// so a compensation cut short by a deadline leaves only the untouched
    /// entries behind.
    pub async fn compensate<I>(&mut self, inventory: &I, order_id: &OrderId) -> CompensationReport
    where
        I: InventoryStore + ?Sized,
    {
        let mut report = CompensationReport::default();

        while let Some((item_id, quantity)) = self.entries.pop() {
            match inventory.restore(&item_id, quantity).await {
                Ok(()) => {
                    metrics::counter!("inventory_compensations_total").increment(1);
                    tracing::debug!(%order_id, %item_id, quantity, "reservation restored");
                    report.restored += 1;
                }
                Err(e) => {
                    metrics::counter!("inventory_compensation_failures_total").increment(1);
                    tracing::error!(
                        %order_id,
                        %item_id,
                        quantity,
                        error = %e,
                        "failed to restore reservation"
                    );
                    report.failed.push(item_id);
                }
            }
        }

        report
    }

    /// Entries not yet compensated.
    pub fn pending(&self) -> impl Iterator<Item = (&ItemId, u32)> {
        self.entries.iter().map(|(id, qty)| (id, *qty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use inventory::{InMemoryInventoryStore, InventoryItem};

    async fn store() -> InMemoryInventoryStore {
        InMemoryInventoryStore::with_items([
            InventoryItem::new("A", "Widget", Money::from_cents(100), 10),
            InventoryItem::new("B", "Gadget", Money::from_cents(200), 10),
        ])
        .await
    }

    #[tokio::test]
    async fn test_compensate_restores_everything() {
        let inventory = store().await;
        let order_id = OrderId::new("o-1");
        let mut ledger = ReservationLedger::new();

        for (id, qty) in [("A", 3), ("B", 2)] {
            let id = ItemId::new(id);
            assert!(inventory.decrement_if_available(&id, qty).await.unwrap());
            ledger.record(id, qty);
        }

        let report = ledger.compensate(&inventory, &order_id).await;

        assert_eq!(report.restored, 2);
        assert!(report.failed.is_empty());
        assert!(ledger.is_empty());
        assert_eq!(inventory.quantity(&ItemId::new("A")).await, Some(10));
        assert_eq!(inventory.quantity(&ItemId::new("B")).await, Some(10));
    }

    #[tokio::test]
    async fn test_restore_failures_are_reported() {
        let inventory = store().await;
        let mut ledger = ReservationLedger::new();
        ledger.record(ItemId::new("A"), 1);
        ledger.record(ItemId::new("B"), 1);
        inventory.set_fail_restore(true).await;

        let report = ledger.compensate(&inventory, &OrderId::new("o-1")).await;

        assert_eq!(report.restored, 0);
        // Newest first.
        assert_eq!(report.failed, vec![ItemId::new("B"), ItemId::new("A")]);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_empty_ledger_is_noop() {
        let inventory = store().await;
        let mut ledger = ReservationLedger::new();
        let report = ledger.compensate(&inventory, &OrderId::new("o-1")).await;
        assert_eq!(report, CompensationReport::default());
    }
}

//! Inventory item record.

use common::{ItemId, Money};
use serde::{Deserialize, Serialize};

/// A catalog item with its available stock.
///
/// Name, description and category belong to the catalog and are carried
/// through untouched; fulfillment only looks at `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub unit_price: Money,
    /// Units available for reservation.
    pub quantity: u32,
}

impl InventoryItem {
    /// Creates an item with empty description and category.
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            unit_price,
            quantity,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Returns true if at least `requested` units are available.
    pub fn has_available(&self, requested: u32) -> bool {
        self.quantity >= requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_available() {
        let item = InventoryItem::new("SKU-001", "Widget", Money::from_cents(500), 3);
        assert!(item.has_available(3));
        assert!(!item.has_available(4));
    }

    #[test]
    fn test_builder_fields() {
        let item = InventoryItem::new("SKU-001", "Widget", Money::from_cents(500), 3)
            .with_description("A small widget")
            .with_category("widgets");
        assert_eq!(item.description, "A small widget");
        assert_eq!(item.category, "widgets");
    }
}

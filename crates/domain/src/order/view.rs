use common::Money;
use serde::{Deserialize, Serialize};
use store::{OrderItemRecord, OrderRecord, StoredOrder};

use super::OrderStatus;

/// An order with its items and its derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub status: OrderStatus,
    pub items: Vec<OrderItemRecord>,
}

impl OrderView {
    /// Subtotal of items that still hold stock.
    pub fn active_amount(&self) -> Money {
        self.items
            .iter()
            .filter(|item| !item.status.releases_stock())
            .map(OrderItemRecord::subtotal)
            .sum()
    }

    /// Subtotal of cancelled and returned items.
    pub fn released_amount(&self) -> Money {
        self.items
            .iter()
            .filter(|item| item.status.releases_stock())
            .map(OrderItemRecord::subtotal)
            .sum()
    }
}

impl From<StoredOrder> for OrderView {
    fn from(stored: StoredOrder) -> Self {
        let status = OrderStatus::derive(stored.items.iter().map(|item| item.status));
        Self {
            order: stored.order,
            status,
            items: stored.items,
        }
    }
}

//! Order-level status, computed from item statuses on every read.

use common::ItemStatus;
use serde::{Deserialize, Serialize};

/// The status of an order as seen by customers and admins.
///
/// Never stored. See [`OrderStatus::derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
    /// Every item is terminal but they ended differently, e.g. one
    /// delivered and one cancelled.
    Mixed,
}

impl OrderStatus {
    /// Derives the order status from its items:
    ///
    /// 1. all items share a status: that status;
    /// 2. every item is terminal: `Mixed`;
    /// 3. every active (not cancelled or returned) item shares a status:
    ///    that status;
    /// 4. otherwise `Processing`.
    pub fn derive<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ItemStatus>,
    {
        let statuses: Vec<ItemStatus> = statuses.into_iter().collect();
        let Some(&first) = statuses.first() else {
            return OrderStatus::Pending;
        };

        if statuses.iter().all(|s| *s == first) {
            return first.into();
        }
        if statuses.iter().all(ItemStatus::is_terminal) {
            return OrderStatus::Mixed;
        }

        let mut active = statuses.iter().filter(|s| !s.releases_stock());
        match active.next() {
            Some(&head) if active.all(|s| *s == head) => head.into(),
            _ => OrderStatus::Processing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Returned => "Returned",
            OrderStatus::Mixed => "Mixed",
        }
    }
}

impl From<ItemStatus> for OrderStatus {
    fn from(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Pending => OrderStatus::Pending,
            ItemStatus::Processing => OrderStatus::Processing,
            ItemStatus::Shipped => OrderStatus::Shipped,
            ItemStatus::Delivered => OrderStatus::Delivered,
            ItemStatus::Cancelled => OrderStatus::Cancelled,
            ItemStatus::Returned => OrderStatus::Returned,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

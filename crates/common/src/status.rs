use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fulfilment status of a single order item.
///
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │             │            │
///    └──► Cancelled ◄┘ (admin)   └──► Returned
/// ```
///
/// Which edges are legal, and for whom, is decided by the domain's
/// transition authority; this type only names the states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ItemStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    /// Terminal.
    Delivered,
    /// Terminal. Stock has been released.
    Cancelled,
    /// Terminal. Stock has been released.
    Returned,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 6] = [
        ItemStatus::Pending,
        ItemStatus::Processing,
        ItemStatus::Shipped,
        ItemStatus::Delivered,
        ItemStatus::Cancelled,
        ItemStatus::Returned,
    ];

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Delivered | ItemStatus::Cancelled | ItemStatus::Returned
        )
    }

    /// Returns true if entering this status gives the units back to stock.
    pub fn releases_stock(&self) -> bool {
        matches!(self, ItemStatus::Cancelled | ItemStatus::Returned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "Pending",
            ItemStatus::Processing => "Processing",
            ItemStatus::Shipped => "Shipped",
            ItemStatus::Delivered => "Delivered",
            ItemStatus::Cancelled => "Cancelled",
            ItemStatus::Returned => "Returned",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a stored or submitted status name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown item status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for ItemStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

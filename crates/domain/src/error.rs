//! Domain error types.

use common::{ItemStatus, VariantId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
///
/// Everything except `Store` is an expected, recoverable condition that the
/// caller can act on; `Store` is an infrastructure fault.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A product, variant, cart line, order or item does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the resource, or lacks the admin role.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A cart quantity outside `[1, max]`.
    #[error("Invalid quantity: {quantity} (must be between 1 and {max})")]
    InvalidQuantity { quantity: u32, max: u32 },

    /// More units were asked for than the variant currently holds.
    #[error("Out of stock: requested {requested} of variant {variant_id}, only {available} left")]
    OutOfStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// A reservation at checkout could not be satisfied.
    #[error(
        "Insufficient stock: requested {requested} of variant {variant_id}, only {available} left"
    )]
    InsufficientStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// None of the selected cart lines resolved.
    #[error("Nothing to check out")]
    EmptyCheckout,

    /// The status graph does not allow this move.
    #[error("Invalid transition: cannot move {subject} from {from} to {to}")]
    InvalidTransition {
        subject: &'static str,
        from: String,
        to: ItemStatus,
    },

    /// A concurrent writer got there first.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input, e.g. a catalog price above the marked price.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind, distinct per variant.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "not_found",
            DomainError::Unauthorized(_) => "unauthorized",
            DomainError::InvalidQuantity { .. } => "invalid_quantity",
            DomainError::OutOfStock { .. } => "out_of_stock",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::EmptyCheckout => "empty_checkout",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::Conflict(_) => "conflict",
            DomainError::Validation(_) => "validation",
            DomainError::Store(_) => "internal",
        }
    }

    /// Units still available, for stock failures.
    pub fn available_stock(&self) -> Option<u32> {
        match self {
            DomainError::OutOfStock { available, .. }
            | DomainError::InsufficientStock { available, .. } => Some(*available),
            _ => None,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::InsufficientStock {
                variant_id,
                requested,
                available,
            } => DomainError::InsufficientStock {
                variant_id,
                requested,
                available,
            },
            StoreError::Conflict(msg) => DomainError::Conflict(msg),
            other => DomainError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_onto_the_taxonomy() {
        let variant_id = VariantId::new();
        let err: DomainError = StoreError::InsufficientStock {
            variant_id,
            requested: 3,
            available: 1,
        }
        .into();
        assert_eq!(err.code(), "insufficient_stock");
        assert_eq!(err.available_stock(), Some(1));

        let err: DomainError = StoreError::Conflict("lost race".to_string()).into();
        assert_eq!(err.code(), "conflict");

        let err: DomainError = StoreError::Decode("bad status".to_string()).into();
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn test_messages_are_actionable() {
        let err = DomainError::OutOfStock {
            variant_id: VariantId::new(),
            requested: 5,
            available: 2,
        };
        assert!(err.to_string().contains("only 2 left"));

        let err = DomainError::InvalidTransition {
            subject: "item",
            from: "Shipped".to_string(),
            to: ItemStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot move item from Shipped to Cancelled"
        );
    }
}

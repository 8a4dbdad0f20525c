//! Identity handed to the core by the authentication boundary.

use common::CustomerId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// An already-authenticated caller.
///
/// The core trusts this value and only performs ownership and role checks
/// against it; it never verifies credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub customer_id: CustomerId,
    pub is_admin: bool,
}

impl Caller {
    pub fn customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            is_admin: false,
        }
    }

    pub fn admin(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            is_admin: true,
        }
    }

    /// Passes if the caller owns the resource or is an admin.
    pub fn ensure_owner_or_admin(&self, owner: CustomerId) -> Result<(), DomainError> {
        if self.is_admin || self.customer_id == owner {
            Ok(())
        } else {
            Err(DomainError::Unauthorized(
                "resource belongs to another customer".to_string(),
            ))
        }
    }

    pub fn ensure_admin(&self) -> Result<(), DomainError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(DomainError::Unauthorized("admin role required".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_passes_stranger_fails() {
        let owner = CustomerId::new();
        assert!(Caller::customer(owner).ensure_owner_or_admin(owner).is_ok());
        assert!(matches!(
            Caller::customer(CustomerId::new()).ensure_owner_or_admin(owner),
            Err(DomainError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_admin_passes_everything() {
        let admin = Caller::admin(CustomerId::new());
        assert!(admin.ensure_owner_or_admin(CustomerId::new()).is_ok());
        assert!(admin.ensure_admin().is_ok());
        assert!(Caller::customer(CustomerId::new()).ensure_admin().is_err());
    }
}

//! Caller identity as asserted by the upstream authenticator.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::CustomerId;
use domain::Caller;

use crate::error::ApiError;

/// Header carrying the authenticated customer's id.
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";
/// Header carrying the caller's role; only `admin` is meaningful.
pub const ROLE_HEADER: &str = "x-customer-role";

/// Extracts the [`Caller`] from the identity headers.
///
/// Rejects with 401 when the id header is missing or not a UUID.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CUSTOMER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("missing caller identity".to_string()))?
            .to_str()
            .map_err(|_| ApiError::Unauthenticated("malformed caller identity".to_string()))?;
        let uuid = uuid::Uuid::parse_str(raw.trim())
            .map_err(|_| ApiError::Unauthenticated("malformed caller identity".to_string()))?;

        let is_admin = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        Ok(Identity(Caller {
            customer_id: CustomerId::from_uuid(uuid),
            is_admin,
        }))
    }
}

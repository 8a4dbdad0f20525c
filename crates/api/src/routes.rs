//! HTTP handlers, one module per resource.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod health;
pub mod metrics;
pub mod orders;

use std::str::FromStr;

use serde::Deserialize;

use crate::error::ApiError;

/// Body of the status-change endpoints.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Parses a path segment into a typed id.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} ID: {e}")))
}

pub(crate) fn parse_status(raw: &str) -> Result<common::ItemStatus, ApiError> {
    raw.parse()
        .map_err(|e: common::ParseStatusError| ApiError::BadRequest(e.to_string()))
}

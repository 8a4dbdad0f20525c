//! Shared identifiers and value types for the BazaarHub order core.
//!
//! Everything in here is plain data: typed identifiers, integer money,
//! item lifecycle statuses and the snapshot types captured on an order.
//! Rules about how these values may change live in the `domain` crate.

mod checkout;
mod ids;
mod money;
mod status;

pub use checkout::{PaymentMethod, ShippingAddress};
pub use ids::{CartLineId, CustomerId, OrderId, OrderItemId, ProductId, VariantId};
pub use money::Money;
pub use status::{ItemStatus, ParseStatusError};

//! Domain layer of the BazaarHub order core.
//!
//! This crate provides the four services the HTTP layer drives:
//! - [`CatalogService`]: products, variants and stock
//! - [`CartService`]: per-customer staging of variants before checkout
//! - [`OrderEngine`]: atomic checkout of selected cart lines into an order
//! - [`StatusAuthority`]: the item and order status graph, with stock
//!   released on cancellation and return
//!
//! Every service takes a store handle at construction; nothing here holds
//! global state.

pub mod caller;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod order;

pub use caller::Caller;
pub use cart::{CartPolicy, CartService, DEFAULT_MAX_LINE_QUANTITY};
pub use catalog::{CatalogService, NewProduct, NewVariant, ProductView};
pub use error::DomainError;
pub use order::{
    Actor, OrderEngine, OrderStatus, OrderView, PlaceOrder, StatusAuthority,
    check_item_transition, plan_order_transition,
};

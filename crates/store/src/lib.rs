//! Relational persistence for the order core.
//!
//! [`CommerceStore`] is the only way the domain touches durable state.
//! Every multi-row mutation (checkout, status transitions with their stock
//! release) is a single method so each backend can make it atomic.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    CartLineRecord, ItemTransition, OrderItemRecord, OrderPlacement, OrderRecord, ProductRecord,
    StoredOrder, VariantRecord,
};
pub use store::{CommerceStore, CommerceStoreExt};

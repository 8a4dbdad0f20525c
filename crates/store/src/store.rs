use async_trait::async_trait;
use common::{CartLineId, CustomerId, Money, OrderId, ProductId, VariantId};

use crate::{
    CartLineRecord, ItemTransition, OrderPlacement, ProductRecord, Result, StoreError,
    StoredOrder, VariantRecord,
};

/// Core trait for store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Methods that
/// touch more than one row are atomic: they either apply completely or
/// leave every row unchanged.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    // -- Catalog --

    /// Inserts a product together with its variants.
    async fn insert_product(
        &self,
        product: ProductRecord,
        variants: Vec<VariantRecord>,
    ) -> Result<()>;

    async fn get_product(&self, product_id: ProductId) -> Result<Option<ProductRecord>>;

    /// Lists all products, oldest first.
    async fn list_products(&self) -> Result<Vec<ProductRecord>>;

    /// Lists the variants of a product.
    async fn list_variants(&self, product_id: ProductId) -> Result<Vec<VariantRecord>>;

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<VariantRecord>>;

    /// Atomically checks `stock_quantity >= quantity` and decrements.
    ///
    /// Fails with `InsufficientStock` (and changes nothing) if the check
    /// does not hold, or `NotFound` if the variant does not exist.
    async fn reserve_stock(&self, variant_id: VariantId, quantity: u32) -> Result<VariantRecord>;

    /// Increments stock. Callers guarantee at most one release per unit.
    async fn release_stock(&self, variant_id: VariantId, quantity: u32) -> Result<VariantRecord>;

    /// Replaces a variant's prices. Existing orders are unaffected.
    async fn update_variant_price(
        &self,
        variant_id: VariantId,
        marked_price: Money,
        selling_price: Money,
    ) -> Result<VariantRecord>;

    // -- Cart --

    async fn get_cart_line(&self, line_id: CartLineId) -> Result<Option<CartLineRecord>>;

    /// Lists a customer's lines, oldest first.
    async fn list_cart_lines(&self, customer_id: CustomerId) -> Result<Vec<CartLineRecord>>;

    /// Inserts a line, or updates the quantity of the existing line for the
    /// same (customer, variant) pair. Returns the stored line.
    async fn save_cart_line(&self, line: CartLineRecord) -> Result<CartLineRecord>;

    /// Adds `line.quantity` onto the customer's existing line for the same
    /// variant in a single step, clamping the sum to `cap`. Inserts `line`
    /// as-is when there is no such line. Returns the stored line.
    async fn merge_cart_line(&self, line: CartLineRecord, cap: u32) -> Result<CartLineRecord>;

    /// Deletes the given lines if they belong to the customer.
    ///
    /// Returns the number of lines deleted.
    async fn delete_cart_lines(&self, customer_id: CustomerId, line_ids: &[CartLineId])
    -> Result<u64>;

    // -- Orders --

    /// Commits a checkout as a single transaction.
    ///
    /// See [`OrderPlacement`] for what is written. Fails with
    /// `InsufficientStock` if any variant cannot cover its item, and with
    /// `Conflict` if a captured price is stale or a consumed cart line is
    /// already gone; in both cases nothing is written.
    async fn commit_order(&self, placement: OrderPlacement) -> Result<()>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<StoredOrder>>;

    /// Lists a customer's orders, newest first.
    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<StoredOrder>>;

    /// Lists every order, newest first.
    async fn list_orders(&self) -> Result<Vec<StoredOrder>>;

    /// Applies guarded item status changes as a single transaction.
    ///
    /// Each item must currently be in its transition's `from` status or the
    /// whole call fails with `Conflict`. Items moving into a stock-releasing
    /// status return their quantity to their variant in the same
    /// transaction. Returns the order as it stands after the commit.
    async fn apply_item_transitions(
        &self,
        order_id: OrderId,
        transitions: Vec<ItemTransition>,
    ) -> Result<StoredOrder>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait CommerceStoreExt: CommerceStore {
    /// Loads a variant, failing with `NotFound` if it does not exist.
    async fn require_variant(&self, variant_id: VariantId) -> Result<VariantRecord> {
        self.get_variant(variant_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Variant", variant_id))
    }

    /// Loads an order, failing with `NotFound` if it does not exist.
    async fn require_order(&self, order_id: OrderId) -> Result<StoredOrder> {
        self.get_order(order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", order_id))
    }
}

// Blanket implementation for all CommerceStore implementations
impl<T: CommerceStore + ?Sized> CommerceStoreExt for T {}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{CartLineId, CustomerId, Money, OrderId, ProductId, VariantId};
use tokio::sync::RwLock;

use crate::{
    CartLineRecord, ItemTransition, OrderItemRecord, OrderPlacement, OrderRecord, ProductRecord,
    Result, StoreError, StoredOrder, VariantRecord, store::CommerceStore,
};

#[derive(Debug, Default)]
struct Tables {
    products: Vec<ProductRecord>,
    variants: HashMap<VariantId, VariantRecord>,
    cart_lines: Vec<CartLineRecord>,
    orders: Vec<OrderRecord>,
    order_items: HashMap<OrderId, Vec<OrderItemRecord>>,
}

impl Tables {
    fn assemble(&self, order: &OrderRecord) -> StoredOrder {
        StoredOrder {
            order: order.clone(),
            items: self.order_items.get(&order.id).cloned().unwrap_or_default(),
        }
    }
}

fn stock_overflow(variant_id: VariantId, quantity: u32) -> StoreError {
    StoreError::Conflict(format!(
        "adding {quantity} units would push variant {variant_id} past {}",
        u32::MAX
    ))
}

/// In-memory store implementation.
///
/// Every write takes the single write lock, and multi-row operations
/// validate the whole change before applying any of it, so a failed call
/// leaves no trace. Used by tests and by the server when no database is
/// configured.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `commit_order` fail as if the database went away,
    /// after all of its checks have passed.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the total number of order items stored.
    pub async fn order_item_count(&self) -> usize {
        self.tables
            .read()
            .await
            .order_items
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn insert_product(
        &self,
        product: ProductRecord,
        variants: Vec<VariantRecord>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables.products.iter().any(|p| p.id == product.id) {
            return Err(StoreError::Conflict(format!(
                "product {} already exists",
                product.id
            )));
        }
        if let Some(v) = variants.iter().find(|v| tables.variants.contains_key(&v.id)) {
            return Err(StoreError::Conflict(format!(
                "variant {} already exists",
                v.id
            )));
        }

        tables.products.push(product);
        for variant in variants {
            tables.variants.insert(variant.id, variant);
        }
        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<ProductRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.products.iter().find(|p| p.id == product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<ProductRecord>> {
        Ok(self.tables.read().await.products.clone())
    }

    async fn list_variants(&self, product_id: ProductId) -> Result<Vec<VariantRecord>> {
        let tables = self.tables.read().await;
        let mut variants: Vec<_> = tables
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect();
        variants.sort_by(|a, b| (&a.dimension, &a.value).cmp(&(&b.dimension, &b.value)));
        Ok(variants)
    }

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<VariantRecord>> {
        Ok(self.tables.read().await.variants.get(&variant_id).cloned())
    }

    async fn reserve_stock(&self, variant_id: VariantId, quantity: u32) -> Result<VariantRecord> {
        let mut tables = self.tables.write().await;
        let variant = tables
            .variants
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::not_found("Variant", variant_id))?;

        if variant.stock_quantity < quantity {
            return Err(StoreError::InsufficientStock {
                variant_id,
                requested: quantity,
                available: variant.stock_quantity,
            });
        }
        variant.stock_quantity -= quantity;
        Ok(variant.clone())
    }

    async fn release_stock(&self, variant_id: VariantId, quantity: u32) -> Result<VariantRecord> {
        let mut tables = self.tables.write().await;
        let variant = tables
            .variants
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::not_found("Variant", variant_id))?;

        variant.stock_quantity = variant
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| stock_overflow(variant_id, quantity))?;
        Ok(variant.clone())
    }

    async fn update_variant_price(
        &self,
        variant_id: VariantId,
        marked_price: Money,
        selling_price: Money,
    ) -> Result<VariantRecord> {
        let mut tables = self.tables.write().await;
        let variant = tables
            .variants
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::not_found("Variant", variant_id))?;

        variant.marked_price = marked_price;
        variant.selling_price = selling_price;
        Ok(variant.clone())
    }

    async fn get_cart_line(&self, line_id: CartLineId) -> Result<Option<CartLineRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.cart_lines.iter().find(|l| l.id == line_id).cloned())
    }

    async fn list_cart_lines(&self, customer_id: CustomerId) -> Result<Vec<CartLineRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cart_lines
            .iter()
            .filter(|l| l.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn save_cart_line(&self, line: CartLineRecord) -> Result<CartLineRecord> {
        let mut tables = self.tables.write().await;

        // (customer, variant) is unique: an existing line absorbs the write
        if let Some(existing) = tables
            .cart_lines
            .iter_mut()
            .find(|l| l.customer_id == line.customer_id && l.variant_id == line.variant_id)
        {
            existing.quantity = line.quantity;
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        tables.cart_lines.push(line.clone());
        Ok(line)
    }

    async fn merge_cart_line(&self, line: CartLineRecord, cap: u32) -> Result<CartLineRecord> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .cart_lines
            .iter_mut()
            .find(|l| l.customer_id == line.customer_id && l.variant_id == line.variant_id)
        {
            existing.quantity = existing.quantity.saturating_add(line.quantity).min(cap);
            existing.updated_at = line.updated_at;
            return Ok(existing.clone());
        }

        tables.cart_lines.push(line.clone());
        Ok(line)
    }

    async fn delete_cart_lines(
        &self,
        customer_id: CustomerId,
        line_ids: &[CartLineId],
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.cart_lines.len();
        tables
            .cart_lines
            .retain(|l| !(l.customer_id == customer_id && line_ids.contains(&l.id)));
        Ok((before - tables.cart_lines.len()) as u64)
    }

    async fn commit_order(&self, placement: OrderPlacement) -> Result<()> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let customer_id = placement.order.customer_id;

        // Validate everything first; nothing below the checks can fail.
        let mut demand: HashMap<VariantId, u32> = HashMap::new();
        for item in &placement.items {
            let variant = tables
                .variants
                .get(&item.variant_id)
                .ok_or_else(|| StoreError::not_found("Variant", item.variant_id))?;

            if variant.selling_price != item.unit_price {
                return Err(StoreError::Conflict(format!(
                    "price of variant {} changed during checkout",
                    item.variant_id
                )));
            }

            let already = demand.get(&item.variant_id).copied().unwrap_or(0);
            let available = variant.stock_quantity.saturating_sub(already);
            if item.quantity > available {
                return Err(StoreError::InsufficientStock {
                    variant_id: item.variant_id,
                    requested: item.quantity,
                    available,
                });
            }
            demand.insert(item.variant_id, already + item.quantity);
        }

        for line_id in &placement.consumed_lines {
            let owned = tables
                .cart_lines
                .iter()
                .any(|l| l.id == *line_id && l.customer_id == customer_id);
            if !owned {
                return Err(StoreError::Conflict(format!(
                    "cart line {line_id} was consumed concurrently"
                )));
            }
        }

        if self.fail_on_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }

        for (variant_id, quantity) in demand {
            if let Some(variant) = tables.variants.get_mut(&variant_id) {
                variant.stock_quantity -= quantity;
            }
        }
        tables
            .cart_lines
            .retain(|l| !placement.consumed_lines.contains(&l.id));
        tables
            .order_items
            .insert(placement.order.id, placement.items);
        tables.orders.push(placement.order);

        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<StoredOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| tables.assemble(o)))
    }

    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<StoredOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .rev()
            .filter(|o| o.customer_id == customer_id)
            .map(|o| tables.assemble(o))
            .collect())
    }

    async fn list_orders(&self) -> Result<Vec<StoredOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .rev()
            .map(|o| tables.assemble(o))
            .collect())
    }

    async fn apply_item_transitions(
        &self,
        order_id: OrderId,
        transitions: Vec<ItemTransition>,
    ) -> Result<StoredOrder> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        let order = tables
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Order", order_id))?;
        let items = tables
            .order_items
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("Order", order_id))?;

        let mut seen = HashSet::new();
        for transition in &transitions {
            if !seen.insert(transition.item_id) {
                return Err(StoreError::Conflict(format!(
                    "item {} appears twice in one transition",
                    transition.item_id
                )));
            }
            let item = items
                .iter()
                .find(|i| i.id == transition.item_id)
                .ok_or_else(|| StoreError::not_found("OrderItem", transition.item_id))?;
            if item.status != transition.from {
                return Err(StoreError::Conflict(format!(
                    "item {} is {} but expected {}",
                    item.id, item.status, transition.from
                )));
            }
        }

        let mut releases: HashMap<VariantId, u32> = HashMap::new();
        for transition in transitions.iter().filter(|t| t.to.releases_stock()) {
            if let Some(item) = items.iter().find(|i| i.id == transition.item_id) {
                let pending = releases.entry(item.variant_id).or_default();
                *pending = pending
                    .checked_add(item.quantity)
                    .ok_or_else(|| stock_overflow(item.variant_id, item.quantity))?;
            }
        }
        for (&variant_id, &quantity) in &releases {
            let stock = tables.variants.get(&variant_id).map_or(0, |v| v.stock_quantity);
            if stock.checked_add(quantity).is_none() {
                return Err(stock_overflow(variant_id, quantity));
            }
        }

        for transition in &transitions {
            if let Some(item) = items.iter_mut().find(|i| i.id == transition.item_id) {
                item.status = transition.to;
            }
        }

        for (variant_id, quantity) in releases {
            match tables.variants.get_mut(&variant_id) {
                Some(variant) => variant.stock_quantity += quantity,
                None => {
                    tracing::warn!(%variant_id, quantity, "variant gone, released stock dropped");
                }
            }
        }

        Ok(tables.assemble(&order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ItemStatus, OrderItemId, PaymentMethod, ShippingAddress};

    fn variant(stock: u32, price: i64) -> VariantRecord {
        VariantRecord {
            id: VariantId::new(),
            product_id: ProductId::new(),
            dimension: "Size".to_string(),
            value: "M".to_string(),
            marked_price: Money::from_minor(price),
            selling_price: Money::from_minor(price),
            stock_quantity: stock,
        }
    }

    async fn seeded(variants: &[VariantRecord]) -> InMemoryStore {
        let store = InMemoryStore::new();
        let product = ProductRecord {
            id: ProductId::new(),
            name: "Shirt".to_string(),
            brand: "Acme".to_string(),
            category: "Apparel".to_string(),
            description: String::new(),
            created_at: Utc::now(),
        };
        store
            .insert_product(product, variants.to_vec())
            .await
            .unwrap();
        store
    }

    fn placement(customer_id: CustomerId, items: &[(&VariantRecord, u32)]) -> OrderPlacement {
        let order_id = OrderId::new();
        let items: Vec<_> = items
            .iter()
            .map(|(v, qty)| OrderItemRecord {
                id: OrderItemId::new(),
                order_id,
                product_id: v.product_id,
                variant_id: v.id,
                product_name: "Shirt".to_string(),
                variant_label: v.label(),
                unit_price: v.selling_price,
                quantity: *qty,
                status: ItemStatus::Pending,
            })
            .collect();
        OrderPlacement {
            order: OrderRecord {
                id: order_id,
                customer_id,
                shipping_address: ShippingAddress {
                    country: "NP".to_string(),
                    region: "Bagmati".to_string(),
                    district: "Lalitpur".to_string(),
                    street: "Jhamsikhel".to_string(),
                    landmark: None,
                },
                payment_method: PaymentMethod::CashOnDelivery,
                payment_reference: None,
                total_amount: items.iter().map(OrderItemRecord::subtotal).sum(),
                created_at: Utc::now(),
            },
            items,
            consumed_lines: vec![],
        }
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let v = variant(5, 100);
        let store = seeded(std::slice::from_ref(&v)).await;

        let after = store.reserve_stock(v.id, 3).await.unwrap();
        assert_eq!(after.stock_quantity, 2);

        let err = store.reserve_stock(v.id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock { requested: 3, available: 2, .. }
        ));

        let after = store.release_stock(v.id, 3).await.unwrap();
        assert_eq!(after.stock_quantity, 5);
    }

    #[tokio::test]
    async fn test_reserve_unknown_variant_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.reserve_stock(VariantId::new(), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "Variant", .. }));
    }

    #[tokio::test]
    async fn test_save_cart_line_merges_on_customer_and_variant() {
        let v = variant(5, 100);
        let store = seeded(std::slice::from_ref(&v)).await;
        let customer_id = CustomerId::new();

        let line = CartLineRecord {
            id: CartLineId::new(),
            customer_id,
            product_id: v.product_id,
            variant_id: v.id,
            quantity: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let first = store.save_cart_line(line.clone()).await.unwrap();

        let again = CartLineRecord {
            id: CartLineId::new(),
            quantity: 4,
            ..line
        };
        let second = store.save_cart_line(again).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.quantity, 4);
        assert_eq!(store.list_cart_lines(customer_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_merge_cart_line_adds_and_clamps() {
        let v = variant(5, 100);
        let store = seeded(std::slice::from_ref(&v)).await;
        let customer_id = CustomerId::new();
        let line = |quantity| CartLineRecord {
            id: CartLineId::new(),
            customer_id,
            product_id: v.product_id,
            variant_id: v.id,
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let first = store.merge_cart_line(line(2), 5).await.unwrap();
        assert_eq!(first.quantity, 2);

        let merged = store.merge_cart_line(line(2), 5).await.unwrap();
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.quantity, 4);

        let clamped = store.merge_cart_line(line(3), 5).await.unwrap();
        assert_eq!(clamped.quantity, 5);
        assert_eq!(store.list_cart_lines(customer_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_release_past_u32_max_is_rejected() {
        let v = variant(u32::MAX - 1, 100);
        let store = seeded(std::slice::from_ref(&v)).await;

        let err = store.release_stock(v.id, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(
            store.get_variant(v.id).await.unwrap().unwrap().stock_quantity,
            u32::MAX - 1
        );

        let after = store.release_stock(v.id, 1).await.unwrap();
        assert_eq!(after.stock_quantity, u32::MAX);
    }

    #[tokio::test]
    async fn test_overflowing_release_rolls_back_the_transition() {
        let v = variant(10, 100);
        let store = seeded(std::slice::from_ref(&v)).await;
        let p = placement(CustomerId::new(), &[(&v, 3)]);
        let order_id = p.order.id;
        let item_id = p.items[0].id;
        store.commit_order(p).await.unwrap();
        store.release_stock(v.id, u32::MAX - 7).await.unwrap();

        let cancel = ItemTransition {
            item_id,
            from: ItemStatus::Pending,
            to: ItemStatus::Cancelled,
        };
        let err = store
            .apply_item_transitions(order_id, vec![cancel])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.items[0].status, ItemStatus::Pending);
        assert_eq!(
            store.get_variant(v.id).await.unwrap().unwrap().stock_quantity,
            u32::MAX
        );
    }

    #[tokio::test]
    async fn test_commit_order_is_all_or_nothing() {
        let plenty = variant(10, 100);
        let scarce = variant(1, 200);
        let store = seeded(&[plenty.clone(), scarce.clone()]).await;

        let err = store
            .commit_order(placement(CustomerId::new(), &[(&plenty, 4), (&scarce, 2)]))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.order_item_count().await, 0);
        let plenty_now = store.get_variant(plenty.id).await.unwrap().unwrap();
        assert_eq!(plenty_now.stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_commit_order_rejects_stale_price() {
        let v = variant(10, 100);
        let store = seeded(std::slice::from_ref(&v)).await;
        store
            .update_variant_price(v.id, Money::from_minor(150), Money::from_minor(150))
            .await
            .unwrap();

        let err = store
            .commit_order(placement(CustomerId::new(), &[(&v, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get_variant(v.id).await.unwrap().unwrap().stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_leaves_no_trace() {
        let v = variant(10, 100);
        let store = seeded(std::slice::from_ref(&v)).await;
        store.set_fail_on_commit(true);

        let err = store
            .commit_order(placement(CustomerId::new(), &[(&v, 2)]))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Database(_)));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.get_variant(v.id).await.unwrap().unwrap().stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_transition_releases_stock_once() {
        let v = variant(10, 100);
        let store = seeded(std::slice::from_ref(&v)).await;
        let p = placement(CustomerId::new(), &[(&v, 3)]);
        let order_id = p.order.id;
        let item_id = p.items[0].id;
        store.commit_order(p).await.unwrap();
        assert_eq!(store.get_variant(v.id).await.unwrap().unwrap().stock_quantity, 7);

        let cancel = ItemTransition {
            item_id,
            from: ItemStatus::Pending,
            to: ItemStatus::Cancelled,
        };
        let order = store
            .apply_item_transitions(order_id, vec![cancel])
            .await
            .unwrap();
        assert_eq!(order.items[0].status, ItemStatus::Cancelled);
        assert_eq!(store.get_variant(v.id).await.unwrap().unwrap().stock_quantity, 10);

        // The guard no longer matches, so the second attempt changes nothing
        let err = store
            .apply_item_transitions(order_id, vec![cancel])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get_variant(v.id).await.unwrap().unwrap().stock_quantity, 10);
    }

    #[tokio::test]
    async fn test_orders_listed_newest_first() {
        let v = variant(10, 100);
        let store = seeded(std::slice::from_ref(&v)).await;
        let customer_id = CustomerId::new();

        let first = placement(customer_id, &[(&v, 1)]);
        let second = placement(customer_id, &[(&v, 1)]);
        let (first_id, second_id) = (first.order.id, second.order.id);
        store.commit_order(first).await.unwrap();
        store.commit_order(second).await.unwrap();
        store
            .commit_order(placement(CustomerId::new(), &[(&v, 1)]))
            .await
            .unwrap();

        let mine = store.list_orders_for_customer(customer_id).await.unwrap();
        let ids: Vec<_> = mine.iter().map(|o| o.order.id).collect();
        assert_eq!(ids, vec![second_id, first_id]);
        assert_eq!(store.list_orders().await.unwrap().len(), 3);
    }
}

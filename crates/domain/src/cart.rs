//! Cart Service: the pre-purchase staging area, one per customer.

use std::collections::HashSet;

use chrono::Utc;
use common::{CartLineId, CustomerId, ProductId, VariantId};
use serde::{Deserialize, Serialize};
use store::{CartLineRecord, CommerceStore, CommerceStoreExt};

use crate::error::DomainError;

/// Per-line quantity cap used when none is configured.
pub const DEFAULT_MAX_LINE_QUANTITY: u32 = 10;

/// Limits applied to cart mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartPolicy {
    pub max_line_quantity: u32,
}

impl Default for CartPolicy {
    fn default() -> Self {
        Self {
            max_line_quantity: DEFAULT_MAX_LINE_QUANTITY,
        }
    }
}

/// Lines picked for checkout.
#[derive(Debug, Default)]
pub(crate) struct Selection {
    pub lines: Vec<CartLineRecord>,
    /// Requested ids that resolved to someone else's lines.
    pub foreign: Vec<CartLineId>,
}

/// Service over cart lines.
#[derive(Clone)]
pub struct CartService<S: CommerceStore> {
    store: S,
    policy: CartPolicy,
}

impl<S: CommerceStore> CartService<S> {
    pub fn new(store: S, policy: CartPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CartPolicy {
        self.policy
    }

    fn check_bounds(&self, quantity: u32) -> Result<(), DomainError> {
        if quantity == 0 || quantity > self.policy.max_line_quantity {
            return Err(DomainError::InvalidQuantity {
                quantity,
                max: self.policy.max_line_quantity,
            });
        }
        Ok(())
    }

    async fn owned_line(
        &self,
        customer_id: CustomerId,
        line_id: CartLineId,
    ) -> Result<CartLineRecord, DomainError> {
        let line = self
            .store
            .get_cart_line(line_id)
            .await?
            .ok_or_else(|| DomainError::not_found("CartLine", line_id))?;
        if line.customer_id != customer_id {
            return Err(DomainError::Unauthorized(
                "cart line belongs to another customer".to_string(),
            ));
        }
        Ok(line)
    }

    /// Adds a variant to the cart, merging into an existing line for the
    /// same variant. The merged quantity is clamped to the per-line cap and
    /// the current stock.
    #[tracing::instrument(skip(self))]
    pub async fn add_or_merge(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<CartLineRecord, DomainError> {
        self.check_bounds(quantity)?;

        let variant = self.store.require_variant(variant_id).await?;
        if variant.product_id != product_id {
            return Err(DomainError::Validation(format!(
                "variant {variant_id} does not belong to product {product_id}"
            )));
        }
        if quantity > variant.stock_quantity {
            tracing::debug!(stock = variant.stock_quantity, "Add rejected, not enough stock");
            return Err(DomainError::OutOfStock {
                variant_id,
                requested: quantity,
                available: variant.stock_quantity,
            });
        }

        let ceiling = self.policy.max_line_quantity.min(variant.stock_quantity);
        let now = Utc::now();
        let line = CartLineRecord {
            id: CartLineId::new(),
            customer_id,
            product_id,
            variant_id,
            quantity,
            created_at: now,
            updated_at: now,
        };

        let saved = self.store.merge_cart_line(line, ceiling).await?;
        metrics::counter!("cart_mutations_total", "op" => "add").increment(1);
        Ok(saved)
    }

    /// Replaces a line's quantity.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        customer_id: CustomerId,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLineRecord, DomainError> {
        let mut line = self.owned_line(customer_id, line_id).await?;
        self.check_bounds(quantity)?;

        let variant = self.store.require_variant(line.variant_id).await?;
        if quantity > variant.stock_quantity {
            return Err(DomainError::InvalidQuantity {
                quantity,
                max: self.policy.max_line_quantity.min(variant.stock_quantity),
            });
        }

        line.quantity = quantity;
        line.updated_at = Utc::now();
        let saved = self.store.save_cart_line(line).await?;
        metrics::counter!("cart_mutations_total", "op" => "set_quantity").increment(1);
        Ok(saved)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(
        &self,
        customer_id: CustomerId,
        line_id: CartLineId,
    ) -> Result<(), DomainError> {
        self.owned_line(customer_id, line_id).await?;
        self.store.delete_cart_lines(customer_id, &[line_id]).await?;
        metrics::counter!("cart_mutations_total", "op" => "remove").increment(1);
        Ok(())
    }

    /// Removes several lines. Ids that no longer exist are skipped; if any id
    /// belongs to another customer nothing is removed.
    #[tracing::instrument(skip(self, line_ids), fields(count = line_ids.len()))]
    pub async fn remove_many(
        &self,
        customer_id: CustomerId,
        line_ids: &[CartLineId],
    ) -> Result<u64, DomainError> {
        let selection = self.select(customer_id, line_ids).await?;
        if !selection.foreign.is_empty() {
            return Err(DomainError::Unauthorized(
                "cart line belongs to another customer".to_string(),
            ));
        }

        let ids: Vec<CartLineId> = selection.lines.iter().map(|line| line.id).collect();
        let removed = self.store.delete_cart_lines(customer_id, &ids).await?;
        metrics::counter!("cart_mutations_total", "op" => "remove").increment(removed);
        Ok(removed)
    }

    /// All of the customer's lines, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, customer_id: CustomerId) -> Result<Vec<CartLineRecord>, DomainError> {
        Ok(self.store.list_cart_lines(customer_id).await?)
    }

    /// The customer's lines among `line_ids`, in request order, without
    /// duplicates. Unknown ids and other customers' lines do not resolve.
    #[tracing::instrument(skip(self, line_ids), fields(count = line_ids.len()))]
    pub async fn list_selected(
        &self,
        customer_id: CustomerId,
        line_ids: &[CartLineId],
    ) -> Result<Vec<CartLineRecord>, DomainError> {
        Ok(self.select(customer_id, line_ids).await?.lines)
    }

    pub(crate) async fn select(
        &self,
        customer_id: CustomerId,
        line_ids: &[CartLineId],
    ) -> Result<Selection, DomainError> {
        let mut seen = HashSet::with_capacity(line_ids.len());
        let mut selection = Selection::default();

        for &line_id in line_ids {
            if !seen.insert(line_id) {
                continue;
            }
            match self.store.get_cart_line(line_id).await? {
                Some(line) if line.customer_id == customer_id => selection.lines.push(line),
                Some(_) => selection.foreign.push(line_id),
                None => {}
            }
        }
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use store::{InMemoryStore, ProductRecord, VariantRecord};

    async fn seed(store: &InMemoryStore, stock: u32) -> VariantRecord {
        let product = ProductRecord {
            id: ProductId::new(),
            name: "Canvas Tote".to_string(),
            brand: "Loom".to_string(),
            category: "Bags".to_string(),
            description: String::new(),
            created_at: Utc::now(),
        };
        let variant = VariantRecord {
            id: VariantId::new(),
            product_id: product.id,
            dimension: "Color".to_string(),
            value: "Sand".to_string(),
            marked_price: Money::from_minor(1200),
            selling_price: Money::from_minor(1000),
            stock_quantity: stock,
        };
        store
            .insert_product(product, vec![variant.clone()])
            .await
            .unwrap();
        variant
    }

    fn service(store: &InMemoryStore) -> CartService<InMemoryStore> {
        CartService::new(store.clone(), CartPolicy::default())
    }

    #[tokio::test]
    async fn test_repeated_adds_merge_into_one_line() {
        let store = InMemoryStore::new();
        let variant = seed(&store, 20).await;
        let cart = service(&store);
        let customer = CustomerId::new();

        cart.add_or_merge(customer, variant.product_id, variant.id, 3)
            .await
            .unwrap();
        let line = cart
            .add_or_merge(customer, variant.product_id, variant.id, 4)
            .await
            .unwrap();

        assert_eq!(line.quantity, 7);
        assert_eq!(cart.list(customer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_merge_is_clamped_to_cap_and_stock() {
        let store = InMemoryStore::new();
        let cart = service(&store);
        let customer = CustomerId::new();

        let plenty = seed(&store, 50).await;
        cart.add_or_merge(customer, plenty.product_id, plenty.id, 8)
            .await
            .unwrap();
        let line = cart
            .add_or_merge(customer, plenty.product_id, plenty.id, 8)
            .await
            .unwrap();
        assert_eq!(line.quantity, DEFAULT_MAX_LINE_QUANTITY);

        let scarce = seed(&store, 6).await;
        cart.add_or_merge(customer, scarce.product_id, scarce.id, 4)
            .await
            .unwrap();
        let line = cart
            .add_or_merge(customer, scarce.product_id, scarce.id, 4)
            .await
            .unwrap();
        assert_eq!(line.quantity, 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_all_count() {
        let store = InMemoryStore::new();
        let variant = seed(&store, 50).await;
        let (product_id, variant_id) = (variant.product_id, variant.id);
        let cart = service(&store);
        let customer = CustomerId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cart = cart.clone();
                tokio::spawn(async move {
                    cart.add_or_merge(customer, product_id, variant_id, 1).await
                })
            })
            .collect();
        for outcome in futures_util::future::join_all(handles).await {
            outcome.unwrap().unwrap();
        }

        let lines = cart.list(customer).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 8);
    }

    #[tokio::test]
    async fn test_add_bounds() {
        let store = InMemoryStore::new();
        let variant = seed(&store, 2).await;
        let cart = service(&store);
        let customer = CustomerId::new();

        let result = cart
            .add_or_merge(customer, variant.product_id, variant.id, 0)
            .await;
        assert!(matches!(result, Err(DomainError::InvalidQuantity { .. })));

        let result = cart
            .add_or_merge(customer, variant.product_id, variant.id, 11)
            .await;
        assert!(matches!(result, Err(DomainError::InvalidQuantity { max: 10, .. })));

        let result = cart
            .add_or_merge(customer, variant.product_id, variant.id, 3)
            .await;
        assert!(matches!(
            result,
            Err(DomainError::OutOfStock { available: 2, .. })
        ));

        let result = cart
            .add_or_merge(customer, ProductId::new(), variant.id, 1)
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_set_quantity_checks_owner_and_bounds() {
        let store = InMemoryStore::new();
        let variant = seed(&store, 4).await;
        let cart = service(&store);
        let customer = CustomerId::new();
        let line = cart
            .add_or_merge(customer, variant.product_id, variant.id, 1)
            .await
            .unwrap();

        let result = cart.set_quantity(CustomerId::new(), line.id, 2).await;
        assert!(matches!(result, Err(DomainError::Unauthorized(_))));

        let result = cart.set_quantity(customer, line.id, 5).await;
        assert!(matches!(
            result,
            Err(DomainError::InvalidQuantity { quantity: 5, max: 4 })
        ));

        let updated = cart.set_quantity(customer, line.id, 4).await.unwrap();
        assert_eq!(updated.quantity, 4);
    }

    #[tokio::test]
    async fn test_remove_many_is_all_or_nothing_on_ownership() {
        let store = InMemoryStore::new();
        let first = seed(&store, 5).await;
        let second = seed(&store, 5).await;
        let cart = service(&store);
        let alice = CustomerId::new();
        let bob = CustomerId::new();

        let a1 = cart
            .add_or_merge(alice, first.product_id, first.id, 1)
            .await
            .unwrap();
        let a2 = cart
            .add_or_merge(alice, second.product_id, second.id, 1)
            .await
            .unwrap();
        let b1 = cart
            .add_or_merge(bob, first.product_id, first.id, 1)
            .await
            .unwrap();

        let result = cart.remove_many(alice, &[a1.id, b1.id]).await;
        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
        assert_eq!(cart.list(alice).await.unwrap().len(), 2);

        let removed = cart
            .remove_many(alice, &[a1.id, a2.id, CartLineId::new()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(cart.list(alice).await.unwrap().is_empty());
        assert_eq!(cart.list(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_selected_keeps_request_order_and_skips_foreign() {
        let store = InMemoryStore::new();
        let first = seed(&store, 5).await;
        let second = seed(&store, 5).await;
        let cart = service(&store);
        let alice = CustomerId::new();
        let bob = CustomerId::new();

        let a1 = cart
            .add_or_merge(alice, first.product_id, first.id, 1)
            .await
            .unwrap();
        let a2 = cart
            .add_or_merge(alice, second.product_id, second.id, 2)
            .await
            .unwrap();
        let b1 = cart
            .add_or_merge(bob, first.product_id, first.id, 1)
            .await
            .unwrap();

        let selected = cart
            .list_selected(alice, &[a2.id, b1.id, a1.id, a2.id])
            .await
            .unwrap();
        let ids: Vec<CartLineId> = selected.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![a2.id, a1.id]);
    }

    #[tokio::test]
    async fn test_remove_single_line() {
        let store = InMemoryStore::new();
        let variant = seed(&store, 5).await;
        let cart = service(&store);
        let customer = CustomerId::new();
        let line = cart
            .add_or_merge(customer, variant.product_id, variant.id, 1)
            .await
            .unwrap();

        assert!(matches!(
            cart.remove(CustomerId::new(), line.id).await,
            Err(DomainError::Unauthorized(_))
        ));
        cart.remove(customer, line.id).await.unwrap();
        assert!(matches!(
            cart.remove(customer, line.id).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}

//! Order Engine: the only writer of orders and the transaction boundary
//! for checkout.

use std::time::Instant;

use chrono::Utc;
use common::{
    CartLineId, CustomerId, ItemStatus, Money, OrderId, OrderItemId, PaymentMethod,
    ShippingAddress,
};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, CommerceStoreExt, OrderItemRecord, OrderPlacement, OrderRecord};

use super::OrderView;
use crate::caller::Caller;
use crate::cart::CartService;
use crate::error::DomainError;

/// A checkout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer_id: CustomerId,
    pub line_ids: Vec<CartLineId>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Service turning selected cart lines into orders.
#[derive(Clone)]
pub struct OrderEngine<S: CommerceStore> {
    store: S,
    cart: CartService<S>,
}

impl<S: CommerceStore> OrderEngine<S> {
    pub fn new(store: S, cart: CartService<S>) -> Self {
        Self { store, cart }
    }

    /// Places an order from the customer's selected cart lines.
    ///
    /// Reserving stock for every line, writing the order and its items, and
    /// consuming the cart lines happen in one store transaction: if any line
    /// cannot be covered the call fails with `InsufficientStock` and no stock,
    /// order or cart row changes.
    #[tracing::instrument(
        skip(self, cmd),
        fields(customer_id = %cmd.customer_id, lines = cmd.line_ids.len())
    )]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<OrderView, DomainError> {
        let start = Instant::now();
        let result = self.checkout(cmd).await;

        match &result {
            Ok(view) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::counter!("stock_reserved_units_total").increment(
                    view.items.iter().map(|item| u64::from(item.quantity)).sum(),
                );
                metrics::histogram!("checkout_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %view.order.id,
                    total = %view.order.total_amount,
                    "Order placed"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.code()).increment(1);
                tracing::debug!(error = %e, "Checkout rejected");
            }
        }
        result
    }

    async fn checkout(&self, cmd: PlaceOrder) -> Result<OrderView, DomainError> {
        if let Some(field) = cmd.shipping_address.first_missing_field() {
            return Err(DomainError::Validation(format!(
                "shipping address is missing {field}"
            )));
        }
        let payment_reference = cmd
            .payment_reference
            .filter(|reference| !reference.trim().is_empty());
        if cmd.payment_method.requires_reference() && payment_reference.is_none() {
            return Err(DomainError::Validation(format!(
                "payment method {} requires a payment reference",
                cmd.payment_method
            )));
        }

        let selection = self.cart.select(cmd.customer_id, &cmd.line_ids).await?;
        if !selection.foreign.is_empty() {
            return Err(DomainError::Unauthorized(
                "cart line belongs to another customer".to_string(),
            ));
        }
        if selection.lines.is_empty() {
            return Err(DomainError::EmptyCheckout);
        }

        let order_id = OrderId::new();
        let mut items = Vec::with_capacity(selection.lines.len());
        let mut total = Money::zero();

        for line in &selection.lines {
            let variant = self.store.require_variant(line.variant_id).await?;
            let product = self
                .store
                .get_product(variant.product_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Product", variant.product_id))?;

            let unit_price = variant.selling_price;
            let subtotal = unit_price
                .checked_mul(line.quantity)
                .ok_or_else(|| DomainError::Validation("order amount overflows".to_string()))?;
            total = total
                .checked_add(subtotal)
                .ok_or_else(|| DomainError::Validation("order amount overflows".to_string()))?;

            items.push(OrderItemRecord {
                id: OrderItemId::new(),
                order_id,
                product_id: product.id,
                variant_id: variant.id,
                variant_label: variant.label(),
                product_name: product.name,
                unit_price,
                quantity: line.quantity,
                status: ItemStatus::Pending,
            });
        }

        let order = OrderRecord {
            id: order_id,
            customer_id: cmd.customer_id,
            shipping_address: cmd.shipping_address,
            payment_method: cmd.payment_method,
            payment_reference,
            total_amount: total,
            created_at: Utc::now(),
        };
        let consumed_lines = selection.lines.iter().map(|line| line.id).collect();

        self.store
            .commit_order(OrderPlacement {
                order: order.clone(),
                items: items.clone(),
                consumed_lines,
            })
            .await?;

        Ok(store::StoredOrder { order, items }.into())
    }

    /// Loads an order visible to the caller.
    #[tracing::instrument(skip(self, caller))]
    pub async fn get_order(
        &self,
        caller: &Caller,
        order_id: OrderId,
    ) -> Result<OrderView, DomainError> {
        let stored = self.store.require_order(order_id).await?;
        caller.ensure_owner_or_admin(stored.order.customer_id)?;
        Ok(stored.into())
    }

    /// The customer's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderView>, DomainError> {
        let orders = self.store.list_orders_for_customer(customer_id).await?;
        Ok(orders.into_iter().map(OrderView::from).collect())
    }

    /// Every order, newest first. Admin only.
    #[tracing::instrument(skip(self, caller))]
    pub async fn list_all_orders(&self, caller: &Caller) -> Result<Vec<OrderView>, DomainError> {
        caller.ensure_admin()?;
        let orders = self.store.list_orders().await?;
        Ok(orders.into_iter().map(OrderView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartPolicy;
    use common::{ProductId, VariantId};
    use store::{InMemoryStore, ProductRecord, VariantRecord};

    use crate::order::OrderStatus;

    async fn seed(store: &InMemoryStore, price: i64, stock: u32) -> VariantRecord {
        let product = ProductRecord {
            id: ProductId::new(),
            name: "Desk Lamp".to_string(),
            brand: "Lumen".to_string(),
            category: "Lighting".to_string(),
            description: String::new(),
            created_at: Utc::now(),
        };
        let variant = VariantRecord {
            id: VariantId::new(),
            product_id: product.id,
            dimension: "Finish".to_string(),
            value: "Brass".to_string(),
            marked_price: Money::from_minor(price),
            selling_price: Money::from_minor(price),
            stock_quantity: stock,
        };
        store
            .insert_product(product, vec![variant.clone()])
            .await
            .unwrap();
        variant
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            country: "Nepal".to_string(),
            region: "Bagmati".to_string(),
            district: "Lalitpur".to_string(),
            street: "Jhamsikhel".to_string(),
            landmark: None,
        }
    }

    fn engine(store: &InMemoryStore) -> (OrderEngine<InMemoryStore>, CartService<InMemoryStore>) {
        let cart = CartService::new(store.clone(), CartPolicy::default());
        (OrderEngine::new(store.clone(), cart.clone()), cart)
    }

    fn checkout(customer_id: CustomerId, line_ids: Vec<CartLineId>) -> PlaceOrder {
        PlaceOrder {
            customer_id,
            line_ids,
            shipping_address: address(),
            payment_method: PaymentMethod::CashOnDelivery,
            payment_reference: None,
        }
    }

    #[tokio::test]
    async fn test_place_order_captures_prices_and_consumes_lines() {
        let store = InMemoryStore::new();
        let lamp = seed(&store, 4500, 5).await;
        let (engine, cart) = engine(&store);
        let customer = CustomerId::new();
        let line = cart
            .add_or_merge(customer, lamp.product_id, lamp.id, 2)
            .await
            .unwrap();

        let view = engine
            .place_order(checkout(customer, vec![line.id]))
            .await
            .unwrap();

        assert_eq!(view.status, OrderStatus::Pending);
        assert_eq!(view.order.total_amount, Money::from_minor(9000));
        assert_eq!(view.items[0].product_name, "Desk Lamp");
        assert_eq!(view.items[0].variant_label, "Finish: Brass");
        assert_eq!(view.items[0].status, ItemStatus::Pending);
        assert!(cart.list(customer).await.unwrap().is_empty());
        assert_eq!(store.get_variant(lamp.id).await.unwrap().unwrap().stock_quantity, 3);
    }

    #[tokio::test]
    async fn test_nothing_selected_is_empty_checkout() {
        let store = InMemoryStore::new();
        let (engine, _) = engine(&store);

        let result = engine
            .place_order(checkout(CustomerId::new(), vec![CartLineId::new()]))
            .await;
        assert!(matches!(result, Err(DomainError::EmptyCheckout)));
    }

    #[tokio::test]
    async fn test_foreign_lines_are_unauthorized() {
        let store = InMemoryStore::new();
        let lamp = seed(&store, 100, 5).await;
        let (engine, cart) = engine(&store);
        let owner = CustomerId::new();
        let line = cart
            .add_or_merge(owner, lamp.product_id, lamp.id, 1)
            .await
            .unwrap();

        let result = engine
            .place_order(checkout(CustomerId::new(), vec![line.id]))
            .await;
        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_checkout_validates_address_and_payment() {
        let store = InMemoryStore::new();
        let (engine, _) = engine(&store);
        let customer = CustomerId::new();

        let mut cmd = checkout(customer, vec![]);
        cmd.shipping_address.street = "  ".to_string();
        let result = engine.place_order(cmd).await;
        assert!(matches!(result, Err(DomainError::Validation(msg)) if msg.contains("street")));

        let mut cmd = checkout(customer, vec![]);
        cmd.payment_method = PaymentMethod::Card;
        let result = engine.place_order(cmd).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_order_visibility() {
        let store = InMemoryStore::new();
        let lamp = seed(&store, 100, 5).await;
        let (engine, cart) = engine(&store);
        let owner = CustomerId::new();
        let line = cart
            .add_or_merge(owner, lamp.product_id, lamp.id, 1)
            .await
            .unwrap();
        let view = engine
            .place_order(checkout(owner, vec![line.id]))
            .await
            .unwrap();

        let stranger = Caller::customer(CustomerId::new());
        assert!(matches!(
            engine.get_order(&stranger, view.order.id).await,
            Err(DomainError::Unauthorized(_))
        ));
        assert!(engine.get_order(&Caller::customer(owner), view.order.id).await.is_ok());
        assert!(engine.get_order(&Caller::admin(CustomerId::new()), view.order.id).await.is_ok());

        assert_eq!(engine.list_orders(owner).await.unwrap().len(), 1);
        assert!(engine.list_all_orders(&stranger).await.is_err());
        assert_eq!(
            engine
                .list_all_orders(&Caller::admin(CustomerId::new()))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}

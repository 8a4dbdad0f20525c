//! Row types for the five relational tables.

use chrono::{DateTime, Utc};
use common::{
    CartLineId, CustomerId, ItemStatus, Money, OrderId, OrderItemId, PaymentMethod, ProductId,
    ShippingAddress, VariantId,
};
use serde::{Deserialize, Serialize};

/// A catalog product. Descriptive fields only; price and stock live on variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A purchasable variant of a product with its own price and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub id: VariantId,
    pub product_id: ProductId,
    /// Variant dimension, e.g. "Size".
    pub dimension: String,
    /// Variant value, e.g. "XL".
    pub value: String,
    pub marked_price: Money,
    /// Always `<= marked_price`.
    pub selling_price: Money,
    pub stock_quantity: u32,
}

impl VariantRecord {
    /// Human-readable label captured onto order items, e.g. "Size: XL".
    pub fn label(&self) -> String {
        format!("{}: {}", self.dimension, self.value)
    }
}

/// One (customer, variant, quantity) staging record prior to purchase.
///
/// At most one line exists per (customer, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineRecord {
    pub id: CartLineId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order header. Carries no status column: order status is derived from
/// its items on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    /// Sum of item subtotals at capture time. Never recomputed.
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

/// A price-snapshotted purchase record for one variant within one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// Soft reference; the product may since have changed or been removed.
    pub product_id: ProductId,
    /// Soft reference; see `product_id`.
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_label: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub status: ItemStatus,
}

impl OrderItemRecord {
    /// Returns `unit_price * quantity`.
    pub fn subtotal(&self) -> Money {
        Money::from_minor(self.unit_price.minor_units() * i64::from(self.quantity))
    }
}

/// An order header together with all of its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOrder {
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
}

/// Everything checkout writes, committed as one unit.
///
/// The store reserves `quantity` units of every item's variant, verifying
/// the variant still sells at the captured `unit_price`, inserts the order
/// and its items, and deletes `consumed_lines` belonging to the customer.
/// Either all of it happens or none of it does.
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
    pub consumed_lines: Vec<CartLineId>,
}

/// A guarded status change for one order item.
///
/// The write only succeeds if the item is still in `from`; when `to`
/// releases stock, the item's quantity goes back to its variant in the
/// same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemTransition {
    pub item_id: OrderItemId,
    pub from: ItemStatus,
    pub to: ItemStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_label() {
        let variant = VariantRecord {
            id: VariantId::new(),
            product_id: ProductId::new(),
            dimension: "Size".to_string(),
            value: "XL".to_string(),
            marked_price: Money::from_minor(2000),
            selling_price: Money::from_minor(1500),
            stock_quantity: 3,
        };
        assert_eq!(variant.label(), "Size: XL");
    }

    #[test]
    fn test_item_subtotal() {
        let item = OrderItemRecord {
            id: OrderItemId::new(),
            order_id: OrderId::new(),
            product_id: ProductId::new(),
            variant_id: VariantId::new(),
            product_name: "Kurta".to_string(),
            variant_label: "Size: M".to_string(),
            unit_price: Money::from_minor(1250),
            quantity: 3,
            status: ItemStatus::Pending,
        };
        assert_eq!(item.subtotal(), Money::from_minor(3750));
    }
}

//! Catalog Store service: product and variant data, and the only path by
//! which stock quantities change outside of checkout and cancellation.

use chrono::Utc;
use common::{Money, ProductId, VariantId};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, CommerceStoreExt, ProductRecord, VariantRecord};

use crate::caller::Caller;
use crate::error::DomainError;

/// Input for one variant of a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    pub dimension: String,
    pub value: String,
    pub marked_price: Money,
    pub selling_price: Money,
    #[serde(default)]
    pub stock_quantity: u32,
}

/// Input for creating a product together with its variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub variants: Vec<NewVariant>,
}

/// A product with its current variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: ProductRecord,
    pub variants: Vec<VariantRecord>,
}

fn validate_prices(marked: Money, selling: Money) -> Result<(), DomainError> {
    if marked.is_negative() || selling.is_negative() {
        return Err(DomainError::Validation(
            "prices must not be negative".to_string(),
        ));
    }
    if selling > marked {
        return Err(DomainError::Validation(format!(
            "selling price {selling} exceeds marked price {marked}"
        )));
    }
    Ok(())
}

/// Service over products and variants.
#[derive(Clone)]
pub struct CatalogService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a product with at least one variant. Admin only.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        caller: &Caller,
        input: NewProduct,
    ) -> Result<ProductView, DomainError> {
        caller.ensure_admin()?;

        if input.name.trim().is_empty() {
            return Err(DomainError::Validation(
                "product name must not be empty".to_string(),
            ));
        }
        if input.variants.is_empty() {
            return Err(DomainError::Validation(
                "a product needs at least one variant".to_string(),
            ));
        }
        for variant in &input.variants {
            validate_prices(variant.marked_price, variant.selling_price)?;
        }

        let product = ProductRecord {
            id: ProductId::new(),
            name: input.name,
            brand: input.brand,
            category: input.category,
            description: input.description,
            created_at: Utc::now(),
        };
        let variants: Vec<VariantRecord> = input
            .variants
            .into_iter()
            .map(|v| VariantRecord {
                id: VariantId::new(),
                product_id: product.id,
                dimension: v.dimension,
                value: v.value,
                marked_price: v.marked_price,
                selling_price: v.selling_price,
                stock_quantity: v.stock_quantity,
            })
            .collect();

        self.store
            .insert_product(product.clone(), variants.clone())
            .await?;

        tracing::info!(product_id = %product.id, variants = variants.len(), "Product created");
        Ok(ProductView { product, variants })
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<ProductView, DomainError> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id))?;
        let variants = self.store.list_variants(product_id).await?;
        Ok(ProductView { product, variants })
    }

    /// Lists every product with its variants, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductView>, DomainError> {
        let products = self.store.list_products().await?;
        let mut views = Vec::with_capacity(products.len());
        for product in products {
            let variants = self.store.list_variants(product.id).await?;
            views.push(ProductView { product, variants });
        }
        Ok(views)
    }

    /// Returns the current price and stock snapshot of a variant.
    #[tracing::instrument(skip(self))]
    pub async fn get_variant(&self, variant_id: VariantId) -> Result<VariantRecord, DomainError> {
        Ok(self.store.require_variant(variant_id).await?)
    }

    /// Atomically checks and decrements stock.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_stock(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<VariantRecord, DomainError> {
        if quantity == 0 {
            return Err(DomainError::Validation(
                "reservation quantity must be at least 1".to_string(),
            ));
        }
        let variant = self.store.reserve_stock(variant_id, quantity).await?;
        metrics::counter!("stock_reserved_units_total").increment(u64::from(quantity));
        Ok(variant)
    }

    /// Returns units to stock. Callers release each cancelled unit once.
    #[tracing::instrument(skip(self))]
    pub async fn release_stock(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<VariantRecord, DomainError> {
        if quantity == 0 {
            return Err(DomainError::Validation(
                "release quantity must be at least 1".to_string(),
            ));
        }
        let variant = self.store.release_stock(variant_id, quantity).await?;
        metrics::counter!("stock_released_units_total").increment(u64::from(quantity));
        Ok(variant)
    }

    /// Administrative stock increment.
    #[tracing::instrument(skip(self, caller))]
    pub async fn restock(
        &self,
        caller: &Caller,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<VariantRecord, DomainError> {
        caller.ensure_admin()?;
        if quantity == 0 {
            return Err(DomainError::Validation(
                "restock quantity must be at least 1".to_string(),
            ));
        }
        let variant = self.store.release_stock(variant_id, quantity).await?;
        tracing::info!(stock = variant.stock_quantity, "Variant restocked");
        Ok(variant)
    }

    /// Administrative price change. Orders already placed keep their
    /// captured prices.
    #[tracing::instrument(skip(self, caller))]
    pub async fn set_price(
        &self,
        caller: &Caller,
        variant_id: VariantId,
        marked_price: Money,
        selling_price: Money,
    ) -> Result<VariantRecord, DomainError> {
        caller.ensure_admin()?;
        validate_prices(marked_price, selling_price)?;
        let variant = self
            .store
            .update_variant_price(variant_id, marked_price, selling_price)
            .await?;
        tracing::info!(%selling_price, "Variant repriced");
        Ok(variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CustomerId;
    use store::InMemoryStore;

    fn admin() -> Caller {
        Caller::admin(CustomerId::new())
    }

    fn tee(stock: u32) -> NewProduct {
        NewProduct {
            name: "Linen Tee".to_string(),
            brand: "Loom".to_string(),
            category: "Shirts".to_string(),
            description: "Breathable".to_string(),
            variants: vec![NewVariant {
                dimension: "Size".to_string(),
                value: "M".to_string(),
                marked_price: Money::from_minor(2500),
                selling_price: Money::from_minor(1999),
                stock_quantity: stock,
            }],
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_product() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let created = catalog.create_product(&admin(), tee(4)).await.unwrap();

        let fetched = catalog.get_product(created.product.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(catalog.list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_product_requires_admin() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let result = catalog
            .create_product(&Caller::customer(CustomerId::new()), tee(1))
            .await;
        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_create_product_rejects_selling_above_marked() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let mut input = tee(1);
        input.variants[0].selling_price = Money::from_minor(3000);
        let result = catalog.create_product(&admin(), input).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let mut input = tee(1);
        input.variants.clear();
        let result = catalog.create_product(&admin(), input).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let variant_id = catalog.create_product(&admin(), tee(3)).await.unwrap().variants[0].id;

        let after = catalog.reserve_stock(variant_id, 2).await.unwrap();
        assert_eq!(after.stock_quantity, 1);

        let result = catalog.reserve_stock(variant_id, 2).await;
        assert!(matches!(
            result,
            Err(DomainError::InsufficientStock { available: 1, .. })
        ));
        assert_eq!(catalog.get_variant(variant_id).await.unwrap().stock_quantity, 1);

        let after = catalog.release_stock(variant_id, 2).await.unwrap();
        assert_eq!(after.stock_quantity, 3);
    }

    #[tokio::test]
    async fn test_missing_variant_is_not_found() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let result = catalog.get_variant(VariantId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_restock_and_set_price() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let variant_id = catalog.create_product(&admin(), tee(0)).await.unwrap().variants[0].id;

        let restocked = catalog.restock(&admin(), variant_id, 5).await.unwrap();
        assert_eq!(restocked.stock_quantity, 5);

        let repriced = catalog
            .set_price(&admin(), variant_id, Money::from_minor(3000), Money::from_minor(2800))
            .await
            .unwrap();
        assert_eq!(repriced.selling_price, Money::from_minor(2800));

        let result = catalog
            .set_price(&admin(), variant_id, Money::from_minor(100), Money::from_minor(200))
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let result = catalog
            .restock(&Caller::customer(CustomerId::new()), variant_id, 1)
            .await;
        assert!(matches!(result, Err(DomainError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_restock_past_u32_max_is_a_conflict() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let variant_id = catalog
            .create_product(&admin(), tee(u32::MAX - 3))
            .await
            .unwrap()
            .variants[0]
            .id;

        let result = catalog.restock(&admin(), variant_id, 4).await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(
            catalog.get_variant(variant_id).await.unwrap().stock_quantity,
            u32::MAX - 3
        );
    }
}

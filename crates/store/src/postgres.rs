use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    CartLineId, CustomerId, ItemStatus, Money, OrderId, OrderItemId, PaymentMethod, ProductId,
    ShippingAddress, VariantId,
};
use sqlx::{
    PgConnection, PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    CartLineRecord, ItemTransition, OrderItemRecord, OrderPlacement, OrderRecord, ProductRecord,
    Result, StoreError, StoredOrder, VariantRecord, store::CommerceStore,
};

const VARIANT_COLUMNS: &str =
    "id, product_id, dimension, value, marked_price, selling_price, stock_quantity";
const CART_LINE_COLUMNS: &str =
    "id, customer_id, product_id, variant_id, quantity, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, customer_id, ship_country, ship_region, ship_district, \
     ship_street, ship_landmark, payment_method, payment_reference, total_amount, created_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, product_name, \
     variant_label, unit_price, quantity, status";

/// Largest stock a variant may hold; the column is wider than `u32`.
const MAX_STOCK: i64 = u32::MAX as i64;

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<ProductRecord> {
        Ok(ProductRecord {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            brand: row.try_get("brand")?,
            category: row.try_get("category")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_variant(row: PgRow) -> Result<VariantRecord> {
        Ok(VariantRecord {
            id: VariantId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            dimension: row.try_get("dimension")?,
            value: row.try_get("value")?,
            marked_price: Money::from_minor(row.try_get("marked_price")?),
            selling_price: Money::from_minor(row.try_get("selling_price")?),
            stock_quantity: quantity_from_db(row.try_get("stock_quantity")?, "stock_quantity")?,
        })
    }

    fn row_to_cart_line(row: PgRow) -> Result<CartLineRecord> {
        Ok(CartLineRecord {
            id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            quantity: quantity_from_db(row.try_get("quantity")?, "quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        let method: String = row.try_get("payment_method")?;
        let payment_method = PaymentMethod::from_db(&method)
            .ok_or_else(|| StoreError::Decode(format!("unknown payment method: {method}")))?;

        Ok(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            shipping_address: ShippingAddress {
                country: row.try_get("ship_country")?,
                region: row.try_get("ship_region")?,
                district: row.try_get("ship_district")?,
                street: row.try_get("ship_street")?,
                landmark: row.try_get("ship_landmark")?,
            },
            payment_method,
            payment_reference: row.try_get("payment_reference")?,
            total_amount: Money::from_minor(row.try_get("total_amount")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order_item(row: PgRow) -> Result<OrderItemRecord> {
        let status: String = row.try_get("status")?;
        let status: ItemStatus = status
            .parse()
            .map_err(|e: common::ParseStatusError| StoreError::Decode(e.to_string()))?;

        Ok(OrderItemRecord {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            product_name: row.try_get("product_name")?,
            variant_label: row.try_get("variant_label")?,
            unit_price: Money::from_minor(row.try_get("unit_price")?),
            quantity: quantity_from_db(row.try_get("quantity")?, "quantity")?,
            status,
        })
    }

    /// Explains why a conditional decrement matched no row.
    async fn stock_shortfall(
        conn: &mut PgConnection,
        variant_id: VariantId,
        requested: u32,
    ) -> Result<StoreError> {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM variants WHERE id = $1")
                .bind(variant_id.as_uuid())
                .fetch_optional(conn)
                .await?;

        Ok(match available {
            Some(available) => StoreError::InsufficientStock {
                variant_id,
                requested,
                available: quantity_from_db(available, "stock_quantity")?,
            },
            None => StoreError::not_found("Variant", variant_id),
        })
    }

    fn stock_overflow(variant_id: VariantId, quantity: i64) -> StoreError {
        StoreError::Conflict(format!(
            "adding {quantity} units would push variant {variant_id} past {MAX_STOCK}"
        ))
    }

    /// Attaches items to already-loaded order headers, keeping header order.
    async fn attach_items(
        conn: &mut PgConnection,
        orders: Vec<OrderRecord>,
    ) -> Result<Vec<StoredOrder>> {
        if orders.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position"
        ))
        .bind(&ids)
        .fetch_all(conn)
        .await?;

        let mut items_by_order: HashMap<OrderId, Vec<OrderItemRecord>> = HashMap::new();
        for row in rows {
            let item = Self::row_to_order_item(row)?;
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| StoredOrder {
                items: items_by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    async fn load_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Option<StoredOrder>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order = Self::row_to_order(row)?;
        Ok(Self::attach_items(conn, vec![order]).await?.pop())
    }
}

fn quantity_from_db(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} out of range: {value}")))
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn insert_product(
        &self,
        product: ProductRecord,
        variants: Vec<VariantRecord>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, brand, category, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(&product.description)
        .bind(product.created_at)
        .execute(&mut *tx)
        .await?;

        for variant in &variants {
            sqlx::query(
                r#"
                INSERT INTO variants (id, product_id, dimension, value, marked_price, selling_price, stock_quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(variant.id.as_uuid())
            .bind(variant.product_id.as_uuid())
            .bind(&variant.dimension)
            .bind(&variant.value)
            .bind(variant.marked_price.minor_units())
            .bind(variant.selling_price.minor_units())
            .bind(i64::from(variant.stock_quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query(
            "SELECT id, name, brand, category, description, created_at FROM products WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<ProductRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, brand, category, description, created_at FROM products ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn list_variants(&self, product_id: ProductId) -> Result<Vec<VariantRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE product_id = $1 ORDER BY dimension, value"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_variant).collect()
    }

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<VariantRecord>> {
        let row = sqlx::query(&format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = $1"))
            .bind(variant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_variant).transpose()
    }

    async fn reserve_stock(&self, variant_id: VariantId, quantity: u32) -> Result<VariantRecord> {
        let mut conn = self.pool.acquire().await?;

        // Check and decrement in one statement; never read-then-write.
        let row = sqlx::query(&format!(
            r#"
            UPDATE variants SET stock_quantity = stock_quantity - $2
            WHERE id = $1 AND stock_quantity >= $2
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(variant_id.as_uuid())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Self::row_to_variant(row),
            None => Err(Self::stock_shortfall(&mut conn, variant_id, quantity).await?),
        }
    }

    async fn release_stock(&self, variant_id: VariantId, quantity: u32) -> Result<VariantRecord> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE variants SET stock_quantity = stock_quantity + $2
            WHERE id = $1 AND stock_quantity + $2 <= $3
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(variant_id.as_uuid())
        .bind(i64::from(quantity))
        .bind(MAX_STOCK)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            return Self::row_to_variant(row);
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM variants WHERE id = $1")
                .bind(variant_id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?;
        Err(match exists {
            Some(_) => Self::stock_overflow(variant_id, i64::from(quantity)),
            None => StoreError::not_found("Variant", variant_id),
        })
    }

    async fn update_variant_price(
        &self,
        variant_id: VariantId,
        marked_price: Money,
        selling_price: Money,
    ) -> Result<VariantRecord> {
        let row = sqlx::query(&format!(
            "UPDATE variants SET marked_price = $2, selling_price = $3 WHERE id = $1 RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(variant_id.as_uuid())
        .bind(marked_price.minor_units())
        .bind(selling_price.minor_units())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_variant)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("Variant", variant_id))
    }

    async fn get_cart_line(&self, line_id: CartLineId) -> Result<Option<CartLineRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE id = $1"
        ))
        .bind(line_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_cart_line).transpose()
    }

    async fn list_cart_lines(&self, customer_id: CustomerId) -> Result<Vec<CartLineRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_LINE_COLUMNS} FROM cart_lines WHERE customer_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_cart_line).collect()
    }

    async fn save_cart_line(&self, line: CartLineRecord) -> Result<CartLineRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO cart_lines (id, customer_id, product_id, variant_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (customer_id, variant_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                updated_at = EXCLUDED.updated_at
            RETURNING {CART_LINE_COLUMNS}
            "#
        ))
        .bind(line.id.as_uuid())
        .bind(line.customer_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(line.variant_id.as_uuid())
        .bind(i64::from(line.quantity))
        .bind(line.created_at)
        .bind(line.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_cart_line(row)
    }

    async fn merge_cart_line(&self, line: CartLineRecord, cap: u32) -> Result<CartLineRecord> {
        // The sum is computed against the locked row, not a value read earlier.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO cart_lines (id, customer_id, product_id, variant_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (customer_id, variant_id) DO UPDATE SET
                quantity = LEAST(cart_lines.quantity + EXCLUDED.quantity, $8),
                updated_at = EXCLUDED.updated_at
            RETURNING {CART_LINE_COLUMNS}
            "#
        ))
        .bind(line.id.as_uuid())
        .bind(line.customer_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(line.variant_id.as_uuid())
        .bind(i64::from(line.quantity))
        .bind(line.created_at)
        .bind(line.updated_at)
        .bind(i64::from(cap))
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_cart_line(row)
    }

    async fn delete_cart_lines(
        &self,
        customer_id: CustomerId,
        line_ids: &[CartLineId],
    ) -> Result<u64> {
        let ids: Vec<Uuid> = line_ids.iter().map(CartLineId::as_uuid).collect();
        let result = sqlx::query("DELETE FROM cart_lines WHERE customer_id = $1 AND id = ANY($2)")
            .bind(customer_id.as_uuid())
            .bind(&ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit_order(&self, placement: OrderPlacement) -> Result<()> {
        let order = &placement.order;

        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        // Lock variant rows in one global order so two checkouts over the
        // same variants queue behind each other instead of deadlocking.
        let mut reservations: Vec<&OrderItemRecord> = placement.items.iter().collect();
        reservations.sort_by_key(|item| item.variant_id.as_uuid());

        for item in reservations {
            let selling_price: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE variants SET stock_quantity = stock_quantity - $2
                WHERE id = $1 AND stock_quantity >= $2
                RETURNING selling_price
                "#,
            )
            .bind(item.variant_id.as_uuid())
            .bind(i64::from(item.quantity))
            .fetch_optional(&mut *tx)
            .await?;

            match selling_price {
                Some(price) if Money::from_minor(price) == item.unit_price => {}
                Some(_) => {
                    return Err(StoreError::Conflict(format!(
                        "price of variant {} changed during checkout",
                        item.variant_id
                    )));
                }
                None => {
                    return Err(
                        Self::stock_shortfall(&mut tx, item.variant_id, item.quantity).await?,
                    );
                }
            }
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, ship_country, ship_region, ship_district, ship_street,
                                ship_landmark, payment_method, payment_reference, total_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(&order.shipping_address.country)
        .bind(&order.shipping_address.region)
        .bind(&order.shipping_address.district)
        .bind(&order.shipping_address.street)
        .bind(&order.shipping_address.landmark)
        .bind(order.payment_method.as_str())
        .bind(&order.payment_reference)
        .bind(order.total_amount.minor_units())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in placement.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, variant_id, product_name,
                                         variant_label, unit_price, quantity, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(item.product_id.as_uuid())
            .bind(item.variant_id.as_uuid())
            .bind(&item.product_name)
            .bind(&item.variant_label)
            .bind(item.unit_price.minor_units())
            .bind(i64::from(item.quantity))
            .bind(item.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let ids: Vec<Uuid> = placement
            .consumed_lines
            .iter()
            .map(CartLineId::as_uuid)
            .collect();
        let deleted = sqlx::query("DELETE FROM cart_lines WHERE customer_id = $1 AND id = ANY($2)")
            .bind(order.customer_id.as_uuid())
            .bind(&ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // A concurrent checkout of the same lines committed first.
        if deleted != ids.len() as u64 {
            return Err(StoreError::Conflict(
                "cart lines were consumed concurrently".to_string(),
            ));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<StoredOrder>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_order(&mut conn, order_id).await
    }

    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<StoredOrder>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        let orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Self::attach_items(&mut conn, orders).await
    }

    async fn list_orders(&self) -> Result<Vec<StoredOrder>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&mut *conn)
        .await?;

        let orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Self::attach_items(&mut conn, orders).await
    }

    async fn apply_item_transitions(
        &self,
        order_id: OrderId,
        transitions: Vec<ItemTransition>,
    ) -> Result<StoredOrder> {
        let mut tx = self.pool.begin().await?;

        let mut releases: Vec<(Uuid, i64)> = Vec::new();
        for transition in &transitions {
            // Compare-and-swap on the status so a release can only happen once.
            let row = sqlx::query(
                r#"
                UPDATE order_items SET status = $3
                WHERE id = $1 AND order_id = $2 AND status = $4
                RETURNING variant_id, quantity
                "#,
            )
            .bind(transition.item_id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(transition.to.as_str())
            .bind(transition.from.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                return Err(StoreError::Conflict(format!(
                    "item {} is no longer {}",
                    transition.item_id, transition.from
                )));
            };

            if transition.to.releases_stock() {
                releases.push((row.try_get("variant_id")?, row.try_get("quantity")?));
            }
        }

        // Same lock order as checkout.
        releases.sort_unstable();
        for (variant_id, quantity) in releases {
            let restocked: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE variants SET stock_quantity = stock_quantity + $2
                WHERE id = $1 AND stock_quantity + $2 <= $3
                RETURNING stock_quantity
                "#,
            )
            .bind(variant_id)
            .bind(quantity)
            .bind(MAX_STOCK)
            .fetch_optional(&mut *tx)
            .await?;

            if restocked.is_none() {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT stock_quantity FROM variants WHERE id = $1")
                        .bind(variant_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                match exists {
                    Some(_) => {
                        let variant_id = VariantId::from_uuid(variant_id);
                        return Err(Self::stock_overflow(variant_id, quantity));
                    }
                    None => {
                        tracing::warn!(%variant_id, quantity, "variant gone, released stock dropped");
                    }
                }
            }
        }

        let order = Self::load_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", order_id))?;

        tx.commit().await?;
        Ok(order)
    }
}

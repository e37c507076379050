use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, Page, PageRequest, ProductId, UserId};
use domain::{Money, Order, OrderItem, OrderStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OrderStore, Result, StoreError};

const ORDER_COLUMNS: &str = "id, user_id, status, total_amount, currency, shipping_address, \
     billing_address, notes, payment_id, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, quantity, unit_price, subtotal, created_at, updated_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a pool of at most `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status =
            OrderStatus::parse(&status).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            status,
            total_amount: Money::new(row.try_get::<Decimal, _>("total_amount")?),
            currency: row.try_get("currency")?,
            shipping_address: row.try_get("shipping_address")?,
            billing_address: row.try_get("billing_address")?,
            notes: row.try_get("notes")?,
            payment_id: row.try_get("payment_id")?,
            items: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::Corrupt(format!("negative item quantity {quantity}")))?;

        Ok(OrderItem {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity,
            unit_price: Money::new(row.try_get::<Decimal, _>("unit_price")?),
            subtotal: Money::new(row.try_get::<Decimal, _>("subtotal")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Loads the items of several orders, grouped by order and kept in
    /// insertion order.
    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position ASC"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = Self::row_to_item(row)?;
            grouped.entry(item.order_id.as_uuid()).or_default().push(item);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_amount, currency, shipping_address,
                                billing_address, notes, payment_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_str())
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(&order.currency)
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .bind(&order.notes)
        .bind(&order.payment_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(order.id);
            }
            StoreError::Database(e)
        })?;

        for (position, item) in order.items.iter().enumerate() {
            let quantity = i32::try_from(item.quantity)
                .map_err(|_| StoreError::Corrupt(format!("quantity {} too large", item.quantity)))?;

            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, subtotal,
                                         position, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(quantity)
            .bind(item.unit_price.amount())
            .bind(item.subtotal.amount())
            .bind(position as i32)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("order_store_writes_total", "op" => "create").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = Self::row_to_order(&row)?;
        let mut items = self.load_items(&[order_id.as_uuid()]).await?;
        order.items = items.remove(&order_id.as_uuid()).unwrap_or_default();
        Ok(Some(order))
    }

    #[tracing::instrument(skip(self))]
    async fn list_by_user(&self, user_id: &UserId, page: PageRequest) -> Result<Page<Order>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id.as_str())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        if !ids.is_empty() {
            let mut items = self.load_items(&ids).await?;
            for order in &mut orders {
                order.items = items.remove(&order.id.as_uuid()).unwrap_or_default();
            }
        }

        Ok(Page::new(orders, page, total.max(0) as u64))
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn update(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, total_amount = $3, currency = $4, shipping_address = $5,
                billing_address = $6, notes = $7, payment_id = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(&order.currency)
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .bind(&order.notes)
        .bind(&order.payment_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(order.id));
        }
        metrics::counter!("order_store_writes_total", "op" => "update").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(order_id));
        }
        metrics::counter!("order_store_writes_total", "op" => "update_status").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, order_id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(order_id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

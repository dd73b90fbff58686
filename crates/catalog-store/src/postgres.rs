use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow};

use crate::{
    CatalogStore, CustomerId, NewProduct, OrderId, OrderProduct, Product, ProductDetails,
    ProductId, Result, StockTransaction, StoreError,
};

const PRODUCT_COLUMNS: &str =
    "id, name, stock, price, description, color, created_at, updated_at";

/// PostgreSQL-backed catalog store implementation.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    /// Creates a new PostgreSQL catalog store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("catalog migrations applied");
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let stock: i64 = row.try_get("stock")?;
        let stock = u32::try_from(stock)
            .map_err(|_| StoreError::InvalidRow(format!("stock out of range: {stock}")))?;

        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            stock,
            details: ProductDetails {
                price: row.try_get("price")?,
                description: row.try_get("description")?,
                color: row.try_get("color")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Maps constraint violations on insert to their store-level meaning.
fn map_write_error(e: sqlx::Error, entity: &'static str, id: i64) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::Duplicate { entity, id };
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::ForeignKey(db_err.message().to_string());
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, stock, price, description, color)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(i64::from(product.stock))
        .bind(product.details.price)
        .bind(&product.details.description)
        .bind(&product.details.color)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn replace_product(
        &self,
        id: ProductId,
        product: NewProduct,
    ) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $2, stock = $3, price = $4, description = $5, color = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(&product.name)
        .bind(i64::from(product.stock))
        .bind(product.details.price)
        .bind(&product.details.description)
        .bind(&product.details.color)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "DELETE FROM products WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn products_for_order(&self, order_id: OrderId) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.stock, p.price, p.description, p.color, p.created_at, p.updated_at
            FROM order_products op
            JOIN products p ON p.id = op.product_id
            WHERE op.order_id = $1
            ORDER BY op.id ASC
            "#,
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn insert_customer(&self, id: CustomerId) -> Result<()> {
        sqlx::query("INSERT INTO customers (id) VALUES ($1)")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "customer", id.as_i64()))?;
        Ok(())
    }

    async fn upsert_customer(&self, id: CustomerId) -> Result<()> {
        sqlx::query("INSERT INTO customers (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn customer_exists(&self, id: CustomerId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1)")
                .bind(id.as_i64())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn upsert_order(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("INSERT INTO orders (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_order(&self, id: OrderId) -> Result<u64> {
        // order_products rows go with the stub (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn order_exists(&self, id: OrderId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
            .bind(id.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn order_products(&self, order_id: OrderId) -> Result<Vec<OrderProduct>> {
        let rows = sqlx::query(
            "SELECT order_id, product_id FROM order_products WHERE order_id = $1 ORDER BY id ASC",
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderProduct::new(
                    OrderId::new(row.try_get("order_id")?),
                    ProductId::new(row.try_get("product_id")?),
                ))
            })
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn StockTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStockTransaction { tx }))
    }
}

/// A PostgreSQL transaction scoped to one stock reservation.
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
pub struct PgStockTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PgStockTransaction {
    async fn decrement_stock(&mut self, product_id: ProductId) -> Result<bool> {
        // Single conditional write: the row is checked and updated atomically.
        let result = sqlx::query(
            "UPDATE products SET stock = stock - 1, updated_at = NOW() WHERE id = $1 AND stock > 0",
        )
        .bind(product_id.as_i64())
        .execute(&mut *self.tx)
        .await?;

        let decremented = result.rows_affected() == 1;
        tracing::debug!(product_id = %product_id, decremented, "conditional stock decrement");
        Ok(decremented)
    }

    async fn insert_order_products(&mut self, rows: &[OrderProduct]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO order_products (order_id, product_id) ");
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.order_id.as_i64())
                .push_bind(row.product_id.as_i64());
        });

        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, "order_product", first.order_id.as_i64()))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;
use tracing::debug;

use stocky_core::domain::product::{Product, ProductId};

use crate::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no product with id {id} exists")]
    NotFound { id: ProductId },
    #[error("adjustment would drive stock negative (current stock is {current})")]
    InvalidAdjustment { current: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Guarded access to the persistent product inventory.
///
/// Substring matching is ASCII-case-insensitive, which is SQLite's `LIKE`
/// default; the in-memory implementation mirrors that policy so tests observe
/// the same search results.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Every product whose name contains `fragment`. An empty fragment
    /// matches all rows; no match is an empty list, not an error.
    async fn find_by_name_substring(&self, fragment: &str) -> Result<Vec<Product>, StoreError>;

    /// Every product with `stock < threshold`, ascending by stock, ties
    /// broken by id. A threshold of zero or less yields an empty list.
    async fn list_below_threshold(&self, threshold: i64) -> Result<Vec<Product>, StoreError>;

    /// Apply `delta` to the product's stock. Fails with `NotFound` or, when
    /// the result would be negative or overflow, `InvalidAdjustment` — in
    /// both cases nothing is written. On success exactly one durable write
    /// happens and the updated row is returned.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product, StoreError>;
}

#[async_trait]
impl<T: ProductStore + ?Sized> ProductStore for &T {
    async fn find_by_name_substring(&self, fragment: &str) -> Result<Vec<Product>, StoreError> {
        (**self).find_by_name_substring(fragment).await
    }

    async fn list_below_threshold(&self, threshold: i64) -> Result<Vec<Product>, StoreError> {
        (**self).list_below_threshold(threshold).await
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product, StoreError> {
        (**self).adjust_stock(id, delta).await
    }
}

#[async_trait]
impl<T: ProductStore + ?Sized> ProductStore for std::sync::Arc<T> {
    async fn find_by_name_substring(&self, fragment: &str) -> Result<Vec<Product>, StoreError> {
        (**self).find_by_name_substring(fragment).await
    }

    async fn list_below_threshold(&self, threshold: i64) -> Result<Vec<Product>, StoreError> {
        (**self).list_below_threshold(threshold).await
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product, StoreError> {
        (**self).adjust_stock(id, delta).await
    }
}

/// Stock after applying `delta`, or `InvalidAdjustment` when the result
/// would be negative or overflow i64. Either way a rejected delta leaves
/// the row untouched.
fn guarded_new_stock(current: i64, delta: i64) -> Result<i64, StoreError> {
    match current.checked_add(delta) {
        Some(new_stock) if new_stock >= 0 => Ok(new_stock),
        _ => Err(StoreError::InvalidAdjustment { current }),
    }
}

pub struct SqlProductStore {
    pool: DbPool,
}

impl SqlProductStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
    })
}

#[async_trait]
impl ProductStore for SqlProductStore {
    async fn find_by_name_substring(&self, fragment: &str) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, price, stock FROM products \
             WHERE name LIKE '%' || ?1 || '%' ORDER BY id",
        )
        .bind(fragment)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    async fn list_below_threshold(&self, threshold: i64) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, price, stock FROM products \
             WHERE stock < ?1 ORDER BY stock ASC, id ASC",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product, StoreError> {
        // Read-modify-write inside one transaction: concurrent adjustments on
        // the same id are serialized by SQLite's write lock, and a failed
        // guard drops the transaction without touching the row.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, name, price, stock FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound { id });
        };
        let product = product_from_row(&row)?;

        let new_stock = guarded_new_stock(product.stock, delta)?;

        sqlx::query("UPDATE products SET stock = ?1 WHERE id = ?2")
            .bind(new_stock)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(product_id = id, delta, new_stock, "stock adjusted");
        Ok(Product { stock: new_stock, ..product })
    }
}

/// Test double backed by a mutex-guarded vector. Mirrors the SQL store's
/// ordering and matching policies exactly.
#[derive(Default)]
pub struct InMemoryProductStore {
    products: std::sync::Mutex<Vec<Product>>,
}

impl InMemoryProductStore {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products: std::sync::Mutex::new(products) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Product>> {
        self.products.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn find_by_name_substring(&self, fragment: &str) -> Result<Vec<Product>, StoreError> {
        let needle = fragment.to_ascii_lowercase();
        let mut matched: Vec<Product> = self
            .lock()
            .iter()
            .filter(|product| product.name.to_ascii_lowercase().contains(&needle))
            .cloned()
            .collect();
        matched.sort_by_key(|product| product.id);
        Ok(matched)
    }

    async fn list_below_threshold(&self, threshold: i64) -> Result<Vec<Product>, StoreError> {
        let mut matched: Vec<Product> =
            self.lock().iter().filter(|product| product.stock < threshold).cloned().collect();
        matched.sort_by_key(|product| (product.stock, product.id));
        Ok(matched)
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<Product, StoreError> {
        let mut products = self.lock();
        let product = products
            .iter_mut()
            .find(|product| product.id == id)
            .ok_or(StoreError::NotFound { id })?;

        let new_stock = guarded_new_stock(product.stock, delta)?;

        product.stock = new_stock;
        Ok(product.clone())
    }
}

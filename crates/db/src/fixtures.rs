use sqlx::Row;
use thiserror::Error;
use tracing::info;

use stocky_core::domain::product::Product;
use stocky_core::errors::DomainError;

use crate::DbPool;

/// Sample catalog loaded on first boot. Names double as verification labels
/// for the `seed` CLI command.
const SEED_PRODUCTS: &[(&str, f64, i64)] = &[
    ("iPhone 15", 25_990.0, 5),
    ("MacBook Air M3", 34_990.0, 2),
    ("PlayStation 5", 11_990.0, 10),
    ("Xbox Series X", 11_990.0, 1),
    ("AirPods Pro", 6_990.0, 25),
];

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed fixture rejected: {0}")]
    InvalidFixture(#[from] DomainError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct SeedResult {
    pub inserted: usize,
    pub already_populated: bool,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

/// Deterministic product fixtures for the inventory table.
///
/// Loading is write-once: if the table already holds any rows the dataset is
/// left untouched, so a re-run of `stocky seed` never clobbers live stock
/// levels.
pub struct SeedDataset;

impl SeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, SeedError> {
        let count = sqlx::query("SELECT COUNT(*) AS count FROM products")
            .fetch_one(pool)
            .await?
            .get::<i64, _>("count");

        if count > 0 {
            info!(existing_rows = count, "products table already populated, leaving data as-is");
            return Ok(SeedResult { inserted: 0, already_populated: true });
        }

        let mut tx = pool.begin().await?;
        for (ordinal, (name, price, stock)) in SEED_PRODUCTS.iter().enumerate() {
            let candidate = Product {
                id: (ordinal + 1) as i64,
                name: (*name).to_string(),
                price: *price,
                stock: *stock,
            };
            candidate.validate()?;

            sqlx::query("INSERT INTO products (name, price, stock) VALUES (?1, ?2, ?3)")
                .bind(name)
                .bind(price)
                .bind(stock)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(inserted = SEED_PRODUCTS.len(), "seeded products table with sample catalog");
        Ok(SeedResult { inserted: SEED_PRODUCTS.len(), already_populated: false })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, SeedError> {
        let mut checks = Vec::with_capacity(SEED_PRODUCTS.len());

        for (name, _, _) in SEED_PRODUCTS {
            let count = sqlx::query("SELECT COUNT(*) AS count FROM products WHERE name = ?1")
                .bind(name)
                .fetch_one(pool)
                .await?
                .get::<i64, _>("count");
            checks.push((*name, count == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[cfg(test)]
mod tests {
    use super::SeedDataset;
    use crate::{connect_with_settings, migrations, DbPool};
    use sqlx::Row;

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    async fn seed_populates_empty_table() {
        let pool = migrated_pool().await;

        let result = SeedDataset::load(&pool).await.expect("seed");
        assert_eq!(result.inserted, 5);
        assert!(!result.already_populated);

        let verification = SeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present);
    }

    #[tokio::test]
    async fn seed_never_overwrites_existing_rows() {
        let pool = migrated_pool().await;
        SeedDataset::load(&pool).await.expect("first seed");

        sqlx::query("UPDATE products SET stock = 99 WHERE name = 'iPhone 15'")
            .execute(&pool)
            .await
            .expect("mutate live row");

        let second = SeedDataset::load(&pool).await.expect("second seed");
        assert!(second.already_populated);
        assert_eq!(second.inserted, 0);

        let stock = sqlx::query("SELECT stock FROM products WHERE name = 'iPhone 15'")
            .fetch_one(&pool)
            .await
            .expect("fetch")
            .get::<i64, _>("stock");
        assert_eq!(stock, 99, "reseeding must not clobber live stock");
    }

    #[tokio::test]
    async fn verify_reports_missing_rows() {
        let pool = migrated_pool().await;
        SeedDataset::load(&pool).await.expect("seed");

        sqlx::query("DELETE FROM products WHERE name = 'Xbox Series X'")
            .execute(&pool)
            .await
            .expect("delete");

        let verification = SeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let xbox = verification
            .checks
            .iter()
            .find(|(name, _)| *name == "Xbox Series X")
            .expect("xbox check present");
        assert!(!xbox.1);
    }
}

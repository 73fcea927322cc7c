use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Whether the inventory schema has been applied to this database.
pub async fn schema_ready(pool: &DbPool) -> Result<bool, sqlx::Error> {
    use sqlx::Row;

    let count = sqlx::query(
        "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'products'",
    )
    .fetch_one(pool)
    .await?
    .get::<i64, _>("count");

    Ok(count == 1)
}

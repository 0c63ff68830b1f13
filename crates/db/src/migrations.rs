use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of known up migrations not yet applied to the database.
pub async fn pending_count(pool: &DbPool) -> Result<usize, MigrateError> {
    use sqlx::migrate::Migrate;

    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table().await?;
    let applied: std::collections::HashSet<i64> =
        conn.list_applied_migrations().await?.into_iter().map(|applied| applied.version).collect();

    Ok(MIGRATOR
        .iter()
        .filter(|migration| {
            migration.migration_type.is_up_migration() && !applied.contains(&migration.version)
        })
        .count())
}

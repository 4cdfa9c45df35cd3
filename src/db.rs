use crate::config::DatabaseConfig;
use crate::database::Repository;
use crate::database::postgres_repository::PostgresRepository;
use rocket::fairing::AdHoc;
use sqlx::PgPool;
use sqlx::migrate::{Migrate, MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub applied: bool,
}

pub async fn init_pool(db_config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .idle_timeout(Duration::from_secs(db_config.idle_timeout))
        .max_lifetime(Duration::from_secs(db_config.max_lifetime))
        .connect(&db_config.url)
        .await
}

/// Applies every pending migration, each in its own transaction.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

async fn applied_versions(pool: &PgPool) -> Result<Vec<i64>, MigrateError> {
    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table().await?;
    let mut versions: Vec<i64> = conn.list_applied_migrations().await?.into_iter().map(|m| m.version).collect();
    versions.sort_unstable();
    Ok(versions)
}

/// Reverts the `steps` most recently applied migrations and returns their
/// versions, newest first.
pub async fn rollback_migrations(pool: &PgPool, steps: usize) -> Result<Vec<i64>, MigrateError> {
    let mut applied = applied_versions(pool).await?;
    applied.reverse();

    let reverted: Vec<i64> = applied.iter().take(steps).copied().collect();
    if reverted.is_empty() {
        return Ok(reverted);
    }

    let target = applied.get(steps).copied().unwrap_or(0);
    MIGRATOR.undo(pool, target).await?;
    Ok(reverted)
}

pub async fn migration_status(pool: &PgPool) -> Result<Vec<MigrationStatus>, MigrateError> {
    let applied = applied_versions(pool).await?;
    Ok(known_migrations()
        .map(|(version, description)| MigrationStatus {
            version,
            description,
            applied: applied.contains(&version),
        })
        .collect())
}

fn known_migrations() -> impl Iterator<Item = (i64, String)> {
    MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| (m.version, m.description.to_string()))
}

/// Connects the pool, optionally migrates, and manages both the pool and the
/// Postgres-backed repository.
pub fn stage_db(db_config: DatabaseConfig) -> AdHoc {
    AdHoc::try_on_ignite("Postgres (sqlx)", |rocket| async move {
        let pool = match init_pool(&db_config).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!("Failed to initialize database pool: {}", e);
                return Err(rocket);
            }
        };
        tracing::info!("Database pool initialized successfully");

        if db_config.run_migrations {
            if let Err(e) = run_migrations(&pool).await {
                tracing::error!("Failed to run database migrations: {}", e);
                return Err(rocket);
            }
            tracing::info!("Database migrations applied");
        }

        let repository: Arc<dyn Repository> = Arc::new(PostgresRepository { pool: pool.clone() });
        Ok(rocket.manage(pool).manage(repository))
    })
}

use anyhow::{Context, Result};
use sqlx::{Executor, PgPool};
use tracing::info;

/// Schema scripts, applied in order. Each script must be idempotent.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_detection_results.sql",
    include_str!("sql/001_create_detection_results.sql"),
)];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        pool.execute(*sql)
            .await
            .with_context(|| format!("Failed to apply migration {}", name))?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

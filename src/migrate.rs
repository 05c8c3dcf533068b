use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the catalog schema on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per deployed package and stage
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            name TEXT PRIMARY KEY,
            package_name TEXT NOT NULL,
            base_url TEXT NOT NULL,
            stage TEXT NOT NULL,
            function_type TEXT NOT NULL,
            title TEXT,
            version TEXT,
            description TEXT,
            doc_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_endpoints (
            id TEXT PRIMARY KEY,
            base_url TEXT NOT NULL,
            endpoint_path TEXT NOT NULL,
            http_method TEXT NOT NULL,
            bot_project_id TEXT,
            is_public INTEGER NOT NULL,
            stage TEXT NOT NULL,
            doc_text TEXT NOT NULL,
            doc_hash TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL,
            UNIQUE(base_url, endpoint_path, http_method)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_api_endpoints_updated_at ON api_endpoints(updated_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_api_endpoints_project ON api_endpoints(bot_project_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_endpoints_stage ON api_endpoints(stage)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deployments_base_url ON deployments(base_url)")
        .execute(pool)
        .await?;

    Ok(())
}

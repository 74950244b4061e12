use anyhow::Result;
use sqlx::SqlitePool;

/// Create all tables and indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Source registry (written by the administrative side, read by the crawler)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            seed_urls_json TEXT NOT NULL DEFAULT '[]',
            allowed_hosts_json TEXT NOT NULL DEFAULT '[]',
            allowed_prefixes_json TEXT NOT NULL DEFAULT '[]',
            enabled INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // URL frontier, one row per canonical URL
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawl_queue (
            url TEXT PRIMARY KEY,
            source_key TEXT NOT NULL,
            depth INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            fail_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            last_error TEXT,
            http_status INTEGER,
            next_attempt_at INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Archived documents, one row per canonical URL
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            canonical_url TEXT PRIMARY KEY,
            source_key TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            title TEXT,
            content_text TEXT,
            checksum TEXT,
            storage_path TEXT,
            mime_type TEXT,
            fetched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_crawl_queue_eligible ON crawl_queue(status, priority DESC, depth ASC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_crawl_queue_source ON crawl_queue(source_key)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_key)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_checksum ON documents(checksum)")
        .execute(pool)
        .await?;

    Ok(())
}

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::records;
use crate::vector_store::VectorStore;

/// Create the vector store file and, for the local backend, the query table.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let store = VectorStore::open(&config.db.path).await?;
    store.close().await;

    if config.records.backend == "sqlite" {
        let store = records::SqliteRecordStore::open(&config.records.path).await?;
        store.close().await;
    }

    Ok(())
}

pub async fn migrate_vector_store(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            page INTEGER NOT NULL,
            text TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn migrate_records(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queries (
            query_id TEXT PRIMARY KEY,
            create_time INTEGER NOT NULL,
            query_text TEXT NOT NULL,
            answer_text TEXT,
            sources_json TEXT NOT NULL DEFAULT '[]',
            is_complete INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

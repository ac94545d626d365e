//! Embedded vector store: one SQLite file holding chunks and their embeddings.
//!
//! The file is the unit of persistence. It is uploaded wholesale to object
//! storage as a snapshot, and a worker can download it to answer queries.
//! Similarity search is brute-force cosine over every stored vector.

use anyhow::{bail, Result};
use sqlx::sqlite::SqliteJournalMode;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, ScoredChunk};

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open the store at `path`, creating the file and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path, SqliteJournalMode::Delete).await?;
        migrate::migrate_vector_store(&pool).await?;
        Ok(Self { pool })
    }

    /// Delete the store file so the next [`open`](Self::open) starts empty.
    pub fn reset(path: &Path) -> Result<()> {
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut candidate = path.as_os_str().to_owned();
            candidate.push(suffix);
            let candidate = PathBuf::from(candidate);
            if candidate.exists() {
                std::fs::remove_file(&candidate)?;
            }
        }
        Ok(())
    }

    /// Ids of every stored chunk.
    pub async fn existing_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Insert chunks with their vectors. Chunks whose id already exists are
    /// left untouched. Returns the number of rows inserted.
    pub async fn add_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let result = sqlx::query(
                r#"
                INSERT INTO chunks (id, source, page, text, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.page as i64)
            .bind(&chunk.text)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Return the `k` chunks most similar to `query_vec`, best first.
    pub async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query("SELECT id, source, page, text, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let page: i64 = row.get("page");
                ScoredChunk {
                    score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                    chunk: Chunk {
                        id: row.get("id"),
                        source: row.get("source"),
                        page: page as u32,
                        text: row.get("text"),
                    },
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

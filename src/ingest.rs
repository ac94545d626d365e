//! Ingestion pipeline orchestration.
//!
//! Load PDFs page by page, split pages into chunks, give each chunk a stable
//! `source:page:index` id, and embed and store only the chunks whose id is
//! not already in the vector store. Re-running over unchanged sources adds
//! nothing.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

use crate::chunk::split_documents;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::models::Chunk;
use crate::pdf::load_documents;
use crate::vector_store::VectorStore;

/// File name that uploaded PDFs are written to inside the source directory.
pub const UPLOAD_FILE_NAME: &str = "pdf_file.pdf";

/// Counts from one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
    /// Chunks already present in the store before this run.
    pub existing: usize,
    pub added: usize,
}

/// Run the ingestion pipeline. With `reset`, the vector store file is
/// deleted first and every chunk is re-embedded.
pub async fn run_ingest(
    config: &Config,
    embedder: &dyn Embedder,
    reset: bool,
) -> Result<IngestReport> {
    if reset {
        info!(path = %config.db.path.display(), "clearing vector store");
        VectorStore::reset(&config.db.path)?;
    }

    let pages = load_documents(&config.source.dir, &config.source.include_globs)?;
    let chunks = split_documents(
        &pages,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );

    let store = VectorStore::open(&config.db.path).await?;
    let result = add_new_chunks(&store, embedder, &chunks, config.embedding.batch_size).await;
    store.close().await;
    let (existing, added) = result?;

    let report = IngestReport {
        pages: pages.len(),
        chunks: chunks.len(),
        existing,
        added,
    };
    info!(
        pages = report.pages,
        chunks = report.chunks,
        existing = report.existing,
        added = report.added,
        "ingestion complete"
    );
    Ok(report)
}

async fn add_new_chunks(
    store: &VectorStore,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<(usize, usize)> {
    let existing_ids = store.existing_ids().await?;
    info!("Number of existing documents in DB: {}", existing_ids.len());

    let new_chunks = select_new_chunks(chunks, &existing_ids);
    if new_chunks.is_empty() {
        info!("No new documents to add");
        return Ok((existing_ids.len(), 0));
    }
    info!("Adding new documents: {}", new_chunks.len());

    let mut added = 0usize;
    for batch in new_chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("embedding batch with {} chunks failed", batch.len()))?;
        added += store.add_chunks(batch, &vectors).await?;
    }

    Ok((existing_ids.len(), added))
}

/// Chunks whose id is not in `existing`, in input order, first occurrence only.
pub fn select_new_chunks(chunks: &[Chunk], existing: &HashSet<String>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|c| !existing.contains(&c.id) && seen.insert(c.id.clone()))
        .cloned()
        .collect()
}

/// Write uploaded PDF bytes into the source directory under [`UPLOAD_FILE_NAME`].
pub fn save_upload(config: &Config, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.source.dir).with_context(|| {
        format!(
            "Failed to create source directory {}",
            config.source.dir.display()
        )
    })?;
    let path = config.source.dir.join(UPLOAD_FILE_NAME);
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// CLI entry point for `rag ingest`.
pub async fn run_ingest_cmd(config: &Config, reset: bool) -> Result<()> {
    let embedder = create_embedder(config)?;
    let report = run_ingest(config, embedder.as_ref(), reset).await?;

    println!("ingest {}", config.source.dir.display());
    println!("  pages loaded: {}", report.pages);
    println!("  chunks: {}", report.chunks);
    println!("  existing in store: {}", report.existing);
    println!("  added: {}", report.added);
    println!("ok");
    Ok(())
}

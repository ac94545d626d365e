//! Query submission and lookup.
//!
//! [`submit_query`] decides where a question is answered. With a worker
//! configured, the record is stored incomplete and handed off with a
//! fire-and-forget invocation; the caller polls [`get_query`]. Without one,
//! the answer is computed inline and the record comes back complete.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{QueryRecord, QueryResponse};
use crate::object_store::SnapshotStore;
use crate::query::query_rag;
use crate::records::{create_record_store, RecordStore};
use crate::vector_store::VectorStore;
use crate::worker::{LambdaInvoker, WorkerTarget};

/// Everything a request handler needs, shared across the server and worker.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub records: Arc<dyn RecordStore>,
    /// Set when `[storage].bucket` is configured.
    pub snapshots: Option<Arc<SnapshotStore>>,
    /// Set when `[worker].function_name` is configured.
    pub worker: Option<Arc<dyn WorkerTarget>>,
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
}

impl AppContext {
    /// Build every client the configuration asks for.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let records = create_record_store(config).await?;
        let snapshots = SnapshotStore::from_config(config)?.map(Arc::new);
        let worker = LambdaInvoker::from_config(config)?
            .map(|invoker| Arc::new(invoker) as Arc<dyn WorkerTarget>);

        Ok(Self {
            config: Arc::new(config.clone()),
            records,
            snapshots,
            worker,
            embedder: Arc::from(create_embedder(config)?),
            chat: Arc::from(create_chat_model(config)?),
        })
    }

    /// Answer `query_text` against the local vector store.
    pub async fn answer(&self, query_text: &str) -> Result<QueryResponse> {
        let store = VectorStore::open(&self.config.db.path).await?;
        let result = query_rag(
            &store,
            self.embedder.as_ref(),
            self.chat.as_ref(),
            query_text,
            self.config.retrieval.top_k,
        )
        .await;
        store.close().await;
        result
    }
}

/// Create a record for `query_text` and answer it, inline or via the worker.
pub async fn submit_query(ctx: &AppContext, query_text: &str) -> Result<QueryRecord> {
    if query_text.trim().is_empty() {
        bail!("query_text must not be empty");
    }

    let mut record = QueryRecord::new(query_text);
    info!(query_id = %record.query_id, "submitted query");

    if let Some(ref snapshots) = ctx.snapshots {
        upload_snapshot(ctx, snapshots).await?;
    }

    if let Some(ref worker) = ctx.worker {
        ctx.records.put_item(&record).await?;
        worker.invoke(&record).await?;
        info!(query_id = %record.query_id, worker = worker.name(), "dispatched to worker");
        return Ok(record);
    }

    let response = ctx.answer(&record.query_text).await?;
    record.complete(response);
    ctx.records.put_item(&record).await?;
    Ok(record)
}

/// Fetch a record by id.
pub async fn get_query(ctx: &AppContext, query_id: &str) -> Result<Option<QueryRecord>> {
    ctx.records.get_item(query_id).await
}

async fn upload_snapshot(ctx: &AppContext, snapshots: &SnapshotStore) -> Result<()> {
    let path = &ctx.config.db.path;
    if !path.exists() {
        warn!(path = %path.display(), "vector store missing, uploading an empty one");
        VectorStore::open(path).await?.close().await;
    }
    snapshots
        .upload_file(path, &ctx.config.storage.object_name)
        .await
}

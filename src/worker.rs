//! Second-stage query execution.
//!
//! The web tier hands a [`QueryRecord`] to a [`WorkerTarget`] and returns
//! immediately. The worker side ([`handle_worker_event`]) fetches the latest
//! vector store snapshot, answers the question, and writes the completed
//! record back to the record store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::aws::{uri_encode, AwsClient, AwsRequest};
use crate::config::Config;
use crate::dispatch::AppContext;
use crate::models::QueryRecord;

const LAMBDA_TIMEOUT_SECS: u64 = 10;

/// Somewhere a query can be handed off to for asynchronous answering.
#[async_trait]
pub trait WorkerTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Start processing `record` without waiting for the result.
    async fn invoke(&self, record: &QueryRecord) -> Result<()>;
}

/// Asynchronous (`Event`) invocation of an AWS Lambda function.
pub struct LambdaInvoker {
    client: AwsClient,
    function_name: String,
}

impl LambdaInvoker {
    pub fn new(client: AwsClient, function_name: String) -> Self {
        Self {
            client,
            function_name,
        }
    }

    /// `None` when no `[worker].function_name` is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(ref name) = config.worker.function_name else {
            return Ok(None);
        };
        let client = AwsClient::from_env(&config.aws, Duration::from_secs(LAMBDA_TIMEOUT_SECS))?;
        Ok(Some(Self::new(client, name.clone())))
    }

    fn invoke_path(&self) -> String {
        format!(
            "/2015-03-31/functions/{}/invocations",
            uri_encode(&self.function_name)
        )
    }
}

#[async_trait]
impl WorkerTarget for LambdaInvoker {
    fn name(&self) -> &str {
        &self.function_name
    }

    async fn invoke(&self, record: &QueryRecord) -> Result<()> {
        self.client
            .send(AwsRequest {
                service: "lambda",
                host: format!("lambda.{}.amazonaws.com", self.client.region()),
                method: reqwest::Method::POST,
                path: self.invoke_path(),
                headers: vec![
                    ("content-type".to_string(), "application/json".to_string()),
                    ("x-amz-invocation-type".to_string(), "Event".to_string()),
                ],
                body: serde_json::to_vec(record)?,
            })
            .await?;
        Ok(())
    }
}

/// Answer a dispatched record and persist the completed version.
///
/// With a bucket configured the snapshot is downloaded on every event, since
/// a warm worker may still hold the one from an earlier submission.
pub async fn handle_worker_event(ctx: &AppContext, mut record: QueryRecord) -> Result<QueryRecord> {
    if let Some(ref snapshots) = ctx.snapshots {
        let db_path = &ctx.config.db.path;
        info!(path = %db_path.display(), "restoring vector store snapshot");
        snapshots
            .download_file(&ctx.config.storage.object_name, db_path)
            .await?;
    }

    let response = ctx.answer(&record.query_text).await?;
    record.complete(response);
    ctx.records.put_item(&record).await?;
    info!(query_id = %record.query_id, "worker completed query");
    Ok(record)
}

/// CLI entry point for `rag worker`. `event` is a JSON file, or `-` for stdin.
pub async fn run_worker(config: &Config, event: &Path) -> Result<()> {
    let payload = if event == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(event)
            .await
            .with_context(|| format!("Failed to read event file: {}", event.display()))?
    };
    let record: QueryRecord =
        serde_json::from_str(&payload).context("Event payload is not a query record")?;

    let ctx = AppContext::from_config(config).await?;
    let record = handle_worker_event(&ctx, record).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

//! AWS Lambda entry points.
//!
//! The same binary runs as both functions of a serverless deployment:
//!
//! - `rag lambda-api` serves [`build_router`](crate::server::build_router)
//!   behind API Gateway or a function URL.
//! - `rag lambda-worker` receives the [`QueryRecord`] payloads sent by
//!   [`LambdaInvoker`](crate::worker::LambdaInvoker) and answers them with
//!   [`handle_worker_event`].
//!
//! Both loops talk to the Lambda runtime API and only return on a runtime
//! error.

use anyhow::Result;
use lambda_runtime::{service_fn, LambdaEvent};
use tracing::info;

use crate::config::Config;
use crate::dispatch::AppContext;
use crate::models::QueryRecord;
use crate::server::build_router;
use crate::worker::handle_worker_event;

/// Serve the HTTP API through the Lambda runtime.
pub async fn run_lambda_api(config: &Config) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    info!(worker = ctx.worker.is_some(), "starting lambda api");
    lambda_http::run(build_router(ctx))
        .await
        .map_err(|e| anyhow::anyhow!("lambda api runtime failed: {}", e))
}

/// Process worker invocations until the runtime shuts the function down.
pub async fn run_lambda_worker(config: &Config) -> Result<()> {
    let ctx = AppContext::from_config(config).await?;
    info!("starting lambda worker");
    lambda_runtime::run(service_fn(|event: LambdaEvent<QueryRecord>| {
        let ctx = ctx.clone();
        async move { worker_handler(&ctx, event).await }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("lambda worker runtime failed: {}", e))
}

/// One worker invocation: the payload is the record the web tier stored.
pub async fn worker_handler(
    ctx: &AppContext,
    event: LambdaEvent<QueryRecord>,
) -> Result<QueryRecord, lambda_runtime::Error> {
    let (record, context) = event.into_parts();
    info!(request_id = %context.request_id, query_id = %record.query_id, "worker event");
    Ok(handle_worker_event(ctx, record).await?)
}

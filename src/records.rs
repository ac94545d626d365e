//! Persistence for [`QueryRecord`]s.
//!
//! Two backends implement [`RecordStore`]:
//! - **[`SqliteRecordStore`]**: a local `queries` table, for development and the CLI.
//! - **[`DynamoRecordStore`]**: a DynamoDB table keyed by `query_id`, for deployments.
//!
//! Both are keyed by `query_id` and overwrite on put.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteJournalMode;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::aws::{AwsClient, AwsRequest};
use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::QueryRecord;

const DYNAMODB_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record with the same `query_id`.
    async fn put_item(&self, record: &QueryRecord) -> Result<()>;

    /// Fetch a record by id. `Ok(None)` when it does not exist.
    async fn get_item(&self, query_id: &str) -> Result<Option<QueryRecord>>;
}

/// Create the store selected by `[records].backend`.
pub async fn create_record_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    match config.records.backend.as_str() {
        "dynamodb" => {
            let table = config
                .records
                .table_name
                .clone()
                .context("records.table_name must be set for the dynamodb backend")?;
            let client =
                AwsClient::from_env(&config.aws, Duration::from_secs(DYNAMODB_TIMEOUT_SECS))?;
            Ok(Arc::new(DynamoRecordStore::new(client, table)))
        }
        _ => Ok(Arc::new(SqliteRecordStore::open(&config.records.path).await?)),
    }
}

// ============ SQLite ============

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path, SqliteJournalMode::Wal).await?;
        migrate::migrate_records(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put_item(&self, record: &QueryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queries (query_id, create_time, query_text, answer_text, sources_json, is_complete)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(query_id) DO UPDATE SET
                create_time = excluded.create_time,
                query_text = excluded.query_text,
                answer_text = excluded.answer_text,
                sources_json = excluded.sources_json,
                is_complete = excluded.is_complete
            "#,
        )
        .bind(&record.query_id)
        .bind(record.create_time)
        .bind(&record.query_text)
        .bind(record.answer_text.as_deref())
        .bind(serde_json::to_string(&record.sources)?)
        .bind(record.is_complete)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, query_id: &str) -> Result<Option<QueryRecord>> {
        let row = sqlx::query(
            "SELECT query_id, create_time, query_text, answer_text, sources_json, is_complete FROM queries WHERE query_id = ?",
        )
        .bind(query_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sources_json: String = row.get("sources_json");
        Ok(Some(QueryRecord {
            query_id: row.get("query_id"),
            create_time: row.get("create_time"),
            query_text: row.get("query_text"),
            answer_text: row.get("answer_text"),
            sources: serde_json::from_str(&sources_json)
                .with_context(|| format!("Corrupt sources_json for query {}", query_id))?,
            is_complete: row.get("is_complete"),
        }))
    }
}

// ============ DynamoDB ============

/// DynamoDB table with `query_id` as its partition key.
pub struct DynamoRecordStore {
    client: AwsClient,
    table: String,
}

impl DynamoRecordStore {
    pub fn new(client: AwsClient, table: String) -> Self {
        Self { client, table }
    }

    async fn call(&self, target: &str, body: Value) -> Result<Value> {
        let resp = self
            .client
            .send(AwsRequest {
                service: "dynamodb",
                host: format!("dynamodb.{}.amazonaws.com", self.client.region()),
                method: reqwest::Method::POST,
                path: "/".to_string(),
                headers: vec![
                    (
                        "content-type".to_string(),
                        "application/x-amz-json-1.0".to_string(),
                    ),
                    (
                        "x-amz-target".to_string(),
                        format!("DynamoDB_20120810.{}", target),
                    ),
                ],
                body: serde_json::to_vec(&body)?,
            })
            .await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn put_item(&self, record: &QueryRecord) -> Result<()> {
        self.call(
            "PutItem",
            json!({ "TableName": self.table, "Item": to_dynamo_item(record) }),
        )
        .await?;
        Ok(())
    }

    async fn get_item(&self, query_id: &str) -> Result<Option<QueryRecord>> {
        let resp = self
            .call(
                "GetItem",
                json!({
                    "TableName": self.table,
                    "Key": { "query_id": { "S": query_id } },
                    "ConsistentRead": true,
                }),
            )
            .await?;

        match resp.get("Item") {
            Some(item) => Ok(Some(from_dynamo_item(item)?)),
            None => Ok(None),
        }
    }
}

/// Encode a record as a DynamoDB attribute-value map.
///
/// `answer_text` is omitted while the record has no answer.
pub fn to_dynamo_item(record: &QueryRecord) -> Value {
    let mut item = Map::new();
    item.insert("query_id".into(), json!({ "S": record.query_id }));
    item.insert(
        "create_time".into(),
        json!({ "N": record.create_time.to_string() }),
    );
    item.insert("query_text".into(), json!({ "S": record.query_text }));
    if let Some(ref answer) = record.answer_text {
        item.insert("answer_text".into(), json!({ "S": answer }));
    }
    let sources: Vec<Value> = record.sources.iter().map(|s| json!({ "S": s })).collect();
    item.insert("sources".into(), json!({ "L": sources }));
    item.insert("is_complete".into(), json!({ "BOOL": record.is_complete }));
    Value::Object(item)
}

/// Decode a DynamoDB attribute-value map into a record.
pub fn from_dynamo_item(item: &Value) -> Result<QueryRecord> {
    let string_attr = |name: &str| -> Option<String> {
        item.get(name)
            .and_then(|v| v.get("S"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    let query_id = string_attr("query_id").context("DynamoDB item missing query_id")?;
    let query_text = string_attr("query_text").context("DynamoDB item missing query_text")?;
    let create_time = item
        .get("create_time")
        .and_then(|v| v.get("N"))
        .and_then(|v| v.as_str())
        .and_then(|n| n.parse::<i64>().ok())
        .unwrap_or(0);
    let sources = item
        .get("sources")
        .and_then(|v| v.get("L"))
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|s| s.get("S").and_then(|v| v.as_str()).map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let is_complete = item
        .get("is_complete")
        .and_then(|v| v.get("BOOL"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(QueryRecord {
        query_id,
        create_time,
        query_text,
        answer_text: string_attr("answer_text"),
        sources,
        is_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryResponse;
    use tempfile::TempDir;

    fn answered(text: &str) -> QueryRecord {
        let mut record = QueryRecord::new(text);
        record.complete(QueryResponse {
            query_text: text.to_string(),
            response_text: "forty-two".to_string(),
            sources: vec!["a.pdf:0:0".to_string(), "a.pdf:1:0".to_string()],
        });
        record
    }

    #[tokio::test]
    async fn test_sqlite_put_get_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteRecordStore::open(&tmp.path().join("q.sqlite")).await.unwrap();

        let pending = QueryRecord::new("what is it?");
        store.put_item(&pending).await.unwrap();
        let fetched = store.get_item(&pending.query_id).await.unwrap().unwrap();
        assert_eq!(fetched, pending);
        assert!(!fetched.is_complete);

        let mut done = pending.clone();
        done.complete(QueryResponse {
            query_text: done.query_text.clone(),
            response_text: "an answer".to_string(),
            sources: vec!["x:0:0".to_string()],
        });
        store.put_item(&done).await.unwrap();
        let fetched = store.get_item(&done.query_id).await.unwrap().unwrap();
        assert_eq!(fetched, done);
    }

    #[tokio::test]
    async fn test_sqlite_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteRecordStore::open(&tmp.path().join("q.sqlite")).await.unwrap();
        assert!(store.get_item("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_sources_is_error() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteRecordStore::open(&tmp.path().join("q.sqlite")).await.unwrap();
        sqlx::query(
            "INSERT INTO queries (query_id, create_time, query_text, answer_text, sources_json, is_complete) VALUES ('bad', 0, 'q', NULL, 'not json', 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.get_item("bad").await.unwrap_err();
        assert!(err.to_string().contains("sources_json"));
    }

    #[test]
    fn test_dynamo_item_shape() {
        let record = answered("q");
        let item = to_dynamo_item(&record);
        assert_eq!(item["query_id"]["S"], record.query_id.as_str());
        assert_eq!(item["create_time"]["N"], record.create_time.to_string());
        assert_eq!(item["answer_text"]["S"], "forty-two");
        assert_eq!(item["sources"]["L"][1]["S"], "a.pdf:1:0");
        assert_eq!(item["is_complete"]["BOOL"], true);
    }

    #[test]
    fn test_dynamo_item_omits_missing_answer() {
        let item = to_dynamo_item(&QueryRecord::new("pending"));
        assert!(item.get("answer_text").is_none());
        assert_eq!(item["is_complete"]["BOOL"], false);

        let decoded = from_dynamo_item(&item).unwrap();
        assert_eq!(decoded.answer_text, None);
        assert!(decoded.sources.is_empty());
    }

    #[test]
    fn test_from_dynamo_item_requires_id() {
        let item = json!({ "query_text": { "S": "q" } });
        assert!(from_dynamo_item(&item).is_err());
    }

    #[test]
    fn test_from_dynamo_item_decodes() {
        let record = answered("what?");
        assert_eq!(from_dynamo_item(&to_dynamo_item(&record)).unwrap(), record);
    }
}

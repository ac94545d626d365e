//! Shared fixtures: an in-process model server speaking the Ollama API, an
//! in-process stand-in for S3, Lambda and DynamoDB, hand-assembled PDFs, and
//! configs pointing at a scratch directory.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use pdf_rag::aws::{AwsClient, AwsCredentials};
use pdf_rag::config::{AwsConfig, Config};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MOCK_ANSWER: &str = "Mock answer from the retrieved context.";
const EMBED_DIMS: usize = 16;

/// A running mock model server. Prompts sent to `/api/chat` are recorded.
pub struct MockModels {
    pub url: String,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl MockModels {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

pub async fn start_mock_models() -> MockModels {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/embed", post(handle_embed))
        .route("/api/chat", post(handle_chat))
        .with_state(prompts.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockModels {
        url: format!("http://{}", addr),
        prompts,
    }
}

async fn handle_embed(Json(body): Json<Value>) -> Json<Value> {
    let inputs: Vec<String> = match &body["input"] {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    };
    let embeddings: Vec<Vec<f32>> = inputs.iter().map(|t| bag_of_words(t)).collect();
    Json(json!({ "model": body["model"], "embeddings": embeddings }))
}

async fn handle_chat(
    State(prompts): State<Arc<Mutex<Vec<String>>>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let prompt = body["messages"][0]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    prompts.lock().unwrap().push(prompt);
    Json(json!({
        "model": body["model"],
        "message": { "role": "assistant", "content": MOCK_ANSWER },
        "done": true
    }))
}

// ============ AWS ============

pub const TEST_ACCESS_KEY: &str = "AKIDTEST";
pub const TEST_SECRET_KEY: &str = "test-secret";

/// A request as received by [`MockAws`].
#[derive(Debug, Clone)]
pub struct AwsCall {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl AwsCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Default)]
pub struct AwsState {
    pub calls: Vec<AwsCall>,
    /// S3 objects keyed by request path (`/<bucket>/<key>`).
    pub objects: HashMap<String, Vec<u8>>,
    /// DynamoDB items keyed by `query_id`.
    pub items: HashMap<String, Value>,
}

/// A running mock AWS endpoint, for use as `[aws].endpoint_url`.
///
/// S3 `PutObject`/`GetObject` work on path-style URLs, Lambda invocations
/// are accepted with 202, and DynamoDB `PutItem`/`GetItem` keep items in
/// memory.
pub struct MockAws {
    pub url: String,
    pub state: Arc<Mutex<AwsState>>,
}

impl MockAws {
    pub fn calls(&self) -> Vec<AwsCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(path).cloned()
    }

    pub fn put_object(&self, path: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(path.to_string(), bytes);
    }

    pub fn aws_config(&self) -> AwsConfig {
        AwsConfig {
            region: "us-east-1".to_string(),
            endpoint_url: Some(self.url.clone()),
        }
    }

    /// A client signing with dummy credentials, pointed at this endpoint.
    pub fn client(&self) -> AwsClient {
        let creds = AwsCredentials {
            access_key_id: TEST_ACCESS_KEY.to_string(),
            secret_access_key: TEST_SECRET_KEY.to_string(),
            session_token: None,
        };
        AwsClient::new(creds, &self.aws_config(), Duration::from_secs(5)).unwrap()
    }
}

pub async fn start_mock_aws() -> MockAws {
    let state = Arc::new(Mutex::new(AwsState::default()));
    let app = Router::new()
        .fallback(handle_aws)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockAws {
        url: format!("http://{}", addr),
        state,
    }
}

async fn handle_aws(
    State(state): State<Arc<Mutex<AwsState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let mut state = state.lock().unwrap();
    state.calls.push(AwsCall {
        method: method.clone(),
        path: path.clone(),
        headers: headers.clone(),
        body: body.to_vec(),
    });

    if !headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("AWS4-HMAC-SHA256 Credential=AKIDTEST/"))
    {
        return StatusCode::FORBIDDEN.into_response();
    }

    if path.starts_with("/2015-03-31/functions/") {
        return StatusCode::ACCEPTED.into_response();
    }

    if let Some(target) = headers.get("x-amz-target").and_then(|v| v.to_str().ok()) {
        let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        return match target {
            "DynamoDB_20120810.PutItem" => {
                let item = request["Item"].clone();
                let id = item["query_id"]["S"].as_str().unwrap_or_default().to_string();
                state.items.insert(id, item);
                Json(json!({})).into_response()
            }
            "DynamoDB_20120810.GetItem" => {
                let id = request["Key"]["query_id"]["S"].as_str().unwrap_or_default();
                match state.items.get(id) {
                    Some(item) => Json(json!({ "Item": item })).into_response(),
                    None => Json(json!({})).into_response(),
                }
            }
            _ => StatusCode::BAD_REQUEST.into_response(),
        };
    }

    match method {
        Method::PUT => {
            state.objects.insert(path, body.to_vec());
            StatusCode::OK.into_response()
        }
        Method::GET => match state.objects.get(&path) {
            Some(bytes) => bytes.clone().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Hashed bag-of-words vector, so texts sharing words are similar.
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBED_DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u32 = 2166136261;
        for b in word.to_lowercase().bytes() {
            hash ^= b as u32;
            hash = hash.wrapping_mul(16777619);
        }
        v[(hash as usize) % EMBED_DIMS] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Config rooted at `root`, with both model providers pointed at `model_url`.
pub fn test_config(root: &Path, model_url: &str) -> Config {
    let mut config = Config::default();
    config.db.path = root.join("data/chroma/chroma.sqlite3");
    config.source.dir = root.join("source");
    config.records.path = root.join("data/queries.sqlite");
    config.embedding.provider = "ollama".to_string();
    config.embedding.model = Some("mock-embed".to_string());
    config.embedding.url = Some(model_url.to_string());
    config.llm.provider = "ollama".to_string();
    config.llm.model = "mock-chat".to_string();
    config.llm.url = Some(model_url.to_string());
    config.server.bind = "127.0.0.1:0".to_string();
    config
}

/// The same settings as [`test_config`], as a TOML file body.
pub fn test_config_toml(root: &Path, model_url: &str) -> String {
    format!(
        r#"[db]
path = "{root}/data/chroma/chroma.sqlite3"

[source]
dir = "{root}/source"

[embedding]
provider = "ollama"
model = "mock-embed"
url = "{url}"

[llm]
provider = "ollama"
model = "mock-chat"
url = "{url}"

[records]
path = "{root}/data/queries.sqlite"
"#,
        root = root.display(),
        url = model_url
    )
}

/// [`test_config_toml`] plus a snapshot bucket, a DynamoDB record table and a
/// worker function, all served by the mock AWS endpoint at `aws_url`.
pub fn aws_config_toml(root: &Path, model_url: &str, aws_url: &str) -> String {
    let base = test_config_toml(root, model_url).replace(
        "[records]\n",
        "[records]\nbackend = \"dynamodb\"\ntable_name = \"rag-queries\"\n",
    );
    format!(
        r#"{base}
[aws]
region = "us-east-1"
endpoint_url = "{aws_url}"

[storage]
bucket = "rag-bucket"

[worker]
function_name = "rag-worker"
"#
    )
}

/// Minimal PDF with one page per entry of `pages`, each a single line of text.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    // Objects: 1 catalog, 2 pages, 3 font, then (page, contents) pairs.
    let page_obj = |i: usize| 4 + 2 * i;
    let content_obj = |i: usize| 5 + 2 * i;
    let total_objects = 3 + 2 * n;

    let mut out = Vec::new();
    let mut offsets = Vec::with_capacity(total_objects);
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", page_obj(i))).collect();
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            n
        )
        .as_bytes(),
    );

    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj(i),
                content_obj(i)
            )
            .as_bytes(),
        );

        let escaped = text
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        let stream = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", escaped);
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_obj(i),
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            total_objects + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

/// Write a PDF into `dir` under `name`, creating the directory.
pub fn write_pdf(dir: &Path, name: &str, pages: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), pdf_with_pages(pages)).unwrap();
}
